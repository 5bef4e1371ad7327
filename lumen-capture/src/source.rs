use std::time::Duration;

use dpi::PhysicalSize;

use crate::{CaptureError, FrameLease, FramePool};

/// Something that produces raw sensor frames, one at a time.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    fn frame_size(&self) -> PhysicalSize<u32>;

    /// Fills a buffer set taken from `pool` with the next frame.
    ///
    /// `Ok(None)` means the stream has ended and no more frames will come.
    fn next_frame(&mut self, pool: &FramePool) -> Result<Option<FrameLease>, CaptureError>;
}

/// How often the capture thread asks its source for a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pacing {
    /// As fast as frames can be produced and processed.
    Unpaced,
    Interval(Duration),
}

impl Pacing {
    /// Paces to `frame_rate` frames per second. A rate of zero means no pacing.
    pub fn frame_rate(frame_rate: u32) -> Self {
        if frame_rate == 0 {
            Pacing::Unpaced
        } else {
            Pacing::Interval(Duration::from_secs(1) / frame_rate)
        }
    }

    /// Paces to a fractional rate, like the `30000:1001` of a Y4M header. Anything not positive and finite means no pacing.
    pub fn fps(fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            Pacing::Interval(Duration::from_secs_f64(1.0 / fps))
        } else {
            Pacing::Unpaced
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match *self {
            Pacing::Unpaced => None,
            Pacing::Interval(interval) => Some(interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate() {
        assert_eq!(Pacing::frame_rate(0), Pacing::Unpaced);
        assert_eq!(
            Pacing::frame_rate(30).interval(),
            Some(Duration::from_nanos(33_333_333))
        );
        assert_eq!(Pacing::frame_rate(1000).interval(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_fractional_rate() {
        assert_eq!(Pacing::fps(0.0), Pacing::Unpaced);
        assert_eq!(Pacing::fps(f64::INFINITY), Pacing::Unpaced);
        assert_eq!(Pacing::fps(-5.0), Pacing::Unpaced);

        let interval = Pacing::fps(30000.0 / 1001.0).interval().unwrap();
        assert!(interval > Duration::from_micros(33_366));
        assert!(interval < Duration::from_micros(33_367));
    }
}
