use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

pub const DEFAULT_SMOOTHING: f64 = 0.1;

/// Exponential moving average of the frame processing rate.
///
/// Written by the capture thread only and read by the UI at its own pace. The value is stored as raw `f64` bits
/// with relaxed ordering: readers may see a slightly stale average, which is fine for a telemetry read-out.
#[derive(Debug)]
pub struct FpsEstimator {
    average: AtomicU64,
    smoothing: f64,
}

impl FpsEstimator {
    /// `smoothing` is the weight of the newest sample, in `(0, 1]`.
    pub fn new(smoothing: f64) -> Self {
        debug_assert!(
            smoothing > 0.0 && smoothing <= 1.0,
            "smoothing factor out of range: {}",
            smoothing
        );

        Self {
            average: AtomicU64::new(0.0f64.to_bits()),
            smoothing,
        }
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Mixes `fps` into the average. The first sample becomes the average as-is.
    pub fn sample(&self, fps: f64) {
        let average = self.read();
        let average = if average == 0.0 {
            fps
        } else {
            average * (1.0 - self.smoothing) + fps * self.smoothing
        };
        // single writer, so a plain store is enough
        self.average.store(average.to_bits(), Ordering::Relaxed);
    }

    /// Samples the rate corresponding to a frame that took `elapsed` to process. Returns the instantaneous rate.
    ///
    /// The duration is counted in whole milliseconds, clamped to at least 1ms.
    pub fn sample_elapsed(&self, elapsed: Duration) -> f64 {
        let millis = elapsed.as_millis().max(1);
        let fps = 1000.0 / millis as f64;
        self.sample(fps);
        fps
    }

    pub fn read(&self) -> f64 {
        f64::from_bits(self.average.load(Ordering::Relaxed))
    }
}

impl Default for FpsEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_bootstraps() {
        let fps = FpsEstimator::new(0.1);
        assert_eq!(fps.read(), 0.0);

        fps.sample(10.0);
        assert_eq!(fps.read(), 10.0);
    }

    #[test]
    fn test_smoothing_step() {
        let fps = FpsEstimator::new(0.1);
        fps.sample(10.0);
        fps.sample(20.0);
        assert_eq!(fps.read(), 11.0);
    }

    #[test]
    fn test_converges() {
        let fps = FpsEstimator::new(0.5);
        fps.sample(100.0);
        for _ in 0..64 {
            fps.sample(30.0);
        }
        assert!((fps.read() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_is_clamped() {
        let fps = FpsEstimator::default();

        assert_eq!(fps.sample_elapsed(Duration::ZERO), 1000.0);
        assert_eq!(fps.read(), 1000.0);

        let fps = FpsEstimator::default();
        assert_eq!(fps.sample_elapsed(Duration::from_micros(40_900)), 25.0);
    }
}
