use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use dpi::PhysicalSize;
use tracing::trace;

use crate::{
    convert::convert,
    error::{ExtractionError, FrameError},
    extract::{EdgeThresholds, FeatureExtractor},
    fps::{DEFAULT_SMOOTHING, FpsEstimator},
    frame::{ColorFrame, LumaFrame, PendingFrame, RawFrame},
    relay::FrameRelay,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Weight of the newest sample in the FPS average.
    pub smoothing: f64,
    /// Whether the feature extraction pass starts enabled.
    pub effect_enabled: bool,
    pub edge_thresholds: EdgeThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            effect_enabled: true,
            edge_thresholds: EdgeThresholds::default(),
        }
    }
}

/// A flag flipped by the UI and read by the capture thread before each frame.
///
/// A frame that is already being processed may still see the old value.
#[derive(Debug, Clone)]
pub struct EffectToggle(Arc<AtomicBool>);

impl EffectToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    /// Flips the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// The only state shared between the capture and render sides.
#[derive(Debug, Clone)]
pub struct SharedState {
    pub relay: Arc<FrameRelay>,
    pub fps: Arc<FpsEstimator>,
    pub toggle: EffectToggle,
}

impl SharedState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            relay: Arc::new(FrameRelay::new()),
            fps: Arc::new(FpsEstimator::new(config.smoothing)),
            toggle: EffectToggle::new(config.effect_enabled),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct FrameReport {
    pub size: PhysicalSize<u32>,
    pub elapsed: Duration,
    /// Instantaneous rate derived from `elapsed`.
    pub fps: f64,
    pub extracted: bool,
    /// Whether publishing this frame discarded one the renderer never picked up.
    pub replaced: bool,
}

/// Body of the capture callback: convert, optionally extract features, hand off and account for the time spent.
pub struct FrameProcessor {
    extractor: Box<dyn FeatureExtractor>,
    shared: SharedState,
}

impl FrameProcessor {
    pub fn new(shared: SharedState, extractor: Box<dyn FeatureExtractor>) -> Self {
        Self { extractor, shared }
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    /// Processes one frame. Everything is copied out of `raw` before returning.
    ///
    /// On error nothing is published and the FPS average is left alone.
    pub fn process(&mut self, raw: &RawFrame) -> Result<FrameReport, FrameError> {
        let start = Instant::now();

        let (mut color, luma) = convert(raw)?;

        let extracted = self.shared.toggle.is_enabled();
        if extracted {
            self.run_extractor(&luma, &mut color)?;
        }

        let replaced = self.shared.relay.publish(PendingFrame::from(color));

        let elapsed = start.elapsed();
        let fps = self.shared.fps.sample_elapsed(elapsed);

        trace!(
            "Processed {}x{} frame in {:?} (extract: {}, replaced pending: {})",
            raw.width(),
            raw.height(),
            elapsed,
            extracted,
            replaced
        );

        Ok(FrameReport {
            size: raw.size,
            elapsed,
            fps,
            extracted,
            replaced,
        })
    }

    fn run_extractor(
        &mut self,
        luma: &LumaFrame,
        color: &mut ColorFrame,
    ) -> Result<(), ExtractionError> {
        if luma.dimensions() != color.dimensions() {
            let (luma_width, luma_height) = luma.dimensions();
            let (color_width, color_height) = color.dimensions();
            return Err(ExtractionError::DimensionMismatch {
                luma_width,
                luma_height,
                color_width,
                color_height,
            });
        }

        let extractor = &mut self.extractor;
        // the buffers are dropped with the frame if the extractor blows up, so nothing observes a broken state
        match panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(luma, color))) {
            Ok(result) => result,
            Err(payload) => Err(ExtractionError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
