//! Feature extraction hooks, run on the capture thread between conversion and hand-off.

mod canny;

pub use canny::{EdgeExtractor, EdgeThresholds};

use crate::{
    error::ExtractionError,
    frame::{ColorFrame, LumaFrame},
};

/// Mutates a color frame in place, using a luma frame of the same size as input.
///
/// Both buffers are owned by the calling thread for the duration of the call, so an implementation can take as long as it needs.
/// It only lowers the throughput.
pub trait FeatureExtractor: Send {
    fn name(&self) -> &str;

    fn extract(&mut self, luma: &LumaFrame, color: &mut ColorFrame)
    -> Result<(), ExtractionError>;
}

/// Leaves frames untouched.
#[derive(Debug, Default)]
pub struct NoopExtractor;

impl FeatureExtractor for NoopExtractor {
    fn name(&self) -> &str {
        "noop"
    }

    fn extract(
        &mut self,
        _luma: &LumaFrame,
        _color: &mut ColorFrame,
    ) -> Result<(), ExtractionError> {
        Ok(())
    }
}
