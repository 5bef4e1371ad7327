//! The frame pipeline of lumen: turns raw sensor frames into displayable RGBA frames and hands them over to the renderer.
//!
//! Data flows in one direction:
//!
//! raw sensor frame -> [`convert`] -> (optional) [`FeatureExtractor`] -> [`FrameRelay`] -> renderer
//!
//! The [`FpsEstimator`] is fed by the producer side and read by whoever displays it.

pub mod convert;
mod error;
pub mod extract;
pub mod fps;
pub mod frame;
pub mod processor;
pub mod relay;

pub use convert::convert;
pub use error::{ExtractionError, FrameError, LayoutError};
pub use extract::{EdgeExtractor, EdgeThresholds, FeatureExtractor, NoopExtractor};
pub use fps::FpsEstimator;
pub use frame::{ColorFrame, LumaFrame, Nv12Frame, PendingFrame, Plane, RawFrame};
pub use processor::{EffectToggle, FrameProcessor, FrameReport, PipelineConfig, SharedState};
pub use relay::{FrameRelay, RelayStats};
