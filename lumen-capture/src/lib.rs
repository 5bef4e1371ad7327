//! Where raw frames come from: sources that fill pooled plane buffers, and the thread that drives them.

mod error;
pub mod pattern;
pub mod pool;
pub mod source;
mod worker;
pub mod y4m;

pub use error::CaptureError;
pub use pattern::TestPatternSource;
pub use pool::{FrameLayout, FrameLease, FramePool, PlaneLayout};
pub use source::{FrameSource, Pacing};
pub use worker::CaptureWorker;
pub use y4m::Y4mSource;
