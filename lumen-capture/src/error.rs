use std::io;

use thiserror::Error;

use crate::y4m::Y4mError;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Every frame buffer is still held by someone, the frame has to be skipped.
    #[error("all {capacity} frame buffers are in flight")]
    ResourceExhaustion { capacity: usize },
    #[error("failed to read from the frame source: {0}")]
    Io(#[from] io::Error),
    #[error("malformed YUV4MPEG2 stream: {0}")]
    Y4m(#[from] Y4mError),
}
