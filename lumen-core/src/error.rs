use thiserror::Error;

/// The raw frame does not match the 3-plane 4:2:0 layout the converter expects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("expected 3 planes (Y, U, V), got {found}")]
    PlaneCount { found: usize },
    #[error("frame size {width}x{height} is not a non-zero even size")]
    Dimensions { width: u32, height: u32 },
    #[error("plane {plane} has a zero pixel stride")]
    ZeroPixelStride { plane: usize },
    #[error(
        "plane {plane} row stride {row_stride} is smaller than a row of {samples} samples at pixel stride {pixel_stride}"
    )]
    RowStrideTooSmall {
        plane: usize,
        row_stride: usize,
        samples: usize,
        pixel_stride: usize,
    },
    #[error("plane {plane} strides address more bytes than fit in memory")]
    StrideOverflow { plane: usize },
    #[error("plane {plane} holds {actual} bytes, but its strides address {required} bytes")]
    PlaneTooShort {
        plane: usize,
        required: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(
        "luma frame is {luma_width}x{luma_height}, but color frame is {color_width}x{color_height}"
    )]
    DimensionMismatch {
        luma_width: u32,
        luma_height: u32,
        color_width: u32,
        color_height: u32,
    },
    #[error("extractor panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything that can go wrong with a single frame. None of these stop the pipeline: the frame is dropped and the next one is processed normally.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame layout: {0}")]
    InvalidFrameLayout(#[from] LayoutError),
    #[error("feature extraction failed: {0}")]
    ExtractionFault(#[from] ExtractionError),
}
