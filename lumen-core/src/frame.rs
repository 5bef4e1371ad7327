use dpi::PhysicalSize;
use image::{GrayImage, RgbaImage};

/// Interleaved 8-bit RGBA, row-major, no padding. Alpha is always opaque.
pub type ColorFrame = RgbaImage;
/// Single-channel 8-bit luminance derived from a [`ColorFrame`].
pub type LumaFrame = GrayImage;

/// One plane of a [`RawFrame`].
#[derive(Debug, Copy, Clone)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of two consecutive rows. Can be larger than a row because of alignment padding.
    pub row_stride: usize,
    /// Bytes between two consecutive samples in a row. 2 means the plane is interleaved with another channel.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// A plane without any padding or interleaving.
    pub fn packed(data: &'a [u8], width: usize) -> Self {
        Self::new(data, width, 1)
    }

    /// Bytes taken by one row of `samples` samples, not counting padding. `None` if it does not fit in `usize`.
    pub fn row_len(&self, samples: usize) -> Option<usize> {
        if samples == 0 {
            return Some(0);
        }
        (samples - 1).checked_mul(self.pixel_stride)?.checked_add(1)
    }

    /// Number of bytes the strides address when reading `rows` rows of `samples` samples each.
    /// `None` if it does not fit in `usize`.
    ///
    /// The last row does not need to be padded, which is what camera HALs usually hand out.
    pub fn required_len(&self, samples: usize, rows: usize) -> Option<usize> {
        if samples == 0 || rows == 0 {
            return Some(0);
        }
        (rows - 1)
            .checked_mul(self.row_stride)?
            .checked_add(self.row_len(samples)?)
    }

    #[inline]
    pub fn sample(&self, col: usize, row: usize) -> u8 {
        self.data[row * self.row_stride + col * self.pixel_stride]
    }

    /// Returns a contiguous row when the plane is not interleaved.
    #[inline]
    pub fn packed_row(&self, row: usize, samples: usize) -> Option<&'a [u8]> {
        if self.pixel_stride != 1 {
            return None;
        }
        let start = row * self.row_stride;
        self.data.get(start..start + samples)
    }
}

/// A view over the planes of one sensor capture: Y at full resolution, U and V subsampled by 2 in both directions.
///
/// The memory behind it belongs to the capture source and is only valid while it is borrowed,
/// so everything derived from it must be copied out.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pub size: PhysicalSize<u32>,
    pub planes: Vec<Plane<'a>>,
}

impl<'a> RawFrame<'a> {
    pub fn new(width: u32, height: u32, planes: impl Into<Vec<Plane<'a>>>) -> Self {
        Self {
            size: PhysicalSize::new(width, height),
            planes: planes.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }
}

/// NV12: the full luma plane followed by interleaved U, V pairs at quarter resolution, in a single buffer.
#[derive(Debug, Clone)]
pub struct Nv12Frame {
    pub data: Vec<u8>,
    pub size: PhysicalSize<u32>,
}

impl Nv12Frame {
    pub fn buffer_len(size: PhysicalSize<u32>) -> usize {
        let luma = size.width as usize * size.height as usize;
        luma + luma / 2
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    pub fn uv_plane(&self) -> &[u8] {
        &self.data[self.luma_len()..]
    }

    fn luma_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize
    }
}

/// A converted frame waiting in the [`crate::FrameRelay`] to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    /// Tightly packed RGBA8, `width * height * 4` bytes.
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PendingFrame {
    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width, self.height)
    }
}

impl From<ColorFrame> for PendingFrame {
    fn from(frame: ColorFrame) -> Self {
        let (width, height) = frame.dimensions();
        Self {
            buffer: frame.into_raw(),
            width,
            height,
        }
    }
}
