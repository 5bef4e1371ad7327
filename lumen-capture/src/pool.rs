//! A bounded set of reusable plane buffers, the way a camera HAL hands out a fixed number of images.

use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dpi::PhysicalSize;
use lumen_core::{Plane, RawFrame};
use parking_lot::Mutex;
use tracing::trace;

use crate::CaptureError;

/// Where one plane lives inside the buffers of a [`FrameLease`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Index of the buffer holding the plane.
    pub buffer: usize,
    /// Offset of the first sample in that buffer.
    pub offset: usize,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// Buffer sizes and plane views for one frame, in Y, U, V order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub size: PhysicalSize<u32>,
    pub buffer_lens: Vec<usize>,
    pub planes: [PlaneLayout; 3],
}

impl FrameLayout {
    /// Three tightly packed planes, each in its own buffer.
    pub fn planar(size: PhysicalSize<u32>) -> Self {
        let (width, height) = (size.width as usize, size.height as usize);
        let (chroma_width, chroma_height) = (width.div_ceil(2), height.div_ceil(2));

        let packed = |buffer, row_stride| PlaneLayout {
            buffer,
            offset: 0,
            row_stride,
            pixel_stride: 1,
        };

        Self {
            size,
            buffer_lens: vec![
                width * height,
                chroma_width * chroma_height,
                chroma_width * chroma_height,
            ],
            planes: [packed(0, width), packed(1, chroma_width), packed(2, chroma_width)],
        }
    }

    /// The layout Android cameras use for `YUV_420_888`: a luma plane with padded rows, and a single buffer of
    /// interleaved V, U pairs that is exposed as two planes with a pixel stride of 2.
    ///
    /// The last row of each buffer is not padded.
    pub fn semi_planar_vu(size: PhysicalSize<u32>, row_padding: usize) -> Self {
        let (width, height) = (size.width as usize, size.height as usize);
        let chroma_height = height.div_ceil(2);
        // a chroma row holds width / 2 pairs
        let chroma_row = width.div_ceil(2) * 2;

        let luma_stride = width + row_padding;
        let chroma_stride = chroma_row + row_padding;

        let padded_len = |stride: usize, row: usize, rows: usize| {
            if rows == 0 { 0 } else { stride * (rows - 1) + row }
        };

        Self {
            size,
            buffer_lens: vec![
                padded_len(luma_stride, width, height),
                padded_len(chroma_stride, chroma_row, chroma_height),
            ],
            planes: [
                PlaneLayout {
                    buffer: 0,
                    offset: 0,
                    row_stride: luma_stride,
                    pixel_stride: 1,
                },
                PlaneLayout {
                    buffer: 1,
                    offset: 1,
                    row_stride: chroma_stride,
                    pixel_stride: 2,
                },
                PlaneLayout {
                    buffer: 1,
                    offset: 0,
                    row_stride: chroma_stride,
                    pixel_stride: 2,
                },
            ],
        }
    }
}

type BufferSet = Vec<Vec<u8>>;

#[derive(Debug)]
struct PoolState {
    free: Vec<BufferSet>,
    allocated: usize,
}

#[derive(Debug)]
struct PoolShared {
    capacity: usize,
    state: Mutex<PoolState>,
    next_sequence: AtomicU64,
}

/// Hands out at most `capacity` frames at a time.
///
/// Buffer sets are allocated lazily and recycled when a [`FrameLease`] is dropped.
#[derive(Debug, Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// The number of images the Android preview reader was allowed to hold.
    pub const DEFAULT_CAPACITY: usize = 2;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                state: Mutex::new(PoolState {
                    free: Vec::with_capacity(capacity),
                    allocated: 0,
                }),
                next_sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of leases currently alive.
    pub fn in_flight(&self) -> usize {
        let state = self.shared.state.lock();
        state.allocated - state.free.len()
    }

    /// Takes a free buffer set and sizes it for `layout`.
    ///
    /// The buffer contents are unspecified, the caller is expected to overwrite them.
    pub fn acquire(&self, layout: FrameLayout) -> Result<FrameLease, CaptureError> {
        let mut buffers = {
            let mut state = self.shared.state.lock();
            match state.free.pop() {
                Some(buffers) => buffers,
                None if state.allocated < self.shared.capacity => {
                    state.allocated += 1;
                    trace!(
                        "Allocating frame buffer set {}/{}",
                        state.allocated, self.shared.capacity
                    );
                    BufferSet::new()
                }
                None => {
                    return Err(CaptureError::ResourceExhaustion {
                        capacity: self.shared.capacity,
                    });
                }
            }
        };

        buffers.resize_with(layout.buffer_lens.len(), Vec::new);
        for (buffer, &len) in buffers.iter_mut().zip(&layout.buffer_lens) {
            buffer.resize(len, 0);
        }

        Ok(FrameLease {
            buffers,
            layout,
            sequence: self.shared.next_sequence.fetch_add(1, Ordering::Relaxed),
            pool: self.shared.clone(),
        })
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Exclusive access to one buffer set of a [`FramePool`]. The buffers go back to the pool on drop.
pub struct FrameLease {
    buffers: BufferSet,
    layout: FrameLayout,
    sequence: u64,
    pool: Arc<PoolShared>,
}

impl FrameLease {
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Position of this frame in the order frames were acquired from the pool.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn buffers_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.buffers
    }

    /// A view of the planes. It borrows the lease, so it cannot outlive the buffers going back to the pool.
    pub fn raw_frame(&self) -> RawFrame<'_> {
        let planes = self.layout.planes.map(|plane| {
            // an inconsistent layout shows up as a short plane when the frame is validated
            let data = self
                .buffers
                .get(plane.buffer)
                .and_then(|buffer| buffer.get(plane.offset..))
                .unwrap_or_default();
            Plane::new(data, plane.row_stride, plane.pixel_stride)
        });

        RawFrame::new(self.layout.size.width, self.layout.size.height, planes)
    }
}

impl fmt::Debug for FrameLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLease")
            .field("sequence", &self.sequence)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        let buffers = mem::take(&mut self.buffers);
        self.pool.state.lock().free.push(buffers);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use assert_matches::assert_matches;
    use lumen_core::convert;

    use super::*;

    fn size(width: u32, height: u32) -> PhysicalSize<u32> {
        PhysicalSize::new(width, height)
    }

    #[test]
    fn test_exhaustion_and_release() {
        let pool = FramePool::new(2);
        let layout = FrameLayout::planar(size(4, 4));

        let first = pool.acquire(layout.clone()).unwrap();
        let second = pool.acquire(layout.clone()).unwrap();
        assert_eq!(pool.in_flight(), 2);

        assert_matches!(
            pool.acquire(layout.clone()),
            Err(CaptureError::ResourceExhaustion { capacity: 2 })
        );

        drop(first);
        assert_eq!(pool.in_flight(), 1);
        let third = pool.acquire(layout).unwrap();
        assert!(third.sequence() > second.sequence());
    }

    #[test]
    fn test_release_on_unwind() {
        let pool = FramePool::new(1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _lease = pool.acquire(FrameLayout::planar(size(4, 4))).unwrap();
            panic!("callback failed");
        }));
        assert!(result.is_err());

        assert_eq!(pool.in_flight(), 0);
        assert!(pool.acquire(FrameLayout::planar(size(4, 4))).is_ok());
    }

    #[test]
    fn test_buffers_are_reused() {
        let pool = FramePool::new(1);
        let layout = FrameLayout::planar(size(16, 8));

        let mut lease = pool.acquire(layout.clone()).unwrap();
        let pointer = lease.buffers_mut()[0].as_ptr();
        drop(lease);

        let mut lease = pool.acquire(layout).unwrap();
        assert_eq!(lease.buffers_mut()[0].as_ptr(), pointer);
    }

    #[test]
    fn test_buffers_follow_layout() {
        let pool = FramePool::new(1);

        let mut lease = pool.acquire(FrameLayout::planar(size(16, 8))).unwrap();
        let lens = lease.buffers_mut().iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(lens, [128, 32, 32]);
        drop(lease);

        let mut lease = pool
            .acquire(FrameLayout::semi_planar_vu(size(16, 8), 4))
            .unwrap();
        let lens = lease.buffers_mut().iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(lens, [20 * 7 + 16, 20 * 3 + 16]);
    }

    #[test]
    fn test_semi_planar_views() {
        let pool = FramePool::new(1);
        let mut lease = pool
            .acquire(FrameLayout::semi_planar_vu(size(4, 2), 3))
            .unwrap();

        lease.buffers_mut()[0].fill(16);
        // V, U, V, U, then padding
        lease.buffers_mut()[1].copy_from_slice(&[200, 100, 201, 101]);

        let raw = lease.raw_frame();
        let [y, u, v] = raw.planes.as_slice() else {
            panic!("expected 3 planes");
        };
        assert_eq!(y.row_stride, 7);
        assert_eq!((u.sample(0, 0), u.sample(1, 0)), (100, 101));
        assert_eq!((v.sample(0, 0), v.sample(1, 0)), (200, 201));

        let nv12 = convert::pack_nv12(&raw).unwrap();
        assert_eq!(nv12.uv_plane(), &[100, 200, 101, 201]);
    }
}
