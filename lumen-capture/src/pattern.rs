//! A synthetic sensor: color bars scrolling to the left, laid out the way an Android camera delivers frames.

use dpi::PhysicalSize;
use lumen_core::convert::rgb_to_yuv;

use crate::{CaptureError, FrameLayout, FrameLease, FramePool, FrameSource};

const BAR_COLORS: [[u8; 3]; 8] = [
    [0xff, 0xff, 0xff],
    [0xff, 0xff, 0x00],
    [0x00, 0xff, 0xff],
    [0x00, 0xff, 0x00],
    [0xff, 0x00, 0xff],
    [0xff, 0x00, 0x00],
    [0x00, 0x00, 0xff],
    [0x00, 0x00, 0x00],
];

/// Horizontal scroll per frame, in pixels. Even, so the bars stay aligned to chroma pairs.
const SCROLL_STEP: u64 = 4;

pub struct TestPatternSource {
    layout: FrameLayout,
    bars: [[u8; 3]; 8],
    frame_index: u64,
}

impl TestPatternSource {
    /// `row_padding` extra bytes are added to the end of every row, like the alignment padding of real sensors.
    pub fn new(size: PhysicalSize<u32>, row_padding: usize) -> Self {
        Self {
            layout: FrameLayout::semi_planar_vu(size, row_padding),
            bars: BAR_COLORS.map(|[r, g, b]| rgb_to_yuv(r, g, b)),
            frame_index: 0,
        }
    }

    /// The RGB color of the bar covering column `x` in frame number `frame_index`.
    pub fn bar_color(&self, x: u32, frame_index: u64) -> [u8; 3] {
        BAR_COLORS[self.bar_index(x, frame_index)]
    }

    fn bar_index(&self, x: u32, frame_index: u64) -> usize {
        let width = self.layout.size.width.max(1) as u64;
        let scrolled = (x as u64 + frame_index * SCROLL_STEP) % width;
        (scrolled * BAR_COLORS.len() as u64 / width) as usize
    }

    fn fill(&self, lease: &mut FrameLease) {
        let PhysicalSize { width, height } = self.layout.size;
        let [y_plane, _, v_plane] = self.layout.planes;

        let columns = (0..width)
            .map(|x| self.bars[self.bar_index(x, self.frame_index)])
            .collect::<Vec<_>>();

        let [luma, chroma] = lease.buffers_mut() else {
            return;
        };

        for row in 0..height as usize {
            let out = &mut luma[row * y_plane.row_stride..][..width as usize];
            for (dst, [y, _, _]) in out.iter_mut().zip(&columns) {
                *dst = *y;
            }
        }

        // the V plane starts at the beginning of the chroma buffer, so each pair is V then U
        for row in 0..height.div_ceil(2) as usize {
            let out = &mut chroma[row * v_plane.row_stride..];
            for (pair, [_, u, v]) in out.chunks_exact_mut(2).zip(columns.iter().step_by(2)) {
                pair[0] = *v;
                pair[1] = *u;
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        "test pattern"
    }

    fn frame_size(&self) -> PhysicalSize<u32> {
        self.layout.size
    }

    fn next_frame(&mut self, pool: &FramePool) -> Result<Option<FrameLease>, CaptureError> {
        let mut lease = pool.acquire(self.layout.clone())?;
        self.fill(&mut lease);
        self.frame_index += 1;

        Ok(Some(lease))
    }
}

#[cfg(test)]
mod tests {
    use lumen_core::convert;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn assert_close(actual: [u8; 3], expected: [u8; 3], context: &str) {
        for (a, e) in actual.into_iter().zip(expected) {
            assert!(a.abs_diff(e) <= 2, "{context}: got {actual:?}, expected {expected:?}");
        }
    }

    #[test]
    fn test_bars_survive_conversion() {
        let pool = FramePool::new(1);
        let mut source = TestPatternSource::new(PhysicalSize::new(64, 8), 12);

        let lease = source.next_frame(&pool).unwrap().unwrap();
        let (color, _) = convert(&lease.raw_frame()).unwrap();

        // sample the middle of each bar, away from chroma pairs shared by two bars
        for bar in 0..8 {
            let x = bar * 8 + 4;
            for y in [0, 7] {
                let [r, g, b, a] = color.get_pixel(x, y).0;
                assert_eq!(a, 0xff);
                assert_close([r, g, b], BAR_COLORS[bar as usize], &format!("({x}, {y})"));
            }
        }
    }

    #[test]
    fn test_bars_scroll() {
        let pool = FramePool::new(1);
        let mut source = TestPatternSource::new(PhysicalSize::new(64, 4), 0);

        let colors = (0..4)
            .map(|frame_index| {
                let lease = source.next_frame(&pool).unwrap().unwrap();
                let (color, _) = convert(&lease.raw_frame()).unwrap();
                assert_close(
                    {
                        let [r, g, b, _] = color.get_pixel(0, 0).0;
                        [r, g, b]
                    },
                    source.bar_color(0, frame_index),
                    &format!("frame {frame_index}"),
                );
                source.bar_color(0, frame_index)
            })
            .collect::<Vec<_>>();

        // bars are 8 pixels wide and move 4 pixels per frame
        assert_eq!(colors, [BAR_COLORS[0], BAR_COLORS[0], BAR_COLORS[1], BAR_COLORS[1]]);
    }

    #[test]
    fn test_frames_are_pooled() {
        let pool = FramePool::new(2);
        let mut source = TestPatternSource::new(PhysicalSize::new(16, 16), 8);

        let first = source.next_frame(&pool).unwrap().unwrap();
        let _second = source.next_frame(&pool).unwrap().unwrap();
        assert!(source.next_frame(&pool).is_err());

        drop(first);
        assert!(source.next_frame(&pool).is_ok());
    }

    #[test]
    fn test_row_padding_is_invisible() {
        let mut rng = StdRng::seed_from_u64(0x42);
        let pool = FramePool::new(2);

        for _ in 0..20 {
            let size = PhysicalSize::new(
                rng.random_range(1..=40u32) * 2,
                rng.random_range(1..=20u32) * 2,
            );
            let padding = rng.random_range(1..64usize);

            let packed = TestPatternSource::new(size, 0).next_frame(&pool).unwrap().unwrap();
            let padded = TestPatternSource::new(size, padding)
                .next_frame(&pool)
                .unwrap()
                .unwrap();

            let (packed_color, packed_luma) = convert(&packed.raw_frame()).unwrap();
            let (padded_color, padded_luma) = convert(&padded.raw_frame()).unwrap();
            let context = format!("{size:?} padded by {padding}");
            assert_eq!(packed_color.as_raw(), padded_color.as_raw(), "{context}");
            assert_eq!(packed_luma.as_raw(), padded_luma.as_raw(), "{context}");
        }
    }
}
