use tracing::trace;

use super::FeatureExtractor;
use crate::{
    error::ExtractionError,
    frame::{ColorFrame, LumaFrame},
};

/// Gradient magnitude thresholds for the hysteresis step.
///
/// Pixels above `high` start an edge, pixels above `low` continue one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EdgeThresholds {
    pub low: u32,
    pub high: u32,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self { low: 50, high: 150 }
    }
}

const NOT_EDGE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Gradient direction, quantized to the four neighbour axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Vertical,
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

impl Direction {
    fn quantize(gx: i32, gy: i32) -> Self {
        // tan(22.5deg) in 15-bit fixed point, tan(67.5deg) = tan(22.5deg) + 2
        const TAN_22_5: i64 = 13573;

        let ax = gx.unsigned_abs() as i64;
        let ay = (gy.unsigned_abs() as i64) << 15;
        let tan_22 = ax * TAN_22_5;
        let tan_67 = tan_22 + (ax << 16);

        if ay < tan_22 {
            Direction::Horizontal
        } else if ay > tan_67 {
            Direction::Vertical
        } else if (gx ^ gy) < 0 {
            Direction::AntiDiagonal
        } else {
            Direction::Diagonal
        }
    }

    fn offset(self) -> (isize, isize) {
        match self {
            Direction::Horizontal => (1, 0),
            Direction::Vertical => (0, 1),
            Direction::Diagonal => (1, 1),
            Direction::AntiDiagonal => (-1, 1),
        }
    }
}

/// Canny-style edge detector that replaces the color frame with its edge map.
///
/// Sobel 3x3 gradients with L1 magnitude, non-maximum suppression and hysteresis thresholding.
/// Scratch buffers are kept between frames.
#[derive(Debug)]
pub struct EdgeExtractor {
    thresholds: EdgeThresholds,
    magnitude: Vec<u32>,
    direction: Vec<Direction>,
    marks: Vec<u8>,
    stack: Vec<usize>,
}

impl EdgeExtractor {
    pub fn new(thresholds: EdgeThresholds) -> Self {
        let EdgeThresholds { low, high } = thresholds;
        let thresholds = EdgeThresholds {
            low: low.min(high),
            high: low.max(high),
        };

        Self {
            thresholds,
            magnitude: Vec::new(),
            direction: Vec::new(),
            marks: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn thresholds(&self) -> EdgeThresholds {
        self.thresholds
    }

    /// Returns a map with 255 on edge pixels and 0 everywhere else.
    pub fn detect(&mut self, luma: &LumaFrame) -> LumaFrame {
        let (width, height) = luma.dimensions();
        let (w, h) = (width as usize, height as usize);

        let mut edges = LumaFrame::new(width, height);
        if w == 0 || h == 0 {
            return edges;
        }

        self.compute_gradients(luma, w, h);
        self.suppress_non_maxima(w, h);
        self.follow_edges(w, h);

        for (dst, &mark) in edges.iter_mut().zip(&self.marks) {
            *dst = if mark == STRONG { 0xff } else { 0 };
        }

        edges
    }

    fn compute_gradients(&mut self, luma: &LumaFrame, w: usize, h: usize) {
        let pixels = luma.as_raw();
        let at = |x: usize, y: usize| pixels[y * w + x] as i32;

        self.magnitude.clear();
        self.magnitude.resize(w * h, 0);
        self.direction.clear();
        self.direction.resize(w * h, Direction::Horizontal);

        // borders are handled by replicating the edge pixels
        for y in 0..h {
            let (up, down) = (y.saturating_sub(1), (y + 1).min(h - 1));
            for x in 0..w {
                let (left, right) = (x.saturating_sub(1), (x + 1).min(w - 1));

                let gx = at(right, up) + 2 * at(right, y) + at(right, down)
                    - at(left, up)
                    - 2 * at(left, y)
                    - at(left, down);
                let gy = at(left, down) + 2 * at(x, down) + at(right, down)
                    - at(left, up)
                    - 2 * at(x, up)
                    - at(right, up);

                let index = y * w + x;
                self.magnitude[index] = gx.unsigned_abs() + gy.unsigned_abs();
                self.direction[index] = Direction::quantize(gx, gy);
            }
        }
    }

    fn suppress_non_maxima(&mut self, w: usize, h: usize) {
        let EdgeThresholds { low, high } = self.thresholds;
        let magnitude = &self.magnitude;
        let marks = &mut self.marks;

        marks.clear();
        marks.resize(w * h, NOT_EDGE);

        let magnitude_at = |x: isize, y: isize| {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0
            } else {
                magnitude[y as usize * w + x as usize]
            }
        };

        for y in 0..h {
            for x in 0..w {
                let index = y * w + x;
                let m = magnitude[index];
                if m <= low {
                    continue;
                }

                let (dx, dy) = self.direction[index].offset();
                let (x, y) = (x as isize, y as isize);
                let prev = magnitude_at(x - dx, y - dy);
                let next = magnitude_at(x + dx, y + dy);

                // the asymmetric comparison picks a single pixel on plateaus
                if m > prev && m >= next {
                    marks[index] = if m > high { STRONG } else { WEAK };
                }
            }
        }
    }

    fn follow_edges(&mut self, w: usize, h: usize) {
        let marks = &mut self.marks;
        let stack = &mut self.stack;

        stack.clear();
        stack.extend(
            marks
                .iter()
                .enumerate()
                .filter(|&(_, &mark)| mark == STRONG)
                .map(|(index, _)| index),
        );

        while let Some(index) = stack.pop() {
            let (x, y) = (index % w, index / w);
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let neighbour = ny * w + nx;
                    if marks[neighbour] == WEAK {
                        marks[neighbour] = STRONG;
                        stack.push(neighbour);
                    }
                }
            }
        }
    }
}

impl Default for EdgeExtractor {
    fn default() -> Self {
        Self::new(EdgeThresholds::default())
    }
}

impl FeatureExtractor for EdgeExtractor {
    fn name(&self) -> &str {
        "edges"
    }

    fn extract(
        &mut self,
        luma: &LumaFrame,
        color: &mut ColorFrame,
    ) -> Result<(), ExtractionError> {
        let (luma_width, luma_height) = luma.dimensions();
        let (color_width, color_height) = color.dimensions();
        if (luma_width, luma_height) != (color_width, color_height) {
            return Err(ExtractionError::DimensionMismatch {
                luma_width,
                luma_height,
                color_width,
                color_height,
            });
        }

        let edges = self.detect(luma);
        for (pixel, &edge) in color.chunks_exact_mut(4).zip(edges.iter()) {
            pixel.copy_from_slice(&[edge, edge, edge, 0xff]);
        }

        trace!(
            "Edge pass over {}x{}: {} edge pixels",
            luma_width,
            luma_height,
            edges.iter().filter(|&&e| e != 0).count()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn vertical_step(width: u32, height: u32, split: u32, left: u8, right: u8) -> LumaFrame {
        LumaFrame::from_fn(width, height, |x, _| {
            image::Luma([if x < split { left } else { right }])
        })
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let mut extractor = EdgeExtractor::default();
        let edges = extractor.detect(&LumaFrame::from_pixel(16, 16, image::Luma([77])));
        assert!(edges.iter().all(|&e| e == 0));
    }

    #[test]
    fn test_step_produces_single_column() {
        let mut extractor = EdgeExtractor::default();
        let edges = extractor.detect(&vertical_step(16, 12, 8, 0, 255));

        for (x, y, pixel) in edges.enumerate_pixels() {
            let expected = if x == 7 { 0xff } else { 0 };
            assert_eq!(pixel.0[0], expected, "at ({x}, {y})");
        }
    }

    #[test]
    fn test_weak_only_edges_are_dropped() {
        let mut extractor = EdgeExtractor::default();

        // L1 sobel magnitude of a step is 4 times the contrast
        // 4 * 20 = 80 is between the thresholds, but nothing strong connects to it
        let edges = extractor.detect(&vertical_step(16, 12, 8, 0, 20));
        assert!(edges.iter().all(|&e| e == 0));

        // 4 * 10 = 40 is below the low threshold
        let edges = extractor.detect(&vertical_step(16, 12, 8, 0, 10));
        assert!(edges.iter().all(|&e| e == 0));
    }

    #[test]
    fn test_weak_edge_connected_to_strong_survives() {
        // the top half has a strong step, the bottom half continues it with a weak one
        let luma = LumaFrame::from_fn(16, 16, |x, y| {
            let right = if y < 8 { 200 } else { 20 };
            image::Luma([if x < 8 { 0 } else { right }])
        });

        let mut extractor = EdgeExtractor::default();
        let edges = extractor.detect(&luma);

        // the edge can jog sideways where the contrast changes, but never breaks
        for y in 0..16 {
            assert!(
                (6..=9).any(|x| edges.get_pixel(x, y).0[0] == 0xff),
                "row {y} has no edge"
            );
        }
        for y in 10..16 {
            assert_eq!(edges.get_pixel(7, y).0[0], 0xff, "row {y}");
        }
    }

    #[test]
    fn test_extract_overwrites_color() {
        let luma = vertical_step(8, 4, 4, 0, 255);
        let mut color = ColorFrame::from_pixel(8, 4, image::Rgba([10, 20, 30, 0xff]));

        EdgeExtractor::default()
            .extract(&luma, &mut color)
            .unwrap();

        for (x, _, pixel) in color.enumerate_pixels() {
            let expected = if x == 3 { 0xff } else { 0 };
            assert_eq!(pixel.0, [expected, expected, expected, 0xff]);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let luma = LumaFrame::new(8, 4);
        let mut color = ColorFrame::new(4, 8);

        assert_matches!(
            EdgeExtractor::default().extract(&luma, &mut color),
            Err(ExtractionError::DimensionMismatch {
                luma_width: 8,
                color_width: 4,
                ..
            })
        );
    }

    #[test]
    fn test_thresholds_are_ordered() {
        let extractor = EdgeExtractor::new(EdgeThresholds { low: 150, high: 50 });
        assert_eq!(extractor.thresholds(), EdgeThresholds { low: 50, high: 150 });
    }
}
