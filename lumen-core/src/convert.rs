//! Pixel format conversion: 3-plane YUV 4:2:0 -> NV12 -> RGBA -> luma.
//!
//! The chroma pairs in the intermediate NV12 buffer are ordered U first, then V. The YUV -> RGB step uses
//! the ITU-R BT.601 "video range" transform (Y in 16..=235, chroma in 16..=240), which is what camera sensors emit.

use dpi::PhysicalSize;
use tracing::trace;

use crate::{
    error::LayoutError,
    frame::{ColorFrame, LumaFrame, Nv12Frame, Plane, RawFrame},
};

// BT.601 video range coefficients in 20-bit fixed point
const YUV_SHIFT: u32 = 20;
const YUV_ROUND: i32 = 1 << (YUV_SHIFT - 1);
const CY: i32 = 1_220_542; // 1.164
const CUB: i32 = 2_116_026; // 2.018
const CUG: i32 = -409_993; // -0.391
const CVG: i32 = -852_492; // -0.813
const CVR: i32 = 1_673_527; // 1.596

// Rec.601 luma weights in 14-bit fixed point, they sum up to 1 << 14
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// Converts a raw sensor frame into the RGBA frame to display and the luma frame to analyze.
///
/// Nothing returned borrows from `raw`.
pub fn convert(raw: &RawFrame) -> Result<(ColorFrame, LumaFrame), LayoutError> {
    let nv12 = pack_nv12(raw)?;
    let color = nv12_to_rgba(&nv12);
    let luma = rgba_to_luma(&color);

    Ok((color, luma))
}

/// Validates the layout of `raw`, returning its planes in Y, U, V order.
fn validate<'f, 'a>(raw: &'f RawFrame<'a>) -> Result<[&'f Plane<'a>; 3], LayoutError> {
    let [y, u, v] = raw.planes.as_slice() else {
        return Err(LayoutError::PlaneCount {
            found: raw.planes.len(),
        });
    };

    let PhysicalSize { width, height } = raw.size;
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(LayoutError::Dimensions { width, height });
    }

    let (width, height) = (width as usize, height as usize);
    let expected = [(width, height), (width / 2, height / 2), (width / 2, height / 2)];

    for (index, (plane, (samples, rows))) in [y, u, v].into_iter().zip(expected).enumerate() {
        if plane.pixel_stride == 0 {
            return Err(LayoutError::ZeroPixelStride { plane: index });
        }
        let row_len = plane
            .row_len(samples)
            .ok_or(LayoutError::StrideOverflow { plane: index })?;
        if rows > 1 && plane.row_stride < row_len {
            return Err(LayoutError::RowStrideTooSmall {
                plane: index,
                row_stride: plane.row_stride,
                samples,
                pixel_stride: plane.pixel_stride,
            });
        }
        let required = plane
            .required_len(samples, rows)
            .ok_or(LayoutError::StrideOverflow { plane: index })?;
        if plane.data.len() < required {
            return Err(LayoutError::PlaneTooShort {
                plane: index,
                required,
                actual: plane.data.len(),
            });
        }
    }

    Ok([y, u, v])
}

/// Repacks the three planes into a single NV12 buffer, dropping any row padding.
pub fn pack_nv12(raw: &RawFrame) -> Result<Nv12Frame, LayoutError> {
    let [y, u, v] = validate(raw)?;

    let width = raw.width() as usize;
    let mut data = vec![0; Nv12Frame::buffer_len(raw.size)];
    let (luma_out, chroma_out) = data.split_at_mut(width * raw.height() as usize);

    for (row, out) in luma_out.chunks_exact_mut(width).enumerate() {
        match y.packed_row(row, width) {
            Some(src) => out.copy_from_slice(src),
            None => {
                for (col, dst) in out.iter_mut().enumerate() {
                    *dst = y.sample(col, row);
                }
            }
        }
    }

    // a chroma row has width / 2 (U, V) pairs, which is exactly `width` bytes
    for (row, out) in chroma_out.chunks_exact_mut(width).enumerate() {
        for (col, pair) in out.chunks_exact_mut(2).enumerate() {
            pair[0] = u.sample(col, row);
            pair[1] = v.sample(col, row);
        }
    }

    trace!(
        "Packed {}x{} frame into NV12 ({} bytes)",
        raw.width(),
        raw.height(),
        data.len()
    );

    Ok(Nv12Frame {
        data,
        size: raw.size,
    })
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts a single BT.601 video range YUV sample into RGB.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = (y as i32 - 16) * CY;
    let u = u as i32 - 128;
    let v = v as i32 - 128;

    let r = (y + CVR * v + YUV_ROUND) >> YUV_SHIFT;
    let g = (y + CVG * v + CUG * u + YUV_ROUND) >> YUV_SHIFT;
    let b = (y + CUB * u + YUV_ROUND) >> YUV_SHIFT;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

/// The inverse of [`yuv_to_rgb`], up to rounding.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let y = 16.0 + (65.481 * r + 128.553 * g + 24.966 * b) / 255.0;
    let u = 128.0 + (-37.797 * r - 74.203 * g + 112.0 * b) / 255.0;
    let v = 128.0 + (112.0 * r - 93.786 * g - 18.214 * b) / 255.0;

    [y, u, v].map(|c| c.round().clamp(0.0, 255.0) as u8)
}

pub fn nv12_to_rgba(nv12: &Nv12Frame) -> ColorFrame {
    let PhysicalSize { width, height } = nv12.size;
    let row_len = width as usize;

    let y_plane = nv12.y_plane();
    let uv_plane = nv12.uv_plane();

    let mut color = ColorFrame::new(width, height);
    for (row, out) in color.chunks_exact_mut(row_len * 4).enumerate() {
        let y_row = &y_plane[row * row_len..][..row_len];
        let uv_row = &uv_plane[(row / 2) * row_len..][..row_len];

        // each chroma pair covers two horizontally adjacent pixels
        for ((pixels, ys), uv) in out
            .chunks_exact_mut(8)
            .zip(y_row.chunks_exact(2))
            .zip(uv_row.chunks_exact(2))
        {
            let (u, v) = (uv[0], uv[1]);
            let [r0, g0, b0] = yuv_to_rgb(ys[0], u, v);
            let [r1, g1, b1] = yuv_to_rgb(ys[1], u, v);
            pixels.copy_from_slice(&[r0, g0, b0, 0xff, r1, g1, b1, 0xff]);
        }
    }

    color
}

#[inline]
pub fn rgb_luminance(r: u8, g: u8, b: u8) -> u8 {
    let sum = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
}

pub fn rgba_to_luma(color: &ColorFrame) -> LumaFrame {
    let (width, height) = color.dimensions();

    let mut luma = LumaFrame::new(width, height);
    for (dst, rgba) in luma.iter_mut().zip(color.chunks_exact(4)) {
        *dst = rgb_luminance(rgba[0], rgba[1], rgba[2]);
    }

    luma
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    struct PlanarBuffers {
        width: u32,
        height: u32,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    }

    impl PlanarBuffers {
        fn solid(width: u32, height: u32, [y, u, v]: [u8; 3]) -> Self {
            let luma = (width * height) as usize;
            Self {
                width,
                height,
                y: vec![y; luma],
                u: vec![u; luma / 4],
                v: vec![v; luma / 4],
            }
        }

        fn random(width: u32, height: u32, rng: &mut StdRng) -> Self {
            let luma = (width * height) as usize;
            let mut gen_plane =
                |len: usize| -> Vec<u8> { (0..len).map(|_| rng.random::<u8>()).collect() };
            Self {
                width,
                height,
                y: gen_plane(luma),
                u: gen_plane(luma / 4),
                v: gen_plane(luma / 4),
            }
        }

        fn raw_frame(&self) -> RawFrame<'_> {
            let chroma_width = self.width as usize / 2;
            RawFrame::new(
                self.width,
                self.height,
                [
                    Plane::packed(&self.y, self.width as usize),
                    Plane::packed(&self.u, chroma_width),
                    Plane::packed(&self.v, chroma_width),
                ],
            )
        }
    }

    /// The same content as `planes`, but laid out like an Android `YUV_420_888` image:
    /// padded rows and a single interleaved V/U buffer viewed through two planes with pixel stride 2.
    struct InterleavedBuffers {
        width: u32,
        height: u32,
        y: Vec<u8>,
        y_stride: usize,
        vu: Vec<u8>,
        vu_stride: usize,
    }

    impl InterleavedBuffers {
        fn from_planar(planes: &PlanarBuffers, padding: usize, rng: &mut StdRng) -> Self {
            let width = planes.width as usize;
            let height = planes.height as usize;
            let y_stride = width + padding;
            let vu_stride = width + padding;

            // fill the padding with garbage, so that reading it would show up in the output
            let mut y = (0..y_stride * height)
                .map(|_| rng.random::<u8>())
                .collect::<Vec<_>>();
            let mut vu = (0..vu_stride * height / 2)
                .map(|_| rng.random::<u8>())
                .collect::<Vec<_>>();

            for row in 0..height {
                y[row * y_stride..][..width].copy_from_slice(&planes.y[row * width..][..width]);
            }
            for row in 0..height / 2 {
                for col in 0..width / 2 {
                    vu[row * vu_stride + col * 2] = planes.v[row * width / 2 + col];
                    vu[row * vu_stride + col * 2 + 1] = planes.u[row * width / 2 + col];
                }
            }

            Self {
                width: planes.width,
                height: planes.height,
                y,
                y_stride,
                vu,
                vu_stride,
            }
        }

        fn raw_frame(&self) -> RawFrame<'_> {
            RawFrame::new(
                self.width,
                self.height,
                [
                    Plane::new(&self.y, self.y_stride, 1),
                    Plane::new(&self.vu[1..], self.vu_stride, 2),
                    Plane::new(&self.vu, self.vu_stride, 2),
                ],
            )
        }
    }

    fn assert_uniform_within(color: &ColorFrame, expected: [u8; 3], tolerance: u8) {
        for (index, pixel) in color.pixels().enumerate() {
            let [r, g, b, a] = pixel.0;
            for (actual, expected) in [r, g, b].into_iter().zip(expected) {
                assert!(
                    actual.abs_diff(expected) <= tolerance,
                    "pixel {} is {:?}, expected {:?}",
                    index,
                    pixel.0,
                    expected
                );
            }
            assert_eq!(a, 0xff);
        }
    }

    #[test]
    fn test_solid_color_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x42);

        let mut colors = vec![
            [0, 0, 0],
            [255, 255, 255],
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [128, 128, 128],
            [255, 128, 0],
        ];
        colors.extend((0..50).map(|_| [rng.random(), rng.random(), rng.random()]));

        for [r, g, b] in colors {
            let planes = PlanarBuffers::solid(16, 8, rgb_to_yuv(r, g, b));
            let (color, _) = convert(&planes.raw_frame()).unwrap();
            assert_uniform_within(&color, [r, g, b], 2);
        }
    }

    #[test]
    fn test_chroma_channel_order() {
        // BT.601 pure blue and pure red only differ by which chroma channel is saturated
        let blue = PlanarBuffers::solid(4, 4, [41, 240, 110]);
        let (color, _) = convert(&blue.raw_frame()).unwrap();
        assert_uniform_within(&color, [0, 0, 255], 2);

        let red = PlanarBuffers::solid(4, 4, [81, 90, 240]);
        let (color, _) = convert(&red.raw_frame()).unwrap();
        assert_uniform_within(&color, [255, 0, 0], 2);
    }

    #[test]
    fn test_nv12_packing_order() {
        let planes = PlanarBuffers {
            width: 4,
            height: 2,
            y: (0..8).collect(),
            u: vec![100, 101],
            v: vec![200, 201],
        };

        let nv12 = pack_nv12(&planes.raw_frame()).unwrap();
        assert_eq!(nv12.y_plane(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(nv12.uv_plane(), &[100, 200, 101, 201]);
        assert_eq!(nv12.data.len(), 4 * 2 + 4 * 2 / 2);
    }

    #[test]
    fn test_padding_is_ignored() {
        let mut rng = StdRng::seed_from_u64(0x42);

        for (width, height) in [(2, 2), (16, 8), (38, 14), (64, 48)] {
            let planes = PlanarBuffers::random(width, height, &mut rng);
            let (expected_color, expected_luma) = convert(&planes.raw_frame()).unwrap();

            for padding in [0, 1, 7, 32] {
                let interleaved = InterleavedBuffers::from_planar(&planes, padding, &mut rng);
                let (color, luma) = convert(&interleaved.raw_frame()).unwrap();

                assert_eq!(color, expected_color, "{width}x{height}, padding {padding}");
                assert_eq!(luma, expected_luma, "{width}x{height}, padding {padding}");
            }
        }
    }

    #[test]
    fn test_output_does_not_borrow_source() {
        let mut rng = StdRng::seed_from_u64(0x42);
        let mut planes = PlanarBuffers::random(32, 16, &mut rng);

        let (color, luma) = convert(&planes.raw_frame()).unwrap();
        let (color_before, luma_before) = (color.clone(), luma.clone());

        planes.y.fill(0);
        planes.u.fill(0);
        planes.v.fill(0);

        assert_eq!(color, color_before);
        assert_eq!(luma, luma_before);
    }

    #[test]
    fn test_mid_gray() {
        let planes = PlanarBuffers::solid(64, 32, [128, 128, 128]);
        let (color, luma) = convert(&planes.raw_frame()).unwrap();

        assert_uniform_within(&color, [130, 130, 130], 1);
        let first = luma.as_raw()[0];
        assert!(luma.iter().all(|&l| l == first));
        assert!(first.abs_diff(130) <= 1);
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(rgb_luminance(0, 0, 0), 0);
        assert_eq!(rgb_luminance(255, 255, 255), 255);
        assert_eq!(rgb_luminance(255, 0, 0), 76);
        assert_eq!(rgb_luminance(0, 255, 0), 150);
        assert_eq!(rgb_luminance(0, 0, 255), 29);
    }

    #[test]
    fn test_rejects_wrong_plane_count() {
        let planes = PlanarBuffers::solid(4, 4, [16, 128, 128]);
        let mut raw = planes.raw_frame();
        raw.planes.pop();

        assert_matches!(convert(&raw), Err(LayoutError::PlaneCount { found: 2 }));
    }

    #[test]
    fn test_rejects_odd_dimensions() {
        let planes = PlanarBuffers::solid(4, 4, [16, 128, 128]);
        let mut raw = planes.raw_frame();
        raw.size = PhysicalSize::new(3, 4);

        assert_matches!(
            convert(&raw),
            Err(LayoutError::Dimensions {
                width: 3,
                height: 4
            })
        );

        raw.size = PhysicalSize::new(0, 0);
        assert_matches!(convert(&raw), Err(LayoutError::Dimensions { .. }));
    }

    #[test]
    fn test_rejects_short_plane() {
        let planes = PlanarBuffers::solid(8, 4, [16, 128, 128]);
        let mut raw = planes.raw_frame();
        raw.planes[2].data = &planes.v[..planes.v.len() - 1];

        assert_matches!(
            convert(&raw),
            Err(LayoutError::PlaneTooShort {
                plane: 2,
                required: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn test_rejects_overlapping_rows() {
        let planes = PlanarBuffers::solid(8, 4, [16, 128, 128]);
        let mut raw = planes.raw_frame();
        raw.planes[1].pixel_stride = 2;

        assert_matches!(
            convert(&raw),
            Err(LayoutError::RowStrideTooSmall { plane: 1, .. })
        );

        raw.planes[1].pixel_stride = 0;
        assert_matches!(convert(&raw), Err(LayoutError::ZeroPixelStride { plane: 1 }));
    }

    #[test]
    fn test_rejects_huge_strides() {
        let planes = PlanarBuffers::solid(8, 4, [16, 128, 128]);

        let mut raw = planes.raw_frame();
        raw.planes[0].row_stride = usize::MAX / 2;
        assert_matches!(convert(&raw), Err(LayoutError::StrideOverflow { plane: 0 }));

        let mut raw = planes.raw_frame();
        raw.planes[2].row_stride = 2;
        raw.planes[2].pixel_stride = usize::MAX;
        assert_matches!(convert(&raw), Err(LayoutError::StrideOverflow { plane: 2 }));

        // large but representable strides are only too short for their plane
        let mut raw = planes.raw_frame();
        raw.planes[1].row_stride = usize::MAX / 4;
        assert_matches!(convert(&raw), Err(LayoutError::PlaneTooShort { plane: 1, .. }));
    }

    #[test]
    fn test_footroom_luma_follows_transform() {
        // below black level the transform goes negative before clamping, so strong chroma still shows
        assert_eq!(yuv_to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(8, 128, 255), [193, 0, 0]);
        assert_eq!(yuv_to_rgb(10, 255, 128), [0, 0, 249]);
    }
}
