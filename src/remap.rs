//! Bilinear resampling of a fisheye frame through a [`ProjectionMap`].

use crate::{frame::FisheyeFrame, projection::ProjectionMap};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

/// Value of every sample that falls outside the source frame.
pub const BORDER: Rgb<u8> = Rgb([0, 0, 0]);

/// Synthesize a view by sampling `frame` at every coordinate of `map`.
pub fn remap(frame: &FisheyeFrame, map: &ProjectionMap) -> RgbImage {
    let src = frame.pixels();
    let mut out = RgbImage::new(map.width(), map.height());

    out.par_chunks_mut(3)
        .zip(map.map_x().par_iter().zip(map.map_y().par_iter()))
        .for_each(|(px, (&x, &y))| {
            px.copy_from_slice(&sample_bilinear(src, x, y).0);
        });

    out
}

/// Sample `src` at the fractional location `(x, y)`.
///
/// Each of the four neighbours that lies outside `src` contributes
/// [`BORDER`], so samples fade to black across the frame edge.
pub fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (src.width() as f32, src.height() as f32);
    if !(x > -1. && y > -1. && x < w && y < h) {
        // Also catches NaN.
        return BORDER;
    }

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let taps = [
        (x0, y0, (1. - fx) * (1. - fy)),
        (x0 + 1, y0, fx * (1. - fy)),
        (x0, y0 + 1, (1. - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];

    let mut acc = [0f32; 3];
    for (tx, ty, weight) in taps {
        if weight == 0. {
            continue;
        }
        if let Some(px) = pixel_at(src, tx, ty) {
            for (a, c) in acc.iter_mut().zip(px.0) {
                *a += weight * c as f32;
            }
        }
    }

    Rgb(acc.map(|v| v.round().clamp(0., 255.) as u8))
}

fn pixel_at(src: &RgbImage, x: i64, y: i64) -> Option<&Rgb<u8>> {
    if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
        return None;
    }

    Some(src.get_pixel(x as u32, y as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(4, 4, |x, y| Rgb([(x * 60) as u8, (y * 60) as u8, 200]))
    }

    #[test]
    fn integer_location_is_exact() {
        let src = gradient();
        assert_eq!(sample_bilinear(&src, 2., 1.), *src.get_pixel(2, 1));
    }

    #[test]
    fn midpoint_averages_neighbours() {
        let src = gradient();
        assert_eq!(sample_bilinear(&src, 1.5, 2.5), Rgb([90, 150, 200]));
    }

    #[rstest]
    #[case(-1.0, 0.0)]
    #[case(0.0, -1.5)]
    #[case(4.0, 1.0)]
    #[case(1.0, 10.0)]
    #[case(f32::NAN, 1.0)]
    #[case(1.0, f32::INFINITY)]
    fn outside_is_border(#[case] x: f32, #[case] y: f32) {
        assert_eq!(sample_bilinear(&gradient(), x, y), BORDER);
    }

    #[test]
    fn edge_blends_towards_border() {
        let src = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        assert_eq!(sample_bilinear(&src, -0.5, 1.), Rgb([100, 100, 100]));
        assert_eq!(sample_bilinear(&src, 3.5, 1.), Rgb([100, 100, 100]));
        assert_eq!(sample_bilinear(&src, 3., 3.), Rgb([200, 200, 200]));
    }

    #[test]
    fn remap_uses_map_shape() {
        let frame = FisheyeFrame::new(gradient());
        let map = ProjectionMap::from_parts(2, 1, vec![3.0, -5.0], vec![0.0, 0.0]);

        let out = remap(&frame, &map);
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(*out.get_pixel(0, 0), Rgb([180, 0, 200]));
        assert_eq!(*out.get_pixel(1, 0), BORDER);
    }
}
