//! Straight-down view cut from the center of the fisheye image circle.
//!
//! Unlike the cardinal views this does not model a pinhole camera. The output
//! disk is a polar rescale of the inner `radius_fraction` of the image circle
//! and everything outside the unit disk is masked to black.

use crate::{
    error::{Error, Result},
    frame::FisheyeFrame,
    projection::ProjectionMap,
    remap::{BORDER, remap},
};
use image::RgbImage;
use rayon::prelude::*;

/// Extract the nadir view of `frame` at `output_size` (`(width, height)`).
///
/// Callers normally pass a square size so the unit disk is a circle.
pub fn extract_nadir(
    frame: &FisheyeFrame,
    radius_fraction: f64,
    output_size: (u32, u32),
) -> Result<RgbImage> {
    let (map, outside) = nadir_map(frame.dimensions(), radius_fraction, output_size)?;
    let mut view = remap(frame, &map);

    view.par_chunks_mut(3)
        .zip(outside.par_iter())
        .filter(|(_, outside)| **outside)
        .for_each(|(px, _)| px.copy_from_slice(&BORDER.0));

    Ok(view)
}

/// Build the sampling map and the mask of pixels outside the unit disk.
pub fn nadir_map(
    frame_shape: (u32, u32),
    radius_fraction: f64,
    output_size: (u32, u32),
) -> Result<(ProjectionMap, Vec<bool>)> {
    validate(frame_shape, radius_fraction, output_size)?;

    let (w, h) = frame_shape;
    let (cx, cy) = (w as f64 / 2., h as f64 / 2.);
    let radius = cx.min(cy);

    let (out_w, out_h) = output_size;
    let xs = linspace(out_w);
    let ys = linspace(out_h);

    let samples: Vec<(f32, f32, bool)> = (0..out_w as usize * out_h as usize)
        .into_par_iter()
        .map(|i| {
            let x = xs[i % out_w as usize];
            let y = ys[i / out_w as usize];

            let r_out = x.hypot(y);
            let theta_out = y.atan2(x);
            let r_fish = r_out * radius * radius_fraction;

            (
                (cx + r_fish * theta_out.cos()) as f32,
                (cy + r_fish * theta_out.sin()) as f32,
                r_out > 1.,
            )
        })
        .collect();

    let mut map_x = Vec::with_capacity(samples.len());
    let mut map_y = Vec::with_capacity(samples.len());
    let mut outside = Vec::with_capacity(samples.len());
    for (x, y, o) in samples {
        map_x.push(x);
        map_y.push(y);
        outside.push(o);
    }

    Ok((
        ProjectionMap::from_parts(out_w, out_h, map_x, map_y),
        outside,
    ))
}

/// `n` evenly spaced values from -1 to 1 inclusive. A single sample is -1.
fn linspace(n: u32) -> Vec<f64> {
    let step = match n {
        0 | 1 => 0.,
        _ => 2. / (n - 1) as f64,
    };
    (0..n).map(|i| -1. + i as f64 * step).collect()
}

fn validate(frame_shape: (u32, u32), radius_fraction: f64, output_size: (u32, u32)) -> Result<()> {
    if frame_shape.0 == 0 || frame_shape.1 == 0 {
        return Err(Error::InvalidGeometry(format!(
            "frame is empty ({}x{})",
            frame_shape.0, frame_shape.1
        )));
    }

    if output_size.0 == 0 || output_size.1 == 0 {
        return Err(Error::InvalidGeometry(format!(
            "output size must be positive, got {}x{}",
            output_size.0, output_size.1
        )));
    }

    if !(radius_fraction > 0. && radius_fraction <= 1.) {
        return Err(Error::InvalidGeometry(format!(
            "radius fraction must be in (0, 1], got {radius_fraction}"
        )));
    }

    Ok(())
}
