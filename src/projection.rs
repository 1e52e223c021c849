//! Inverse mapping from a virtual pinhole camera onto an equidistant fisheye.
//!
//! The fisheye's optical axis points straight down. A ray at angle `a` from
//! the nadir lands at `a / 90° * radius` pixels from the image center, so the
//! horizon lies on the rim of the image circle.

use crate::error::{Error, Result};
use log::debug;
use lru::LruCache;
use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;
use std::{
    f64::consts::FRAC_PI_2,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
};
use uom::si::{angle::radian, f64::Angle};

/// Per output pixel source coordinates, stored row major.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl ProjectionMap {
    pub(crate) fn from_parts(width: u32, height: u32, map_x: Vec<f32>, map_y: Vec<f32>) -> Self {
        debug_assert_eq!(map_x.len(), width as usize * height as usize);
        debug_assert_eq!(map_y.len(), map_x.len());
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    /// Build the map for a virtual camera looking along `yaw` and `pitch`.
    ///
    /// `frame_shape` and `output_size` are `(width, height)`. The virtual
    /// camera's horizontal field of view is `fov`. The camera is rotated by
    /// `Ry(yaw) * Rx(pitch)`, so at a pitch of 90 degrees it looks along the
    /// fisheye's optical axis.
    pub fn build(
        frame_shape: (u32, u32),
        output_size: (u32, u32),
        fov: Angle,
        yaw: Angle,
        pitch: Angle,
    ) -> Result<Self> {
        validate(frame_shape, output_size, fov, yaw, pitch)?;

        let (w, h) = frame_shape;
        let (cx, cy) = (w as f64 / 2., h as f64 / 2.);
        let radius = cx.min(cy);

        let (out_w, out_h) = output_size;
        let focal = out_w as f64 / (2. * (fov.get::<radian>() / 2.).tan());
        let half = (out_w as f64 / 2., out_h as f64 / 2.);

        // Yaw is applied to the pitched ray, keeping pitch relative to the
        // horizon for every yaw.
        let rot = Rotation3::from_axis_angle(&Vector3::y_axis(), yaw.get::<radian>())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), pitch.get::<radian>());

        let (map_x, map_y): (Vec<f32>, Vec<f32>) = (0..out_w as usize * out_h as usize)
            .into_par_iter()
            .map(|i| {
                let x = (i % out_w as usize) as f64 - half.0;
                let y = (i / out_w as usize) as f64 - half.1;

                let ray = rot * Vector3::new(x / focal, -y / focal, 1.).normalize();

                let angle_from_nadir = (-ray.y).clamp(-1., 1.).acos();
                let azimuth = ray.x.atan2(ray.z);
                let r_fish = angle_from_nadir / FRAC_PI_2 * radius;

                (
                    (cx + r_fish * azimuth.sin()) as f32,
                    (cy - r_fish * azimuth.cos()) as f32,
                )
            })
            .unzip();

        Ok(Self::from_parts(out_w, out_h, map_x, map_y))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the source coordinate sampled by output pixel `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let i = (y * self.width + x) as usize;
        Some((self.map_x[i], self.map_y[i]))
    }

    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }
}

fn validate(
    frame_shape: (u32, u32),
    output_size: (u32, u32),
    fov: Angle,
    yaw: Angle,
    pitch: Angle,
) -> Result<()> {
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

    let fov = fov.get::<radian>();
    if !(fov > 0. && fov < std::f64::consts::PI) {
        return Err(Error::InvalidGeometry(format!(
            "field of view must be between 0 and 180 degrees, got {}",
            fov.to_degrees()
        )));
    }

    if !yaw.get::<radian>().is_finite() || !pitch.get::<radian>().is_finite() {
        return Err(Error::InvalidGeometry("yaw and pitch must be finite".into()));
    }

    Ok(())
}

/// Identifies a projection map by everything it is computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MapKey {
    frame_shape: (u32, u32),
    output_size: (u32, u32),
    fov: u64,
    yaw: u64,
    pitch: u64,
}

impl MapKey {
    fn new(
        frame_shape: (u32, u32),
        output_size: (u32, u32),
        fov: Angle,
        yaw: Angle,
        pitch: Angle,
    ) -> Self {
        Self {
            frame_shape,
            output_size,
            fov: fov.get::<radian>().to_bits(),
            yaw: yaw.get::<radian>().to_bits(),
            pitch: pitch.get::<radian>().to_bits(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapCacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct MapCacheState {
    entries: Option<LruCache<MapKey, Arc<ProjectionMap>>>,
    stats: MapCacheStats,
}

/// Bounded memo table of projection maps.
///
/// Frames from one camera share a shape, so the four cardinal maps repeat
/// for every frame. A capacity of zero disables memoization.
#[derive(Debug)]
pub struct ProjectionMapCache {
    state: Mutex<MapCacheState>,
}

impl ProjectionMapCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MapCacheState {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                stats: MapCacheStats::default(),
            }),
        }
    }

    /// Returns the memoized map or builds and stores it.
    ///
    /// The lock is released while building so other directions can proceed.
    pub fn get_or_build(
        &self,
        frame_shape: (u32, u32),
        output_size: (u32, u32),
        fov: Angle,
        yaw: Angle,
        pitch: Angle,
    ) -> Result<Arc<ProjectionMap>> {
        let key = MapKey::new(frame_shape, output_size, fov, yaw, pitch);

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let hit = state
                .entries
                .as_mut()
                .and_then(|entries| entries.get(&key).cloned());
            match hit {
                Some(map) => {
                    state.stats.hits += 1;
                    return Ok(map);
                }
                None => state.stats.misses += 1,
            }
        }

        debug!(
            "building projection map frame={:?} output={:?} yaw={:.1} pitch={:.1}",
            frame_shape,
            output_size,
            yaw.get::<radian>().to_degrees(),
            pitch.get::<radian>().to_degrees(),
        );
        let map = Arc::new(ProjectionMap::build(
            frame_shape,
            output_size,
            fov,
            yaw,
            pitch,
        )?);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = state.entries.as_mut() {
            entries.put(key, Arc::clone(&map));
        }

        Ok(map)
    }

    pub fn stats(&self) -> MapCacheStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .as_ref()
            .map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
