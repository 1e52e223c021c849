//! The fixed five-view scheme synthesized from one fisheye frame.

use crate::{
    direction::Direction,
    error::{Error, Result},
    frame::FisheyeFrame,
    nadir::extract_nadir,
    projection::{MapCacheStats, ProjectionMapCache},
    remap::remap,
};
use image::RgbImage;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uom::si::{angle::degree, f64::Angle};

pub const DEFAULT_FOV_DEG: f64 = 90.0;
pub const DEFAULT_VIEW_ANGLE_DEG: f64 = 45.0;
pub const DEFAULT_OUTPUT_SIZE: (u32, u32) = (1080, 810);
pub const DEFAULT_RADIUS_FRACTION: f64 = 0.6;

/// Tunable parameters of the view set.
///
/// The direction to yaw table is fixed, everything else can be overridden.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    /// Horizontal field of view of the cardinal views, in degrees.
    pub fov: f64,

    /// Pitch of the cardinal views, in degrees. 0 looks at the horizon and 90
    /// straight down.
    #[serde(alias = "pitch")]
    pub view_angle: f64,

    /// `(width, height)` of the cardinal views. The nadir view is a square
    /// with the same width.
    pub output_size: (u32, u32),

    /// Portion of the image circle radius unwarped into the nadir view.
    pub radius_fraction: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fov: DEFAULT_FOV_DEG,
            view_angle: DEFAULT_VIEW_ANGLE_DEG,
            output_size: DEFAULT_OUTPUT_SIZE,
            radius_fraction: DEFAULT_RADIUS_FRACTION,
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fov > 0. && self.fov < 180.) {
            return Err(Error::InvalidGeometry(format!(
                "fov must be between 0 and 180 degrees, got {}",
                self.fov
            )));
        }

        if !(-90.0..=90.0).contains(&self.view_angle) {
            return Err(Error::InvalidGeometry(format!(
                "view_angle must be between -90 and 90 degrees, got {}",
                self.view_angle
            )));
        }

        if self.output_size.0 == 0 || self.output_size.1 == 0 {
            return Err(Error::InvalidGeometry(format!(
                "output_size must be positive, got {}x{}",
                self.output_size.0, self.output_size.1
            )));
        }

        if !(self.radius_fraction > 0. && self.radius_fraction <= 1.) {
            return Err(Error::InvalidGeometry(format!(
                "radius_fraction must be in (0, 1], got {}",
                self.radius_fraction
            )));
        }

        Ok(())
    }

    /// The parameters used to synthesize `direction`.
    pub fn spec(&self, direction: Direction) -> ViewSpec {
        let projection = match direction.yaw() {
            Some(yaw) => Projection::Perspective {
                yaw,
                pitch: Angle::new::<degree>(self.view_angle),
                fov: Angle::new::<degree>(self.fov),
            },
            None => Projection::Nadir {
                radius_fraction: self.radius_fraction,
            },
        };

        let output_size = match projection {
            Projection::Perspective { .. } => self.output_size,
            Projection::Nadir { .. } => (self.output_size.0, self.output_size.0),
        };

        ViewSpec {
            direction,
            projection,
            output_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Virtual pinhole camera rotated by `Ry(yaw) * Rx(pitch)`.
    Perspective { yaw: Angle, pitch: Angle, fov: Angle },

    /// Polar crop of the image circle center.
    Nadir { radius_fraction: f64 },
}

/// Everything needed to synthesize one view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewSpec {
    pub direction: Direction,
    pub projection: Projection,
    pub output_size: (u32, u32),
}

/// Exactly one rectified view per [`Direction`].
#[derive(Clone, Debug)]
pub struct ViewSet {
    views: [RgbImage; 5],
}

impl ViewSet {
    pub fn get(&self, direction: Direction) -> &RgbImage {
        &self.views[direction.index()]
    }

    /// Iterate views in [`Direction::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &RgbImage)> {
        Direction::ALL.into_iter().zip(self.views.iter())
    }

    pub fn into_views(self) -> [(Direction, RgbImage); 5] {
        let [north, east, south, west, below] = self.views;
        [
            (Direction::North, north),
            (Direction::East, east),
            (Direction::South, south),
            (Direction::West, west),
            (Direction::Below, below),
        ]
    }
}

/// Synthesizes [`ViewSet`]s with a shared projection map memo table.
#[derive(Debug)]
pub struct ViewSetGenerator {
    config: ViewConfig,
    maps: ProjectionMapCache,
}

impl ViewSetGenerator {
    pub const DEFAULT_MAP_CACHE_CAPACITY: usize = 8;

    pub fn new(config: ViewConfig) -> Result<Self> {
        Self::with_map_cache(config, Self::DEFAULT_MAP_CACHE_CAPACITY)
    }

    /// Like [`ViewSetGenerator::new`] but memoizing at most `capacity` maps.
    pub fn with_map_cache(config: ViewConfig, capacity: usize) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            maps: ProjectionMapCache::new(capacity),
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn map_cache_stats(&self) -> MapCacheStats {
        self.maps.stats()
    }

    /// Synthesize all five views of `frame` in parallel.
    ///
    /// Fails as a whole if any single view fails.
    pub fn generate(&self, frame: &FisheyeFrame) -> Result<ViewSet> {
        let start = Instant::now();

        let views: Vec<RgbImage> = Direction::ALL
            .par_iter()
            .map(|&direction| {
                self.render(frame, direction)
                    .map_err(|source| Error::PartialGeneration {
                        direction,
                        source: Box::new(source),
                    })
            })
            .collect::<Result<_>>()?;

        let Ok(views) = <[RgbImage; 5]>::try_from(views) else {
            unreachable!("one view is rendered per direction");
        };

        info!(
            "generated view set from {}x{} frame in {:?}",
            frame.width(),
            frame.height(),
            start.elapsed()
        );

        Ok(ViewSet { views })
    }

    /// Synthesize the single view for `direction`.
    pub fn render(&self, frame: &FisheyeFrame, direction: Direction) -> Result<RgbImage> {
        let spec = self.config.spec(direction);
        match spec.projection {
            Projection::Perspective { yaw, pitch, fov } => {
                let map =
                    self.maps
                        .get_or_build(frame.dimensions(), spec.output_size, fov, yaw, pitch)?;
                Ok(remap(frame, &map))
            }
            Projection::Nadir { radius_fraction } => {
                extract_nadir(frame, radius_fraction, spec.output_size)
            }
        }
    }
}

/// Synthesize the five views of `frame` without memoizing maps.
pub fn generate_view_set(frame: &FisheyeFrame, config: &ViewConfig) -> Result<ViewSet> {
    ViewSetGenerator::with_map_cache(*config, 0)?.generate(frame)
}
