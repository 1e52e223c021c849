// #![warn(missing_docs)]

//! Fisheye Dewarping Utilities
//!
//! Turns one frame from a downward facing fisheye camera into five rectified
//! views (north, east, south, west and straight down) and keeps them in a
//! date partitioned cache on disk.
//!
//! ```no_run
//! use vibecast::prelude::*;
//!
//! # fn main() -> vibecast::error::Result<()> {
//! let generator = ViewSetGenerator::new(ViewConfig::default())?;
//! let cache = UnwarpCache::new("data/unwarped", generator);
//! let unwarped = cache.ensure_source("Reolink_00_20260126233811.jpg".as_ref())?;
//! println!("{:?}", unwarped.paths[&Direction::North]);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod capture;
pub mod config;
pub mod direction;

#[allow(missing_docs)]
pub mod error;

pub mod frame;
pub mod nadir;
pub mod projection;
pub mod remap;
pub mod views;

pub mod prelude {
    pub use crate::{
        cache::{UnwarpCache, Unwarped, ViewPaths},
        capture::{
            CaptureStats, CaptureTimestamp, TimeRange, capture_stats, list_captures,
            parse_capture_filename,
        },
        config::Config,
        direction::Direction,
        error::{Error, Result},
        frame::{FisheyeFrame, encode_jpeg},
        nadir::extract_nadir,
        projection::{ProjectionMap, ProjectionMapCache},
        remap::remap,
        views::{ViewConfig, ViewSet, ViewSetGenerator, generate_view_set},
    };
}
