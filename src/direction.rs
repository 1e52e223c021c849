use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uom::si::{angle::degree, f64::Angle};

use crate::error::Error;

/// One of the five fixed views synthesized from a fisheye frame.
///
/// The cardinal directions are perspective views at a fixed yaw around the
/// fisheye's optical axis. `Below` is the nadir crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
    #[serde(rename = "B")]
    Below,
}

impl Direction {
    /// Every direction in generation order.
    pub const ALL: [Direction; 5] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Below,
    ];

    /// The single letter used in file names.
    pub fn code(&self) -> char {
        match self {
            Direction::North => 'N',
            Direction::East => 'E',
            Direction::South => 'S',
            Direction::West => 'W',
            Direction::Below => 'B',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::East => "East",
            Direction::South => "South",
            Direction::West => "West",
            Direction::Below => "Below",
        }
    }

    /// Returns the `Direction` for a file name letter, ignoring case.
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'N' => Some(Direction::North),
            'E' => Some(Direction::East),
            'S' => Some(Direction::South),
            'W' => Some(Direction::West),
            'B' => Some(Direction::Below),
            _ => None,
        }
    }

    /// Yaw of the virtual camera, or `None` for the nadir view.
    pub fn yaw(&self) -> Option<Angle> {
        let deg = match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
            Direction::Below => return None,
        };

        Some(Angle::new::<degree>(deg))
    }

    /// Position of `self` in [`Direction::ALL`].
    pub(crate) fn index(&self) -> usize {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
            Direction::Below => 4,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = Error;

    /// Accepts either the letter code or the full name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(direction) = Direction::from_code(c) {
                return Ok(direction);
            }
        }

        Direction::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownDirection(s.to_string()))
    }
}
