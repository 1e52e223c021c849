use crate::direction::Direction;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode frame {origin}: {source}")]
    FrameDecode {
        origin: String,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid capture filename: {0}")]
    InvalidFilename(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("failed to generate {direction} view: {source}")]
    PartialGeneration {
        direction: Direction,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to encode {direction} view: {source}")]
    Encode {
        direction: Direction,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown direction '{0}'")]
    UnknownDirection(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
