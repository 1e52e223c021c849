use crate::{
    cache::DEFAULT_JPEG_QUALITY,
    error::{Error, Result},
    views::{ViewConfig, ViewSetGenerator},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIG_ENV: &str = "VIBECAST_CONFIG";
pub const DATA_DIR_ENV: &str = "VIBECAST_DATA_DIR";
pub const UPLOADS_DIR_ENV: &str = "VIBECAST_UPLOADS_DIR";
pub const UNWARPED_DIR_ENV: &str = "VIBECAST_UNWARPED_DIR";

const DEFAULT_DATA_DIR: &str = "./data";
const UPLOADS_SUBDIR: &str = "ftp_uploads";
const UNWARPED_SUBDIR: &str = "unwarped";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    uploads_dir: Option<PathBuf>,
    unwarped_dir: Option<PathBuf>,
    jpeg_quality: Option<u8>,
    map_cache_capacity: Option<usize>,
    views: Option<ViewConfig>,
}

/// Effective settings for the unwarping pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub data_dir: PathBuf,

    /// Root of the raw `{YYYY}/{MM}/{DD}/` upload tree.
    pub uploads_dir: PathBuf,

    /// Root of the rectified view cache.
    pub unwarped_dir: PathBuf,
    pub jpeg_quality: u8,
    pub map_cache_capacity: usize,
    pub views: ViewConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Config {
    /// Load `path`, or the file named by `VIBECAST_CONFIG`, then apply the
    /// environment overrides.
    ///
    /// With neither set the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env_var(CONFIG_ENV).map(PathBuf::from));

        let file = match path {
            Some(path) => read_config_file(&path)?,
            None => ConfigFile::default(),
        };

        let mut config = Self::from_file(file);
        config.apply_env(env_var);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|err| Error::Config(format!("invalid config: {err}")))?;
        let config = Self::from_file(file);
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Self {
        let data_dir = file
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let uploads_dir = file
            .uploads_dir
            .unwrap_or_else(|| data_dir.join(UPLOADS_SUBDIR));
        let unwarped_dir = file
            .unwarped_dir
            .unwrap_or_else(|| data_dir.join(UNWARPED_SUBDIR));

        Self {
            data_dir,
            uploads_dir,
            unwarped_dir,
            jpeg_quality: file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            map_cache_capacity: file
                .map_cache_capacity
                .unwrap_or(ViewSetGenerator::DEFAULT_MAP_CACHE_CAPACITY),
            views: file.views.unwrap_or_default(),
        }
    }

    /// Overrides from `lookup`. A new data dir moves the upload and cache
    /// dirs along with it unless those are overridden too.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
            self.uploads_dir = self.data_dir.join(UPLOADS_SUBDIR);
            self.unwarped_dir = self.data_dir.join(UNWARPED_SUBDIR);
        }
        if let Some(dir) = lookup(UPLOADS_DIR_ENV) {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(UNWARPED_DIR_ENV) {
            self.unwarped_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }

        self.views.validate()
    }

    /// Generator configured with these view settings.
    pub fn generator(&self) -> Result<ViewSetGenerator> {
        ViewSetGenerator::with_map_cache(self.views, self.map_cache_capacity)
    }

    /// Render back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| Error::Config(format!("cannot serialize config: {err}")))
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let contents = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    toml::from_str(&contents)
        .map_err(|err| Error::Config(format!("invalid config {}: {err}", path.display())))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
