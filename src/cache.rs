//! Date partitioned on-disk cache of rectified views.
//!
//! Views live at `{root}/{YYYY}/{MM}/{DD}/{timestamp}_{code}.jpg`. A
//! timestamp is either complete (all five files present) or regenerated as a
//! whole.

use crate::{
    capture::{CaptureTimestamp, parse_capture_path},
    direction::Direction,
    error::{Error, Result},
    frame::{FisheyeFrame, encode_jpeg},
    views::ViewSetGenerator,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Location of every view of one capture, keyed by direction.
pub type ViewPaths = BTreeMap<Direction, PathBuf>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Unwarped {
    pub timestamp: String,
    pub paths: ViewPaths,

    /// `false` when every view was already cached.
    pub generated: bool,
}

impl Unwarped {
    /// Paths relative to `base`, for handing to clients that share `base`.
    pub fn relative_to(&self, base: &Path) -> ViewPaths {
        self.paths
            .iter()
            .map(|(direction, path)| {
                let rel = path.strip_prefix(base).unwrap_or(path);
                (*direction, rel.to_path_buf())
            })
            .collect()
    }
}

/// Writes rectified views once and serves them on later requests.
///
/// The cache does not record the [`ViewConfig`](crate::views::ViewConfig)
/// that produced a file. Views generated under a previous configuration keep
/// being served until they are deleted.
pub struct UnwarpCache {
    root: PathBuf,
    generator: ViewSetGenerator,
    jpeg_quality: u8,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UnwarpCache {
    pub fn new(root: impl Into<PathBuf>, generator: ViewSetGenerator) -> Self {
        Self {
            root: root.into(),
            generator,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generator(&self) -> &ViewSetGenerator {
        &self.generator
    }

    /// Canonical path of one view.
    pub fn path_for(&self, timestamp: &CaptureTimestamp, direction: Direction) -> PathBuf {
        self.root
            .join(timestamp.date_dir())
            .join(format!("{}_{}.jpg", timestamp, direction.code()))
    }

    pub fn paths_for(&self, timestamp: &CaptureTimestamp) -> ViewPaths {
        Direction::ALL
            .into_iter()
            .map(|direction| (direction, self.path_for(timestamp, direction)))
            .collect()
    }

    /// Returns the paths if all five views exist.
    pub fn lookup(&self, timestamp: &CaptureTimestamp) -> Option<ViewPaths> {
        let paths = self.paths_for(timestamp);
        paths.values().all(|path| path.is_file()).then_some(paths)
    }

    /// Make sure all five views of `timestamp` exist on disk.
    ///
    /// `load` is only called when at least one view is missing, in which case
    /// the whole set is regenerated and overwritten. Concurrent calls for the
    /// same timestamp generate once.
    pub fn ensure<F>(&self, timestamp: &CaptureTimestamp, load: F) -> Result<Unwarped>
    where
        F: FnOnce() -> Result<FisheyeFrame>,
    {
        if let Some(paths) = self.lookup(timestamp) {
            debug!("cache hit for {timestamp}");
            return Ok(self.unwarped(timestamp, paths, false));
        }

        let key_lock = self.key_lock(timestamp);
        let result = {
            let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);
            match self.lookup(timestamp) {
                Some(paths) => {
                    debug!("{timestamp} was generated by a concurrent request");
                    Ok(self.unwarped(timestamp, paths, false))
                }
                None => self.generate(timestamp, load),
            }
        };
        self.release_key(timestamp, key_lock);

        result
    }

    /// [`UnwarpCache::ensure`] for a raw frame on disk, named after its
    /// capture time.
    pub fn ensure_source(&self, source: &Path) -> Result<Unwarped> {
        let timestamp = parse_capture_path(source)?;
        self.ensure(&timestamp, || FisheyeFrame::open(source))
    }

    /// Ensure every source independently. One failure never aborts the rest.
    pub fn ensure_many<P>(&self, sources: &[P]) -> Vec<(PathBuf, Result<Unwarped>)>
    where
        P: AsRef<Path> + Sync,
    {
        sources
            .par_iter()
            .map(|source| {
                let source = source.as_ref();
                let result = self.ensure_source(source);
                if let Err(err) = &result {
                    warn!("skipping {}: {err}", source.display());
                }
                (source.to_path_buf(), result)
            })
            .collect()
    }

    fn generate<F>(&self, timestamp: &CaptureTimestamp, load: F) -> Result<Unwarped>
    where
        F: FnOnce() -> Result<FisheyeFrame>,
    {
        let views = {
            let frame = load()?;
            self.generator.generate(&frame)?
        };

        // Encode everything before touching the cache so a failure leaves no
        // partial set behind.
        let encoded: Vec<(Direction, Vec<u8>)> = views
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(direction, view)| {
                encode_jpeg(view, self.jpeg_quality)
                    .map(|bytes| (direction, bytes))
                    .map_err(|source| Error::Encode { direction, source })
            })
            .collect::<Result<_>>()?;

        let dir = self.root.join(timestamp.date_dir());
        fs::create_dir_all(&dir).map_err(|err| Error::io(&dir, err))?;

        let paths = self.paths_for(timestamp);
        for (direction, bytes) in encoded {
            write_atomic(&paths[&direction], &bytes)?;
        }

        info!("wrote 5 views for {timestamp} to {}", dir.display());
        Ok(self.unwarped(timestamp, paths, true))
    }

    fn unwarped(
        &self,
        timestamp: &CaptureTimestamp,
        paths: ViewPaths,
        generated: bool,
    ) -> Unwarped {
        Unwarped {
            timestamp: timestamp.to_string(),
            paths,
            generated,
        }
    }

    fn key_lock(&self, timestamp: &CaptureTimestamp) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(timestamp.to_string()).or_default())
    }

    fn release_key(&self, timestamp: &CaptureTimestamp, key_lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours means nobody else is waiting.
        if Arc::strong_count(&key_lock) <= 2 {
            in_flight.remove(timestamp.as_str());
        }
    }
}

/// Write `bytes` next to `path` and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("jpg.tmp");
    fs::write(&tmp, bytes).map_err(|err| Error::io(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| Error::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::ViewConfig;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_cache(root: &Path) -> UnwarpCache {
        let config = ViewConfig {
            output_size: (32, 24),
            ..ViewConfig::default()
        };
        UnwarpCache::new(root, ViewSetGenerator::new(config).unwrap())
    }

    fn gray_frame() -> FisheyeFrame {
        FisheyeFrame::new(RgbImage::from_pixel(80, 60, Rgb([128, 128, 128])))
    }

    fn timestamp() -> CaptureTimestamp {
        CaptureTimestamp::parse("20260126233811").unwrap()
    }

    #[test]
    fn path_layout() {
        let cache = small_cache(Path::new("unwarped"));
        let path = cache.path_for(&timestamp(), Direction::North);
        insta::assert_snapshot!(
            path.display().to_string(),
            @"unwarped/2026/01/26/20260126233811_N.jpg"
        );
    }

    #[test]
    fn second_call_is_a_hit() {
        let root = tempfile::tempdir().unwrap();
        let cache = small_cache(root.path());
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(gray_frame())
        };

        let first = cache.ensure(&timestamp(), load).unwrap();
        let second = cache.ensure(&timestamp(), load).unwrap();

        assert!(first.generated);
        assert!(!second.generated);
        assert_eq!(first.paths, second.paths);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_view_regenerates_all() {
        let root = tempfile::tempdir().unwrap();
        let cache = small_cache(root.path());
        let ts = timestamp();
        cache.ensure(&ts, || Ok(gray_frame())).unwrap();

        fs::remove_file(cache.path_for(&ts, Direction::West)).unwrap();
        let stale = cache.path_for(&ts, Direction::North);
        fs::write(&stale, b"stale").unwrap();

        let again = cache.ensure(&ts, || Ok(gray_frame())).unwrap();
        assert!(again.generated);
        assert!(cache.lookup(&ts).is_some());
        assert_ne!(fs::read(&stale).unwrap(), b"stale");
    }

    #[test]
    fn load_failure_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let cache = small_cache(root.path());
        let err = cache
            .ensure(&timestamp(), || {
                Err(Error::InvalidGeometry("no frame".into()))
            })
            .unwrap_err();

        assert!(matches!(err, Error::InvalidGeometry(_)));
        assert!(!root.path().join("2026").exists());
    }

    #[test]
    fn generation_failure_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let cache = small_cache(root.path());
        let err = cache
            .ensure(&timestamp(), || Ok(FisheyeFrame::new(RgbImage::new(0, 0))))
            .unwrap_err();

        assert!(matches!(err, Error::PartialGeneration { .. }));
        assert!(cache.lookup(&timestamp()).is_none());
        assert!(!root.path().join("2026").exists());
    }

    #[test]
    fn concurrent_requests_generate_once() {
        let root = tempfile::tempdir().unwrap();
        let cache = small_cache(root.path());
        let loads = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    cache
                        .ensure(&timestamp(), || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            Ok(gray_frame())
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[test]
    fn relative_paths() {
        let cache = small_cache(Path::new("/data/unwarped"));
        let ts = timestamp();
        let unwarped = cache.unwarped(&ts, cache.paths_for(&ts), false);
        let rel = unwarped.relative_to(Path::new("/data"));
        assert_eq!(
            rel[&Direction::Below],
            PathBuf::from("unwarped/2026/01/26/20260126233811_B.jpg")
        );
    }
}
