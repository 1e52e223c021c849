//! Capture timestamps and the raw upload tree.
//!
//! The camera uploads frames as `Reolink_00_YYYYMMDDHHMMSS.jpg` below a
//! `{YYYY}/{MM}/{DD}/` directory tree.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static CAPTURE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:reolink)_00_(\d{14})\.(?i:jpg)$").expect("capture filename regex is valid")
});

/// A 14 digit `YYYYMMDDHHMMSS` capture time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTimestamp {
    raw: String,
    datetime: NaiveDateTime,
}

impl CaptureTimestamp {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidFilename(format!(
                "timestamp must be 14 digits, got '{raw}'"
            )));
        }

        let datetime = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .map_err(|err| Error::InvalidFilename(format!("invalid timestamp '{raw}': {err}")))?;

        Ok(Self {
            raw: raw.to_string(),
            datetime,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.datetime
    }

    pub fn year(&self) -> &str {
        &self.raw[0..4]
    }

    pub fn month(&self) -> &str {
        &self.raw[4..6]
    }

    pub fn day(&self) -> &str {
        &self.raw[6..8]
    }

    /// `YYYY/MM/DD` partition holding this capture.
    pub fn date_dir(&self) -> PathBuf {
        [self.year(), self.month(), self.day()].iter().collect()
    }

    /// `YYYY-MM-DD`
    pub fn date(&self) -> String {
        self.datetime.format("%Y-%m-%d").to_string()
    }

    /// `HH:MM:SS`
    pub fn time(&self) -> String {
        self.datetime.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Extract the capture timestamp from a raw upload file name.
pub fn parse_capture_filename(name: &str) -> Result<CaptureTimestamp> {
    let captures = CAPTURE_FILENAME
        .captures(name)
        .ok_or_else(|| Error::InvalidFilename(format!("unrecognised capture name '{name}'")))?;

    CaptureTimestamp::parse(&captures[1])
}

/// Extract the capture timestamp from the file name component of `path`.
pub fn parse_capture_path(path: &Path) -> Result<CaptureTimestamp> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidFilename(format!("no file name in {}", path.display())))?;

    parse_capture_filename(name)
}

/// Inclusive range of capture times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidTimeRange(format!("{end} is before {start}")));
        }

        Ok(Self { start, end })
    }

    /// Build a range from `YYYY-MM-DD` dates and `HH:MM` times.
    ///
    /// Both ends sit on the start of their minute, so an end of `23:38`
    /// excludes `23:38:11`.
    pub fn from_strings(
        from_date: &str,
        to_date: &str,
        from_time: &str,
        to_time: &str,
    ) -> Result<Self> {
        let start = parse_date_time(from_date, from_time)?;
        let end = parse_date_time(to_date, to_time)?;
        Self::new(start, end)
    }

    pub fn contains(&self, datetime: NaiveDateTime) -> bool {
        self.start <= datetime && datetime <= self.end
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end.date();
        self.start
            .date()
            .iter_days()
            .take_while(move |day| *day <= end)
    }
}

fn parse_date_time(date: &str, time: &str) -> Result<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|err| Error::InvalidTimeRange(format!("invalid date '{date}': {err}")))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|err| Error::InvalidTimeRange(format!("invalid time '{time}': {err}")))?;

    Ok(date.and_time(time))
}

/// A raw fisheye frame found in the upload tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureFile {
    /// Path relative to the upload root.
    pub path: PathBuf,
    pub filename: String,
    pub timestamp: String,
    pub date: String,
    pub time: String,
    pub size: u64,
}

/// List the captures below `root` whose timestamps fall inside `range`.
///
/// Only the day partitions covered by `range` are visited. Files with
/// unrecognised names are skipped. Results are sorted by timestamp.
pub fn list_captures(root: &Path, range: &TimeRange) -> Result<Vec<CaptureFile>> {
    let mut captures = Vec::new();

    for day in range.days() {
        let rel_dir: PathBuf = [
            day.format("%Y").to_string(),
            day.format("%m").to_string(),
            day.format("%d").to_string(),
        ]
        .iter()
        .collect();
        let dir = root.join(&rel_dir);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(Error::io(dir, err)),
        };

        for entry in entries {
            let entry = entry.map_err(|err| Error::io(&dir, err))?;
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(timestamp) = parse_capture_filename(&filename) else {
                continue;
            };
            if !range.contains(timestamp.datetime()) {
                continue;
            }

            let metadata = entry.metadata().map_err(|err| Error::io(entry.path(), err))?;
            if !metadata.is_file() {
                continue;
            }

            captures.push(CaptureFile {
                path: rel_dir.join(&filename),
                filename,
                date: timestamp.date(),
                time: timestamp.time(),
                timestamp: timestamp.as_str().to_string(),
                size: metadata.len(),
            });
        }
    }

    captures.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(captures)
}

/// Per day capture counts over the whole upload tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CaptureStats {
    /// `YYYY-MM-DD`, ascending.
    pub dates: Vec<String>,
    /// Number of captures on the matching entry of `dates`.
    pub counts: Vec<usize>,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub total_images: usize,
    pub total_days: usize,
}

/// Count the captures below `root`, grouped by capture date.
///
/// Files with unrecognised names are ignored and a missing root yields empty
/// stats.
pub fn capture_stats(root: &Path) -> Result<CaptureStats> {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

    for year in subdirs(root)? {
        for month in subdirs(&year)? {
            for day in subdirs(&month)? {
                for entry in fs::read_dir(&day).map_err(|err| Error::io(&day, err))? {
                    let entry = entry.map_err(|err| Error::io(&day, err))?;
                    let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                        continue;
                    };
                    if let Ok(timestamp) = parse_capture_filename(&filename) {
                        *per_day.entry(timestamp.datetime().date()).or_default() += 1;
                    }
                }
            }
        }
    }

    let fmt_day = |day: &NaiveDate| day.format("%Y-%m-%d").to_string();
    Ok(CaptureStats {
        first_date: per_day.keys().next().map(fmt_day),
        last_date: per_day.keys().next_back().map(fmt_day),
        dates: per_day.keys().map(fmt_day).collect(),
        counts: per_day.values().copied().collect(),
        total_images: per_day.values().sum(),
        total_days: per_day.len(),
    })
}

/// Sorted child directories of `dir`, or none if `dir` does not exist.
fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io(dir, err)),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| Error::io(dir, err))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Reolink_00_20260126233811.jpg", "20260126233811")]
    #[case("reolink_00_20260126233811.jpg", "20260126233811")]
    #[case("REOLINK_00_20251231000000.JPG", "20251231000000")]
    fn parses_capture_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(parse_capture_filename(name).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("Reolink_00_2026012623381.jpg")]
    #[case("Reolink_00_202601262338111.jpg")]
    #[case("Reolink_00_20261326233811.jpg")]
    #[case("Reolink_00_20260126253811.jpg")]
    #[case("Reolink_00_20260126233811.mp4")]
    #[case("Camera_00_20260126233811.jpg")]
    #[case("20260126233811_N.jpg")]
    #[case("Reolink_01_20260126233811.jpg")]
    #[case("Reolink_0_20260126233811.jpg")]
    fn rejects_other_names(#[case] name: &str) {
        assert!(matches!(
            parse_capture_filename(name),
            Err(Error::InvalidFilename(_))
        ));
    }

    #[test]
    fn timestamp_components() {
        let ts = CaptureTimestamp::parse("20260126233811").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), ("2026", "01", "26"));
        assert_eq!(ts.date(), "2026-01-26");
        assert_eq!(ts.time(), "23:38:11");
        assert_eq!(ts.date_dir(), PathBuf::from("2026/01/26"));
    }

    #[rstest]
    #[case("2026012623381a")]
    #[case("")]
    #[case("２０２６0126233811")]
    fn rejects_non_digit_timestamps(#[case] raw: &str) {
        assert!(CaptureTimestamp::parse(raw).is_err());
    }

    #[test]
    fn parses_from_path() {
        let ts = parse_capture_path(Path::new("2026/01/26/Reolink_00_20260126233811.jpg")).unwrap();
        assert_eq!(ts.to_string(), "20260126233811");
    }

    #[rstest]
    #[case("20260126230000", true)]
    #[case("20260126233800", true)]
    #[case("20260126233811", false)]
    #[case("20260126225959", false)]
    fn range_ends_on_the_minute(#[case] raw: &str, #[case] inside: bool) {
        let range = TimeRange::from_strings("2026-01-26", "2026-01-26", "23:00", "23:38").unwrap();
        let ts = CaptureTimestamp::parse(raw).unwrap();
        assert_eq!(range.contains(ts.datetime()), inside);
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            TimeRange::from_strings("2026-01-27", "2026-01-26", "00:00", "23:59"),
            Err(Error::InvalidTimeRange(_))
        ));
    }

    #[test]
    fn lists_captures_in_range() {
        let root = tempfile::tempdir().unwrap();
        let files = [
            "2026/01/25/Reolink_00_20260125235959.jpg",
            "2026/01/26/Reolink_00_20260126080000.jpg",
            "2026/01/26/Reolink_00_20260126070000.jpg",
            "2026/01/26/notes.txt",
            "2026/01/26/Reolink_00_20260126235900.jpg",
            "2026/01/27/Reolink_00_20260127000000.jpg",
        ];
        for file in files {
            let path = root.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"jpeg").unwrap();
        }

        let range = TimeRange::from_strings("2026-01-26", "2026-01-26", "00:00", "23:00").unwrap();
        let captures = list_captures(root.path(), &range).unwrap();

        let timestamps: Vec<_> = captures.iter().map(|c| c.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["20260126070000", "20260126080000"]);
        assert_eq!(
            captures[0].path,
            PathBuf::from("2026/01/26/Reolink_00_20260126070000.jpg")
        );
        assert_eq!(captures[0].time, "07:00:00");
        assert_eq!(captures[0].size, 4);
    }

    #[test]
    fn stats_count_captures_per_day() {
        let root = tempfile::tempdir().unwrap();
        let files = [
            "2026/01/27/Reolink_00_20260127000000.jpg",
            "2026/01/25/Reolink_00_20260125235959.jpg",
            "2026/01/25/Reolink_00_20260125120000.jpg",
            "2026/01/25/Reolink_01_20260125130000.jpg",
            "2026/01/27/Reolink_00_20260127101500.jpg",
            "2026/01/27/Reolink_00_20260127120000.jpg",
            "2026/01/27/notes.txt",
        ];
        for file in files {
            let path = root.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"jpeg").unwrap();
        }
        fs::create_dir_all(root.path().join("2026/01/26")).unwrap();

        let stats = capture_stats(root.path()).unwrap();
        assert_eq!(stats.dates, vec!["2026-01-25", "2026-01-27"]);
        assert_eq!(stats.counts, vec![2, 3]);
        assert_eq!(stats.first_date.as_deref(), Some("2026-01-25"));
        assert_eq!(stats.last_date.as_deref(), Some("2026-01-27"));
        assert_eq!(stats.total_images, 5);
        assert_eq!(stats.total_days, 2);
    }

    #[test]
    fn stats_of_missing_root_are_empty() {
        let stats = capture_stats(Path::new("/nonexistent/uploads")).unwrap();
        assert_eq!(stats, CaptureStats::default());
    }

    #[test]
    fn missing_root_lists_nothing() {
        let range = TimeRange::from_strings("2026-01-26", "2026-01-27", "00:00", "23:59").unwrap();
        let captures = list_captures(Path::new("/nonexistent/uploads"), &range).unwrap();
        assert!(captures.is_empty());
    }
}
