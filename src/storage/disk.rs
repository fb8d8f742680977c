use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Storage, StorageStats, scan, sort_and_truncate};
use crate::domain::{LogEntry, Query, TimeRange};
use crate::error::{Error, Result};

const DEFAULT_CACHE_SIZE: usize = 10_000;
const STATS_SAMPLE_SIZE: usize = 100;
const SOURCES_MAX_FILES: usize = 5;
const ESTIMATED_ENTRY_BYTES: u64 = 500;

const FILE_PREFIX: &str = "logs-";
const FILE_SUFFIX: &str = ".json";
const DAY_FORMAT: &str = "%Y-%m-%d";

struct Inner {
    file: Option<File>,
    current_day: String,
    cache: VecDeque<LogEntry>,
    closed: bool,
}

/// Disk backend partitioned by calendar day.
///
/// Each day's entries live in `logs-YYYY-MM-DD.json` as a JSON array; appends
/// truncate the trailing `\n]` and extend the array in place. A hot cache of
/// the most recently stored entries serves recency queries without touching
/// the files.
pub struct DiskStorage {
    base_path: PathBuf,
    max_cache: usize,
    inner: RwLock<Inner>,
}

impl DiskStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            max_cache: DEFAULT_CACHE_SIZE,
            inner: RwLock::new(Inner {
                file: None,
                current_day: String::new(),
                cache: VecDeque::new(),
                closed: false,
            }),
        })
    }

    pub fn with_max_cache_size(mut self, size: usize) -> Self {
        self.max_cache = size.max(1);
        self
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.closed {
            return Err(Error::Closed);
        }
        Ok(guard)
    }

    fn day_file_path(&self, day: &str) -> PathBuf {
        self.base_path.join(format!("{FILE_PREFIX}{day}{FILE_SUFFIX}"))
    }

    /// Opens (or creates) a day file for appending, repairing a missing
    /// trailing sentinel left by a crash mid-append.
    fn open_day_file(&self, day: &str) -> Result<File> {
        let path = self.day_file_path(day);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len > 0 {
            file.seek(SeekFrom::Start(len - 1))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)?;
            if last[0] != b']' {
                file.seek(SeekFrom::End(0))?;
                file.write_all(b"\n]")?;
            }
        }

        Ok(file)
    }

    /// Day files whose date overlaps the range, with a one-day safety margin
    /// on both sides. Files with unparseable dates are included.
    fn relevant_files(&self, range: &TimeRange) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for dir_entry in fs::read_dir(&self.base_path)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }

            if !range.is_unbounded() {
                let date_str = &name[FILE_PREFIX.len()..name.len() - FILE_SUFFIX.len()];
                if let Ok(file_date) = NaiveDate::parse_from_str(date_str, DAY_FORMAT) {
                    if let Some(from) = range.from {
                        if file_date < from.date_naive() - chrono::Days::new(1) {
                            continue;
                        }
                    }
                    if let Some(to) = range.to {
                        if file_date > to.date_naive() + chrono::Days::new(1) {
                            continue;
                        }
                    }
                }
            }

            files.push(path);
        }

        files.sort();
        Ok(files)
    }

    /// Loads a day file, tolerating a missing trailing sentinel in memory.
    fn load_entries(&self, path: &Path) -> Result<Vec<LogEntry>> {
        let content = fs::read_to_string(path)?;
        let trimmed = content.trim_end();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(trimmed) {
            Ok(entries) => Ok(entries),
            Err(e) if !trimmed.ends_with(']') => {
                let repaired = format!("{trimmed}\n]");
                serde_json::from_str(&repaired).map_err(|_| Error::Serde(e))
            }
            Err(e) => Err(Error::Serde(e)),
        }
    }

    fn cache_answers(&self, cache: &VecDeque<LogEntry>, range: &TimeRange) -> bool {
        let Some(oldest) = cache.iter().map(|e| e.timestamp).min() else {
            return false;
        };
        match range.from {
            None => true,
            Some(from) => from >= oldest,
        }
    }

    fn query_disk(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<LogEntry>> {
        let mut matched = Vec::new();
        for path in self.relevant_files(&query.time_range)? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let entries = self.load_entries(&path)?;
            matched.extend(scan(entries.iter(), query, cancel)?);
        }
        Ok(matched)
    }
}

impl Storage for DiskStorage {
    fn store(&self, entry: LogEntry) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.closed {
            return Err(Error::Closed);
        }

        let day = entry.timestamp.format(DAY_FORMAT).to_string();

        // Day rollover closes the current file.
        if guard.file.is_some() && guard.current_day != day {
            guard.file = None;
        }
        if guard.file.is_none() {
            guard.file = Some(self.open_day_file(&day)?);
            guard.current_day = day;
        }

        let json = serde_json::to_string(&entry)?;
        let file = guard.file.as_mut().ok_or(Error::Closed)?;
        let len = file.metadata()?.len();

        if len > 2 {
            // Drop the trailing "\n]" and extend the array.
            file.set_len(len - 2)?;
            file.seek(SeekFrom::Start(len - 2))?;
            file.write_all(b",\n")?;
        } else {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(b"[\n")?;
        }
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n]")?;
        file.flush()?;

        guard.cache.push_back(entry);
        while guard.cache.len() > self.max_cache {
            guard.cache.pop_front();
        }

        Ok(())
    }

    fn query(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<LogEntry>> {
        let guard = self.read()?;

        let matched = if self.cache_answers(&guard.cache, &query.time_range) {
            scan(guard.cache.iter(), query, cancel)?
        } else {
            self.query_disk(query, cancel)?
        };

        Ok(sort_and_truncate(matched, query))
    }

    fn sources(&self) -> Result<Vec<String>> {
        let guard = self.read()?;

        let mut unique: HashSet<String> =
            guard.cache.iter().map(|e| e.source.clone()).collect();

        // Cold start: sample a few files from disk.
        if unique.is_empty() {
            for path in self
                .relevant_files(&TimeRange::default())?
                .iter()
                .take(SOURCES_MAX_FILES)
            {
                match self.load_entries(path) {
                    Ok(entries) => unique.extend(entries.into_iter().map(|e| e.source)),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable day file"),
                }
            }
        }

        Ok(unique.into_iter().collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let _guard = self.read()?;

        let mut stats = StorageStats {
            entries_by_source: HashMap::new(),
            entries_by_level: HashMap::new(),
            compression_ratio: 1.0,
            ..StorageStats::default()
        };

        for path in self.relevant_files(&TimeRange::default())? {
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            stats.storage_size += meta.len();

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let date_str = &name[FILE_PREFIX.len()..name.len() - FILE_SUFFIX.len()];
            if let Ok(file_date) = NaiveDate::parse_from_str(date_str, DAY_FORMAT) {
                let day_start = file_date
                    .and_hms_opt(0, 0, 0)
                    .map(|naive| naive.and_utc());
                if let Some(day_start) = day_start {
                    if stats.oldest_entry.is_none_or(|t| day_start < t) {
                        stats.oldest_entry = Some(day_start);
                    }
                    if stats.newest_entry.is_none_or(|t| day_start > t) {
                        stats.newest_entry = Some(day_start);
                    }
                }
            }

            let entries = match self.load_entries(&path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable day file");
                    continue;
                }
            };
            let total = entries.len() as u64;
            stats.total_entries += total;

            // Sample the head of the file to estimate the distribution.
            let sample = entries.len().min(STATS_SAMPLE_SIZE);
            if sample == 0 {
                continue;
            }
            let ratio = total / sample as u64;
            for entry in entries.iter().take(sample) {
                *stats
                    .entries_by_source
                    .entry(entry.source.clone())
                    .or_default() += ratio;
                *stats
                    .entries_by_level
                    .entry(entry.level.clone())
                    .or_default() += ratio;
            }
        }

        if stats.storage_size > 0 {
            stats.compression_ratio = (stats.total_entries * ESTIMATED_ENTRY_BYTES) as f64
                / stats.storage_size as f64;
        }

        Ok(stats)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(mut file) = guard.file.take() {
            file.flush()?;
        }
        guard.closed = true;
        guard.cache.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry_at(ts: chrono::DateTime<Utc>, message: &str) -> LogEntry {
        let mut entry = LogEntry::new("disk-test", message).set_level("info");
        entry.timestamp = ts;
        entry
    }

    #[test]
    fn day_file_is_a_valid_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 5, 13, 10, 0, 0).unwrap();

        storage.store(entry_at(ts, "one")).unwrap();
        storage.store(entry_at(ts, "two")).unwrap();
        storage.store(entry_at(ts, "three")).unwrap();

        let content =
            fs::read_to_string(dir.path().join("logs-2025-05-13.json")).unwrap();
        assert!(content.starts_with("[\n"));
        assert!(content.ends_with("\n]"));
        let parsed: Vec<LogEntry> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].message, "two");
    }

    #[test]
    fn day_rollover_creates_a_second_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();

        let day1 = Utc.with_ymd_and_hms(2025, 5, 13, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 5, 14, 0, 1, 0).unwrap();
        storage.store(entry_at(day1, "late")).unwrap();
        storage.store(entry_at(day2, "early")).unwrap();

        assert!(dir.path().join("logs-2025-05-13.json").exists());
        assert!(dir.path().join("logs-2025-05-14.json").exists());
    }

    #[test]
    fn corrupted_sentinel_is_repaired_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 5, 13, 10, 0, 0).unwrap();

        {
            let storage = DiskStorage::new(dir.path()).unwrap();
            storage.store(entry_at(ts, "kept")).unwrap();
        }

        // Simulate a crash mid-append: strip the closing sentinel.
        let path = dir.path().join("logs-2025-05-13.json");
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.trim_end_matches("\n]")).unwrap();

        let storage = DiskStorage::new(dir.path()).unwrap();
        storage.store(entry_at(ts, "appended")).unwrap();

        let parsed: Vec<LogEntry> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].message, "appended");
    }

    #[test]
    fn query_falls_back_to_disk_for_old_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let old_ts = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();

        // First process writes history.
        {
            let storage = DiskStorage::new(dir.path()).unwrap();
            storage.store(entry_at(old_ts, "historic")).unwrap();
        }

        // Fresh instance has a cold cache covering only new entries.
        let storage = DiskStorage::new(dir.path()).unwrap();
        let new_ts = Utc.with_ymd_and_hms(2025, 5, 13, 12, 0, 0).unwrap();
        storage.store(entry_at(new_ts, "recent")).unwrap();

        let query = Query {
            time_range: TimeRange {
                from: Some(Utc.with_ymd_and_hms(2025, 5, 10, 0, 0, 0).unwrap()),
                to: Some(Utc.with_ymd_and_hms(2025, 5, 11, 0, 0, 0).unwrap()),
            },
            limit: 0,
            ..Query::default()
        };
        let out = storage.query(&query, &CancellationToken::new()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "historic");
    }

    #[test]
    fn recency_queries_use_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 5, 13, 12, 0, 0).unwrap();
        storage.store(entry_at(ts, "cached")).unwrap();

        // Removing the files behind the cache proves the read path.
        for f in fs::read_dir(dir.path()).unwrap() {
            fs::remove_file(f.unwrap().path()).unwrap();
        }

        let out = storage
            .query(&Query::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "cached");
    }

    #[test]
    fn stats_reflect_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 5, 13, 12, 0, 0).unwrap();
        storage.store(entry_at(ts, "a")).unwrap();
        storage.store(entry_at(ts, "b")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert!(stats.storage_size > 0);
        assert_eq!(stats.entries_by_source.get("disk-test"), Some(&2));
    }

    #[test]
    fn close_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path()).unwrap();
        storage.close().unwrap();

        let ts = Utc.with_ymd_and_hms(2025, 5, 13, 12, 0, 0).unwrap();
        assert!(matches!(storage.store(entry_at(ts, "x")), Err(Error::Closed)));
        assert!(matches!(
            storage.query(&Query::default(), &CancellationToken::new()),
            Err(Error::Closed)
        ));
    }
}
