use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;

use super::{Storage, StorageStats, scan, sort_and_truncate};
use crate::domain::{LogEntry, Query};
use crate::error::{Error, Result};

const DEFAULT_CAPACITY: usize = 1_000_000;

/// Rough per-entry footprint used for the size estimate.
const ESTIMATED_ENTRY_BYTES: u64 = 500;

struct Inner {
    entries: VecDeque<LogEntry>,
    closed: bool,
}

/// Ring-bounded in-memory backend. Inserting at capacity evicts the oldest
/// entry.
pub struct MemoryStorage {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|g| g.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn store(&self, entry: LogEntry) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.closed {
            return Err(Error::Closed);
        }

        if guard.entries.len() >= self.capacity {
            guard.entries.pop_front();
        }
        guard.entries.push_back(entry);
        Ok(())
    }

    fn query(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<LogEntry>> {
        let guard = self.read()?;
        let matched = scan(guard.entries.iter(), query, cancel)?;
        Ok(sort_and_truncate(matched, query))
    }

    fn sources(&self) -> Result<Vec<String>> {
        let guard = self.read()?;
        let unique: HashSet<&str> = guard.entries.iter().map(|e| e.source.as_str()).collect();
        Ok(unique.into_iter().map(str::to_owned).collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let guard = self.read()?;

        let mut stats = StorageStats {
            total_entries: guard.entries.len() as u64,
            entries_by_source: HashMap::new(),
            entries_by_level: HashMap::new(),
            storage_size: guard.entries.len() as u64 * ESTIMATED_ENTRY_BYTES,
            compression_ratio: 1.0,
            ..StorageStats::default()
        };

        for entry in &guard.entries {
            if stats.oldest_entry.is_none_or(|t| entry.timestamp < t) {
                stats.oldest_entry = Some(entry.timestamp);
            }
            if stats.newest_entry.is_none_or(|t| entry.timestamp > t) {
                stats.newest_entry = Some(entry.timestamp);
            }
            *stats
                .entries_by_source
                .entry(entry.source.clone())
                .or_default() += 1;
            *stats
                .entries_by_level
                .entry(entry.level.clone())
                .or_default() += 1;
        }

        Ok(stats)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.closed = true;
        guard.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueryBuilder;

    fn entry(source: &str, level: &str, message: &str) -> LogEntry {
        LogEntry::new(source, message).set_level(level)
    }

    #[test]
    fn ring_never_exceeds_capacity() {
        let storage = MemoryStorage::with_capacity(3);
        for i in 0..10 {
            storage.store(entry("s", "info", &format!("m{i}"))).unwrap();
            assert!(storage.len() <= 3);
        }

        let cancel = CancellationToken::new();
        let q = QueryBuilder::new().with_limit(0).with_sort("timestamp", "asc").build();
        let out = storage.query(&q, &cancel).unwrap();
        let messages: Vec<&str> = out.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn sources_are_distinct() {
        let storage = MemoryStorage::new();
        storage.store(entry("a", "info", "1")).unwrap();
        storage.store(entry("b", "info", "2")).unwrap();
        storage.store(entry("a", "info", "3")).unwrap();

        let mut sources = storage.sources().unwrap();
        sources.sort();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn stats_counts_by_source_and_level() {
        let storage = MemoryStorage::new();
        storage.store(entry("a", "info", "1")).unwrap();
        storage.store(entry("a", "error", "2")).unwrap();
        storage.store(entry("b", "info", "3")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.entries_by_source.get("a"), Some(&2));
        assert_eq!(stats.entries_by_level.get("info"), Some(&2));
        assert!(stats.oldest_entry.unwrap() <= stats.newest_entry.unwrap());
    }

    #[test]
    fn closed_storage_rejects_all_operations() {
        let storage = MemoryStorage::new();
        storage.store(entry("s", "info", "m")).unwrap();
        storage.close().unwrap();

        assert!(matches!(
            storage.store(entry("s", "info", "m")),
            Err(Error::Closed)
        ));
        assert!(matches!(
            storage.query(&Query::default(), &CancellationToken::new()),
            Err(Error::Closed)
        ));
        assert!(matches!(storage.sources(), Err(Error::Closed)));
        assert!(matches!(storage.stats(), Err(Error::Closed)));
    }
}
