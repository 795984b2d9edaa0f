//! Recent searches: a bounded, oldest-first list of places that were
//! successfully looked up, plus the durable slot it is saved in.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::HistoryError;

/// Maximum number of recent searches kept.
pub const MAX_HISTORY: usize = 5;

/// Key of the persistence slot (file name for [`FileSlot`]).
pub const HISTORY_SLOT_KEY: &str = "recent_searches.json";

/// Oldest first, newest last. Never longer than [`MAX_HISTORY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHistory(Vec<String>);

impl SearchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored entries, keeping only the newest [`MAX_HISTORY`].
    pub fn from_entries(mut entries: Vec<String>) -> Self {
        if entries.len() > MAX_HISTORY {
            entries.drain(..entries.len() - MAX_HISTORY);
        }
        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entry at a 1-based position, as shown to the user.
    pub fn get_display_index(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
    }

    /// Append `query`, evicting from the front until the bound holds.
    #[must_use]
    pub fn with_recorded(&self, query: &str) -> Self {
        let mut entries = self.0.clone();
        entries.push(query.to_string());
        Self::from_entries(entries)
    }
}

/// A single durable key holding one serialized value.
pub trait PersistenceSlot: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<String>, HistoryError>;

    /// Overwrite the stored value.
    fn write(&self, value: &str) -> Result<(), HistoryError>;
}

/// Slot backed by one JSON file.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Slot at `<data_dir>/recent_searches.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(HISTORY_SLOT_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceSlot for FileSlot {
    fn read(&self) -> Result<Option<String>, HistoryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HistoryError::PersistenceRead(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, value: &str) -> Result<(), HistoryError> {
        let write_err = |e: std::io::Error| {
            HistoryError::PersistenceWrite(format!("{}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

/// In-process slot for tests and sessions that should not touch disk.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled with `value`, as if written by an earlier session.
    pub fn with_value(value: impl Into<String>) -> Self {
        let slot = Self::default();
        *slot.value.lock() = Some(value.into());
        slot
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> Option<String> {
        self.value.lock().clone()
    }
}

impl PersistenceSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, HistoryError> {
        Ok(self.value.lock().clone())
    }

    fn write(&self, value: &str) -> Result<(), HistoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HistoryError::PersistenceWrite(
                "memory slot is read-only".to_string(),
            ));
        }
        *self.value.lock() = Some(value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Loads and saves [`SearchHistory`] through a [`PersistenceSlot`].
#[derive(Clone)]
pub struct HistoryStore {
    slot: Arc<dyn PersistenceSlot>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish_non_exhaustive()
    }
}

impl HistoryStore {
    pub fn new(slot: Arc<dyn PersistenceSlot>) -> Self {
        Self { slot }
    }

    /// Restore the saved history. Missing, unreadable or corrupt data yields
    /// an empty history.
    pub fn load(&self) -> SearchHistory {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No saved recent searches");
                return SearchHistory::new();
            }
            Err(e) => {
                tracing::warn!("{}; starting with empty recent searches", e);
                return SearchHistory::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(entries) => {
                let entries = entries
                    .into_iter()
                    .filter(|e| !e.trim().is_empty())
                    .collect();
                let history = SearchHistory::from_entries(entries);
                tracing::info!("Loaded {} recent searches", history.len());
                history
            }
            Err(e) => {
                tracing::warn!("Saved recent searches are corrupt ({}); discarding", e);
                SearchHistory::new()
            }
        }
    }

    /// Append `query` to `history`, evicting the oldest past [`MAX_HISTORY`].
    pub fn record(query: &str, history: &SearchHistory) -> SearchHistory {
        history.with_recorded(query)
    }

    /// Overwrite the slot with `history`.
    pub fn persist(&self, history: &SearchHistory) -> Result<(), HistoryError> {
        let json = serde_json::to_string(history)
            .map_err(|e| HistoryError::PersistenceWrite(e.to_string()))?;
        self.slot.write(&json)?;
        tracing::debug!("Saved {} recent searches", history.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(entries: &[&str]) -> SearchHistory {
        SearchHistory::from_entries(entries.iter().map(|s| s.to_string()).collect())
    }

    fn memory_store() -> (Arc<MemorySlot>, HistoryStore) {
        let slot = Arc::new(MemorySlot::new());
        let store = HistoryStore::new(slot.clone());
        (slot, store)
    }

    #[test]
    fn record_appends_newest_last() {
        let h = HistoryStore::record("Paris", &SearchHistory::new());
        let h = HistoryStore::record("Oslo", &h);
        assert_eq!(h.entries(), ["Paris", "Oslo"]);
    }

    #[test]
    fn record_evicts_oldest_past_bound() {
        let mut h = SearchHistory::new();
        for place in ["A", "B", "C", "D", "E", "F"] {
            h = HistoryStore::record(place, &h);
            assert!(h.len() <= MAX_HISTORY);
        }
        assert_eq!(h.entries(), ["B", "C", "D", "E", "F"]);
    }

    #[test]
    fn record_keeps_duplicates() {
        let h = history_of(&["Paris"]);
        let h = HistoryStore::record("Paris", &h);
        assert_eq!(h.entries(), ["Paris", "Paris"]);
    }

    #[test]
    fn record_does_not_mutate_input() {
        let before = history_of(&["A", "B"]);
        let _after = HistoryStore::record("C", &before);
        assert_eq!(before.entries(), ["A", "B"]);
    }

    #[test]
    fn display_index_is_one_based() {
        let h = history_of(&["A", "B"]);
        assert_eq!(h.get_display_index(1), Some("A"));
        assert_eq!(h.get_display_index(2), Some("B"));
        assert_eq!(h.get_display_index(0), None);
        assert_eq!(h.get_display_index(3), None);
    }

    #[test]
    fn load_empty_slot_is_empty() {
        let (_, store) = memory_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let slot = Arc::new(MemorySlot::new());
        let history = history_of(&["Paris", "Tokyo", "Lima"]);
        HistoryStore::new(slot.clone()).persist(&history).unwrap();

        let fresh = HistoryStore::new(slot);
        assert_eq!(fresh.load(), history);
    }

    #[test]
    fn corrupt_data_loads_empty() {
        for raw in [
            "not json",
            "{\"a\": 1}",
            "[1, 2, 3]",
            "[\"ok\", null]",
            "",
            "[\"\"]",
            "[\"  \", \"\\t\"]",
        ] {
            let store = HistoryStore::new(Arc::new(MemorySlot::with_value(raw)));
            assert!(store.load().is_empty(), "expected empty for {raw:?}");
        }
    }

    #[test]
    fn blank_saved_entries_are_dropped() {
        let raw = r#"["", "Paris", "   ", "Oslo"]"#;
        let store = HistoryStore::new(Arc::new(MemorySlot::with_value(raw)));
        assert_eq!(store.load().entries(), ["Paris", "Oslo"]);
    }

    #[test]
    fn oversized_saved_list_keeps_newest() {
        let raw = r#"["A","B","C","D","E","F","G"]"#;
        let store = HistoryStore::new(Arc::new(MemorySlot::with_value(raw)));
        assert_eq!(store.load().entries(), ["C", "D", "E", "F", "G"]);
    }

    #[test]
    fn load_does_not_write() {
        let slot = Arc::new(MemorySlot::with_value(r#"["Paris"]"#));
        let store = HistoryStore::new(slot.clone());
        let _ = store.load();
        assert_eq!(slot.write_count(), 0);
    }

    #[test]
    fn persist_reports_write_failure() {
        let (slot, store) = memory_store();
        slot.set_fail_writes(true);
        let err = store.persist(&history_of(&["Paris"])).unwrap_err();
        assert!(matches!(err, HistoryError::PersistenceWrite(_)));
        assert_eq!(slot.value(), None);
    }

    #[test]
    fn persisted_format_is_json_array() {
        let (slot, store) = memory_store();
        store.persist(&history_of(&["Paris", "São Paulo"])).unwrap();
        assert_eq!(slot.value().as_deref(), Some(r#"["Paris","São Paulo"]"#));
    }

    #[test]
    fn file_slot_round_trips_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let history = history_of(&["Paris", "Oslo"]);

        HistoryStore::new(Arc::new(FileSlot::new(&data_dir)))
            .persist(&history)
            .unwrap();

        let slot = FileSlot::new(&data_dir);
        assert!(slot.path().exists());
        assert_eq!(HistoryStore::new(Arc::new(slot)).load(), history);
    }

    #[test]
    fn file_slot_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path());
        assert_eq!(slot.read().unwrap(), None);
    }

    #[test]
    fn file_slot_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path());
        slot.write("[\"A\"]").unwrap();
        slot.write("[\"B\"]").unwrap();
        assert_eq!(slot.read().unwrap().as_deref(), Some("[\"B\"]"));
    }
}
