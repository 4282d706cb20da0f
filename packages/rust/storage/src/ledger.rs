//! Resumable per-item ledgers (`ocr_progress.json`, `enrichment_progress.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use archivist_shared::{LedgerStatus, OcrProgressEntry, Result};

use crate::{read_json, write_json_atomic};

/// A JSON object keyed by item name, rewritten whole after every update.
#[derive(Debug)]
pub struct Ledger<V> {
    path: PathBuf,
    entries: BTreeMap<String, V>,
}

impl<V> Ledger<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record `value` for `key` and persist immediately.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Result<()> {
        self.entries.insert(key.into(), value);
        write_json_atomic(&self.path, &self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Ledger<V>
where
    V: Serialize + DeserializeOwned + HasStatus,
{
    /// Keys whose entry is in `status`.
    pub fn keys_with(&self, status: LedgerStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, v)| v.status() == status)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// `(completed, failed)` counts.
    pub fn counts(&self) -> (usize, usize) {
        self.entries.values().fold((0, 0), |(done, failed), v| match v.status() {
            LedgerStatus::Completed => (done + 1, failed),
            LedgerStatus::Failed => (done, failed + 1),
        })
    }
}

/// Ledger values that carry a [`LedgerStatus`].
pub trait HasStatus {
    fn status(&self) -> LedgerStatus;
}

impl HasStatus for LedgerStatus {
    fn status(&self) -> LedgerStatus {
        *self
    }
}

impl HasStatus for OcrProgressEntry {
    fn status(&self) -> LedgerStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp_dir;

    #[test]
    fn enrichment_ledger_is_flat_status_map() {
        let dir = temp_dir("ledger-enrich");
        let path = dir.join("enrichment_progress.json");

        let mut ledger: Ledger<LedgerStatus> = Ledger::load(&path).unwrap();
        ledger.set("memo_1.txt", LedgerStatus::Completed).unwrap();
        ledger.set("memo_2.txt", LedgerStatus::Failed).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"memo_1.txt": "completed", "memo_2.txt": "failed"})
        );

        let reloaded: Ledger<LedgerStatus> = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.counts(), (1, 1));
        assert_eq!(reloaded.keys_with(LedgerStatus::Failed), vec!["memo_2.txt"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ocr_entries_survive_reload() {
        let dir = temp_dir("ledger-ocr");
        let path = dir.join("ocr_progress.json");

        let mut ledger: Ledger<OcrProgressEntry> = Ledger::load(&path).unwrap();
        ledger
            .set(
                "memo_1.pdf",
                OcrProgressEntry::failed("memo_1.pdf", "data/PDFs/memo_1.pdf", "too little text"),
            )
            .unwrap();
        ledger
            .set(
                "memo_1.pdf",
                OcrProgressEntry::completed("memo_1.pdf", "data/PDFs/memo_1.pdf"),
            )
            .unwrap();

        let reloaded: Ledger<OcrProgressEntry> = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.get("memo_1.pdf").unwrap();
        assert_eq!(entry.status, LedgerStatus::Completed);
        assert!(entry.error.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
