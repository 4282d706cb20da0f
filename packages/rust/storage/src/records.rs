//! Per-document records: the JSON-lines status log and metadata snapshots.

use std::io::Write;
use std::path::{Path, PathBuf};

use archivist_shared::{ArchivistError, DocumentRecord, Result};

use crate::{read_json, write_json_atomic};

// ---------------------------------------------------------------------------
// StatusLog
// ---------------------------------------------------------------------------

/// Append-only log with one [`DocumentRecord`] per line.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn append(&self, record: &DocumentRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchivistError::io(parent, e))?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| ArchivistError::Storage(format!("status record: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArchivistError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ArchivistError::io(&self.path, e))?;
        Ok(())
    }

    /// Every record in append order. Lines that fail to parse are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<DocumentRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchivistError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(line = i + 1, error = %e, "skipping malformed status line"),
            }
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// One pretty-printed metadata JSON per document id.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, doc_id: &str) -> PathBuf {
        self.dir.join(format!("{doc_id}.json"))
    }

    /// Write the snapshot for `doc_id`, replacing any earlier one.
    pub fn write(&self, doc_id: &str, record: &DocumentRecord) -> Result<PathBuf> {
        let path = self.path_for(doc_id);
        if path.exists() {
            tracing::debug!(doc_id, "overwriting existing metadata snapshot");
        }
        write_json_atomic(&path, record)?;
        Ok(path)
    }

    pub fn read(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        read_json(&self.path_for(doc_id))
    }

    /// Document ids with a snapshot on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchivistError::io(&self.dir, e)),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp_dir;
    use std::collections::BTreeMap;

    fn record(url: &str) -> DocumentRecord {
        DocumentRecord {
            url: url.into(),
            title: "Weekly Summary".into(),
            pdf_urls: vec![format!("{url}.pdf")],
            downloaded: false,
            downloaded_files: Vec::new(),
            metadata: BTreeMap::from([("Publication Date".into(), "March 4, 1962".into())]),
        }
    }

    #[test]
    fn status_log_appends_lines() {
        let dir = temp_dir("status-log");
        let log = StatusLog::new(dir.join("settings").join("download_status.jsonl"));

        log.append(&record("https://example.com/readingroom/document/1")).unwrap();
        log.append(&record("https://example.com/readingroom/document/2")).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].url.ends_with("/2"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn status_log_skips_garbage_lines() {
        let dir = temp_dir("status-garbage");
        let log = StatusLog::new(dir.join("download_status.jsonl"));
        log.append(&record("https://example.com/a")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"{truncated\n")
            .unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn snapshot_overwrite_and_list() {
        let dir = temp_dir("snapshots");
        let store = SnapshotStore::new(dir.join("metadata"));
        assert!(store.list().unwrap().is_empty());

        store.write("CIA-RDP79T00975A000100010001-1", &record("https://example.com/a")).unwrap();
        store.write("CIA-RDP79T00975A000100010001-1", &record("https://example.com/b")).unwrap();
        store.write("Weekly_Summary", &record("https://example.com/c")).unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec!["CIA-RDP79T00975A000100010001-1", "Weekly_Summary"]
        );
        let back = store.read("CIA-RDP79T00975A000100010001-1").unwrap().unwrap();
        assert_eq!(back.url, "https://example.com/b");
        assert!(store.read("missing").unwrap().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
