//! Flat-file persistence for the crawl and pipeline state.
//!
//! Every store here is single-writer: it owns an in-memory copy and rewrites
//! its whole file on each mutation. Rewrites go through a sibling temp file
//! and a rename, so a crash mid-write leaves the previous version intact.
//!
//! - [`UrlSet`]: visited / unavailable URL sets (sorted JSON arrays)
//! - [`CursorStore`]: `{year: page}` listing cursor
//! - [`StatusLog`]: append-only JSON-lines document log
//! - [`SnapshotStore`]: one metadata JSON per document id
//! - [`Ledger`]: per-item status maps for extraction and enrichment
//! - [`files`]: directory listing and lossy text reads for the pipeline stages

mod cursor;
pub mod files;
mod ledger;
mod records;
mod url_set;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use archivist_shared::{ArchivistError, Result};

pub use cursor::CursorStore;
pub use files::{file_name, file_stem, list_files, read_text_lossy};
pub use ledger::{HasStatus, Ledger};
pub use records::{SnapshotStore, StatusLog};
pub use url_set::UrlSet;

/// Read a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArchivistError::io(path, e)),
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ArchivistError::Storage(format!("{}: {e}", path.display())))
}

/// Pretty-print `value` to `path` via a temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ArchivistError::io(parent, e))?;
        }
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ArchivistError::Storage(format!("{}: {e}", path.display())))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, json).map_err(|e| ArchivistError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| ArchivistError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("archivist-{tag}-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = temp_dir("read-json");
        let value: Option<Vec<String>> = read_json(&dir.join("absent.json")).unwrap();
        assert!(value.is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp() {
        let dir = temp_dir("atomic");
        let path = dir.join("nested").join("state.json");

        write_json_atomic(&path, &BTreeMap::from([("a", 1)])).unwrap();
        write_json_atomic(&path, &BTreeMap::from([("b", 2)])).unwrap();

        let back: BTreeMap<String, u32> = read_json(&path).unwrap().unwrap();
        assert_eq!(back.get("b"), Some(&2));
        assert!(!back.contains_key("a"));
        assert!(!dir.join("nested").join("state.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = temp_dir("corrupt");
        let path = dir.join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_json::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, ArchivistError::Storage(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
