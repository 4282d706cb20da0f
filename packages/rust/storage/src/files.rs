//! Directory listing and text-file reading shared by the pipeline stages.

use std::path::{Path, PathBuf};

use archivist_shared::{ArchivistError, Result};

/// Final path component as a string, or empty.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name without its extension, or empty.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files in `dir` with the given extension (case-insensitive), sorted by name.
/// A missing directory lists as empty.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArchivistError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ArchivistError::io(dir, e))?.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read a text file, replacing invalid UTF-8 with U+FFFD.
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ArchivistError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
