//! Persisted URL sets (`visited_urls.json`, `unavailables.json`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use archivist_shared::Result;

use crate::{read_json, write_json_atomic};

/// A set of URLs stored as a sorted JSON array.
///
/// Every insert rewrites the file, so membership survives a crash right
/// after the document that caused it.
#[derive(Debug)]
pub struct UrlSet {
    path: PathBuf,
    urls: BTreeSet<String>,
}

impl UrlSet {
    /// Load the set at `path`; a missing file is an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let urls: BTreeSet<String> = read_json::<Vec<String>>(&path)?
            .unwrap_or_default()
            .into_iter()
            .collect();
        tracing::debug!(path = %path.display(), count = urls.len(), "loaded url set");
        Ok(Self { path, urls })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Add `url` and persist. Returns `false` if it was already present.
    pub fn insert(&mut self, url: &str) -> Result<bool> {
        if !self.urls.insert(url.to_string()) {
            return Ok(false);
        }
        write_json_atomic(&self.path, &self.urls)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp_dir;

    #[test]
    fn insert_persists_sorted_and_deduplicated() {
        let dir = temp_dir("urlset");
        let path = dir.join("visited_urls.json");

        let mut set = UrlSet::load(&path).unwrap();
        assert!(set.is_empty());
        assert!(set.insert("https://example.com/b").unwrap());
        assert!(set.insert("https://example.com/a").unwrap());
        assert!(!set.insert("https://example.com/b").unwrap());

        let on_disk: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, vec!["https://example.com/a", "https://example.com/b"]);

        let reloaded = UrlSet::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("https://example.com/a"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_unsorted_legacy_arrays() {
        let dir = temp_dir("urlset-legacy");
        let path = dir.join("unavailables.json");
        std::fs::write(&path, r#"["z","a","z"]"#).unwrap();

        let set = UrlSet::load(&path).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["a", "z"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
