//! Listing cursor (`scrape_progress.json`).
//!
//! The file maps a year to the last listing page started for it:
//! `{"2012": 4, "2013": 0}`. Older runs wrote `{"last_page": n}` without a
//! year; that value is treated as the page of whichever year is asked for
//! first and is dropped on the next save.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use archivist_shared::{ArchivistError, Cursor, Result};

use crate::{read_json, write_json_atomic};

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum CursorFile {
    Legacy { last_page: u32 },
    Years(BTreeMap<String, u32>),
}

/// Read-modify-write store for the per-year listing cursor.
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,
    years: BTreeMap<i32, u32>,
    legacy_page: Option<u32>,
}

impl CursorStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut years = BTreeMap::new();
        let mut legacy_page = None;

        match read_json::<CursorFile>(&path)? {
            None => {}
            Some(CursorFile::Legacy { last_page }) => legacy_page = Some(last_page),
            Some(CursorFile::Years(map)) => {
                for (key, page) in map {
                    let year = key.parse::<i32>().map_err(|_| {
                        ArchivistError::Storage(format!(
                            "{}: invalid year key {key:?}",
                            path.display()
                        ))
                    })?;
                    years.insert(year, page);
                }
            }
        }

        Ok(Self {
            path,
            years,
            legacy_page,
        })
    }

    /// Saved page for `year`, if any.
    pub fn page_for(&self, year: i32) -> Option<u32> {
        self.years.get(&year).copied().or(self.legacy_page)
    }

    /// Latest year with a saved page.
    pub fn latest(&self) -> Option<Cursor> {
        self.years
            .iter()
            .next_back()
            .map(|(year, page)| Cursor::new(*year, *page))
    }

    /// Record `cursor` and persist the whole map.
    pub fn save(&mut self, cursor: Cursor) -> Result<()> {
        self.legacy_page = None;
        self.years.insert(cursor.year, cursor.page);

        let map: BTreeMap<String, u32> = self
            .years
            .iter()
            .map(|(year, page)| (year.to_string(), *page))
            .collect();
        write_json_atomic(&self.path, &map)?;
        tracing::trace!(%cursor, "cursor saved");
        Ok(())
    }

    /// All saved `(year, page)` pairs, oldest year first.
    pub fn all(&self) -> Vec<Cursor> {
        self.years
            .iter()
            .map(|(year, page)| Cursor::new(*year, *page))
            .collect()
    }
}
