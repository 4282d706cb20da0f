//! Finding the harvested metadata snapshot for an extracted text file.
//!
//! Snapshots are keyed by document id while text files are named after the
//! attachment (`{title slug}_{doc id}[_{n}]`), so the lookup goes from most
//! to least specific: exact name, document-id pattern inside the name, name
//! with a trailing date removed, then a scan of every snapshot.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use archivist_crawler::slugify;
use archivist_shared::{ArchivistError, DocumentRecord, Result};
use archivist_storage::SnapshotStore;

static TRAILING_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[_\- ]*(\d{4}[-_.]\d{1,2}[-_.]\d{1,2}|\d{1,2}[-_.]\d{1,2}[-_.]\d{4}|\d{4})$")
        .expect("valid regex")
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").expect("valid regex"));

/// Field labels that carry a publication date, most specific first.
const DATE_FIELDS: [&str; 2] = ["Publication Date", "Document Creation Date"];

/// How a snapshot was matched to a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactName,
    CollectionPattern,
    DateStripped,
    Scan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataMatch {
    pub tier: MatchTier,
    pub doc_id: String,
    pub record: DocumentRecord,
}

pub struct MetadataResolver {
    snapshots: SnapshotStore,
    doc_id_pattern: Regex,
}

impl MetadataResolver {
    pub fn new(metadata_dir: impl Into<std::path::PathBuf>, doc_id_pattern: &str) -> Result<Self> {
        let doc_id_pattern = Regex::new(doc_id_pattern).map_err(|e| {
            ArchivistError::config(format!("invalid document id pattern {doc_id_pattern:?}: {e}"))
        })?;
        Ok(Self {
            snapshots: SnapshotStore::new(metadata_dir),
            doc_id_pattern,
        })
    }

    /// Snapshot for the text file with stem `stem`, if any tier finds one.
    /// Snapshots that cannot be read count as no match.
    pub fn resolve(&self, stem: &str) -> Option<MetadataMatch> {
        if let Some(found) = self.lookup(stem, MatchTier::ExactName) {
            return Some(found);
        }

        if let Some(m) = self.doc_id_pattern.find(stem) {
            if let Some(found) = self.lookup(m.as_str(), MatchTier::CollectionPattern) {
                return Some(found);
            }
        }

        let stripped = TRAILING_DATE.replace(stem, "");
        if !stripped.is_empty() && stripped != stem {
            if let Some(found) = self.lookup(&stripped, MatchTier::DateStripped) {
                return Some(found);
            }
        }

        self.scan(stem)
    }

    fn read(&self, doc_id: &str) -> Option<DocumentRecord> {
        match self.snapshots.read(doc_id) {
            Ok(record) => record,
            Err(e) => {
                warn!(doc_id, error = %e, "skipping unreadable metadata snapshot");
                None
            }
        }
    }

    fn lookup(&self, doc_id: &str, tier: MatchTier) -> Option<MetadataMatch> {
        self.read(doc_id).map(|record| {
            debug!(doc_id, ?tier, "metadata matched");
            MetadataMatch {
                tier,
                doc_id: doc_id.to_string(),
                record,
            }
        })
    }

    /// Match on recorded download paths first, then on the title slug.
    fn scan(&self, stem: &str) -> Option<MetadataMatch> {
        let ids = match self.snapshots.list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "metadata directory unreadable");
                return None;
            }
        };
        let stem_lower = stem.to_lowercase();
        let mut by_title = None;

        for doc_id in ids {
            let Some(record) = self.read(&doc_id) else {
                continue;
            };

            let by_path = record.downloaded_files.iter().any(|file| {
                Path::new(file)
                    .file_stem()
                    .is_some_and(|s| s.to_string_lossy() == stem)
            });
            if by_path {
                debug!(doc_id = %doc_id, "metadata matched by download path");
                return Some(MetadataMatch {
                    tier: MatchTier::Scan,
                    doc_id,
                    record,
                });
            }

            if by_title.is_none() {
                let title = slugify(&record.title).to_lowercase();
                if !title.is_empty() && stem_lower.contains(&title) {
                    by_title = Some(MetadataMatch {
                        tier: MatchTier::Scan,
                        doc_id,
                        record,
                    });
                }
            }
        }

        if by_title.is_some() {
            debug!("metadata matched by title");
        }
        by_title
    }
}

/// Publication date recorded on the document page, if any.
pub fn publication_date(record: &DocumentRecord) -> Option<String> {
    DATE_FIELDS.iter().find_map(|field| {
        record
            .metadata
            .get(*field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// `"March 4, 1962"` → `"1960s"`.
pub fn era_from_date(date: &str) -> Option<String> {
    let year: u32 = YEAR.captures(date)?.get(1)?.as_str().parse().ok()?;
    Some(format!("{}s", year / 10 * 10))
}
