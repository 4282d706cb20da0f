//! Core domain types shared by the harvest, extraction and enrichment stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder used when a keyword field could not be determined.
pub const UNKNOWN: &str = "Unknown";

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Resume position of the listing walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub year: i32,
    pub page: u32,
}

impl Cursor {
    pub fn new(year: i32, page: u32) -> Self {
        Self { year, page }
    }

    /// Next listing page of the same year.
    pub fn next_page(self) -> Self {
        Self {
            year: self.year,
            page: self.page + 1,
        }
    }

    /// First listing page of the following year.
    pub fn next_year(self) -> Self {
        Self {
            year: self.year + 1,
            page: 0,
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/page {}", self.year, self.page)
    }
}

// ---------------------------------------------------------------------------
// DocumentRecord
// ---------------------------------------------------------------------------

/// One harvested document, as written to the status log and metadata snapshot.
///
/// Created once per URL and never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document page URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Attachment candidates found on the page.
    pub pdf_urls: Vec<String>,
    /// True when at least one attachment is on disk.
    pub downloaded: bool,
    /// Local paths of the attachments on disk.
    pub downloaded_files: Vec<String>,
    /// Label → value pairs from the page's field markup.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Ledgers
// ---------------------------------------------------------------------------

/// Per-item status in a resumable ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Completed,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Extraction ledger entry, keyed by attachment filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrProgressEntry {
    pub filename: String,
    pub status: LedgerStatus,
    /// Path of the source attachment (used by `retry`).
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrProgressEntry {
    pub fn completed(filename: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: LedgerStatus::Completed,
            file_path: file_path.into(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(
        filename: impl Into<String>,
        file_path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            status: LedgerStatus::Failed,
            file_path: file_path.into(),
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// The fixed keyword schema requested from the generative backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub era: String,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub subject_topic: String,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub secondary_topic: String,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub document_type: String,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub geographic_scope: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub organizations: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub people: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub technologies: Vec<String>,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub security_level: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub themes: Vec<String>,
}

fn unknown() -> String {
    UNKNOWN.into()
}

// Model answers drift from the schema field by field: `null`, numbers, a
// bare string where a list belongs. Each field is coerced on its own so one
// odd value does not discard the rest of the answer.

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(list_item)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => String::new(),
    };
    Ok(if text.is_empty() { unknown() } else { text })
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().filter_map(list_item).collect(),
        other => list_item(other).into_iter().collect(),
    })
}

/// One list entry; blanks and "Unknown" are dropped.
fn list_item(value: Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty() && !text.eq_ignore_ascii_case(UNKNOWN)).then_some(text)
}

impl Default for Keywords {
    fn default() -> Self {
        Self {
            era: unknown(),
            subject_topic: unknown(),
            secondary_topic: unknown(),
            document_type: unknown(),
            geographic_scope: unknown(),
            organizations: Vec::new(),
            people: Vec::new(),
            technologies: Vec::new(),
            security_level: unknown(),
            themes: Vec::new(),
        }
    }
}

/// Structured answer for one chunk: the keyword schema plus title and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default = "unknown", deserialize_with = "lenient_text")]
    pub publication_date: String,
    #[serde(flatten)]
    pub keywords: Keywords,
}

impl Default for ChunkAnalysis {
    fn default() -> Self {
        Self {
            title: unknown(),
            publication_date: unknown(),
            keywords: Keywords::default(),
        }
    }
}

/// Final structured record written per source text file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Source text file stem.
    pub filetitle: String,
    pub title: String,
    pub publication_date: String,
    pub keywords: Keywords,
    /// Original chunk texts joined in order.
    pub body: String,
}
