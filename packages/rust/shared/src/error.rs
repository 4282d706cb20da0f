//! Error types for archivist.
//!
//! Library crates use [`ArchivistError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all archivist operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchivistError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during navigation, download, or backend calls.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, JSON, or URL parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Flat-file store error (ledgers, URL sets, cursor, logs).
    #[error("storage error: {0}")]
    Storage(String),

    /// Text extraction error (PDF layers, rasterizing, OCR).
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Generative backend error (HTTP, model availability, timeouts).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad arguments, unknown file, invalid format).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The listing walk reached a state it cannot classify and needs an operator.
    #[error("unexpected listing state at {url}: {message}")]
    Structural { url: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArchivistError>;

impl ArchivistError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a structural (operator-attention) error for a listing page.
    pub fn structural(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Structural {
            url: url.into(),
            message: msg.into(),
        }
    }
}
