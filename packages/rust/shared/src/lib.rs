//! Shared types, error model, and configuration for archivist.
//!
//! This crate is the foundation depended on by all other archivist crates.
//! It provides:
//! - [`ArchivistError`]: the unified error type
//! - Domain types ([`DocumentRecord`], [`Cursor`], [`OcrProgressEntry`], [`EnrichedRecord`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`ProgressReporter`]: stage progress callbacks

pub mod config;
pub mod error;
pub mod progress;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, EnrichmentConfig, ExtractionConfig, OcrEngineKind, PathsConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{ArchivistError, Result};
pub use progress::{ProgressReporter, SilentProgress};
pub use types::{
    ChunkAnalysis, Cursor, DocumentRecord, EnrichedRecord, Keywords, LedgerStatus,
    OcrProgressEntry, UNKNOWN,
};
