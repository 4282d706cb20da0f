//! Enrichment and stage orchestration for archivist.
//!
//! - [`backend`]: the generative backend seam and its Ollama client
//! - [`chunk`]: overlapping text windows
//! - [`metadata`]: text file → harvested metadata snapshot
//! - [`enrichment`]: per-file chunked enrichment with a resumable ledger
//! - [`pipeline`]: crawl / extract / enrich / status entry points used by the CLI

pub mod backend;
pub mod chunk;
pub mod enrichment;
pub mod metadata;
pub mod pipeline;
