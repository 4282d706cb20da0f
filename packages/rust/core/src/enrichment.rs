//! Enrichment stage: extracted text in, one structured JSON record out.
//!
//! Each text file is cut into overlapping windows, every window is sent to
//! the generative backend with the fixed keyword schema, and the answers are
//! merged with the harvested page metadata. Progress is checkpointed per file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use archivist_extraction::strip_filename_header;
use archivist_shared::{
    ArchiveConfig, ArchivistError, ChunkAnalysis, DocumentRecord, EnrichedRecord,
    EnrichmentConfig, LedgerStatus, PathsConfig, ProgressReporter, Result, UNKNOWN,
};
use archivist_storage::{
    Ledger, file_name, file_stem, list_files, read_text_lossy, write_json_atomic,
};

use crate::backend::{GenerateOptions, GenerativeBackend};
use crate::chunk::{Chunk, chunk_text, merge_chunks};
use crate::metadata::{MetadataResolver, era_from_date, publication_date};

// ---------------------------------------------------------------------------
// Prompt + response parsing
// ---------------------------------------------------------------------------

/// Instruction sent with every window.
pub fn build_prompt(filename: &str, chunk: &Chunk) -> String {
    format!(
        r#"You are an archivist cataloguing declassified intelligence documents.
Read the excerpt below and answer with a single JSON object and nothing else.

Use exactly these keys:
{{
  "title": "short descriptive title of the document",
  "publication_date": "date the document was written, or \"Unknown\"",
  "era": "decade, e.g. \"1960s\"",
  "subject_topic": "main subject",
  "secondary_topic": "secondary subject",
  "document_type": "memo, cable, report, bulletin, ...",
  "geographic_scope": "countries or regions covered",
  "organizations": ["organizations named"],
  "people": ["people named"],
  "technologies": ["weapons, systems or technologies named"],
  "security_level": "classification marking, or \"Unknown\"",
  "themes": ["recurring themes"]
}}

Use "Unknown" for any value you cannot determine and [] for empty lists.

Document: {filename}
Excerpt {label}:
{text}

JSON:"#,
        label = chunk.label(),
        text = chunk.text,
    )
}

/// Parse the first `{` .. last `}` span of a model answer.
pub fn parse_analysis(response: &str) -> Option<ChunkAnalysis> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

/// Build the final record. Keywords come from the last window; page metadata
/// wins over model output for the title, date and era.
pub fn merge_record(
    filetitle: &str,
    chunks: &[Chunk],
    overlap: usize,
    analyses: &[ChunkAnalysis],
    metadata: Option<&DocumentRecord>,
) -> EnrichedRecord {
    let last = analyses.last().cloned().unwrap_or_default();
    let mut keywords = last.keywords;

    let meta_date = metadata.and_then(publication_date);
    if let Some(era) = meta_date.as_deref().and_then(era_from_date) {
        keywords.era = era;
    }

    let title = metadata
        .map(|m| m.title.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or(last.title);

    EnrichedRecord {
        filetitle: filetitle.to_string(),
        title,
        publication_date: meta_date.unwrap_or(last.publication_date),
        keywords,
        body: merge_chunks(chunks, overlap),
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    AlreadyCompleted,
    Completed { output: PathBuf, chunks: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl EnrichSummary {
    fn record(&mut self, outcome: &EnrichOutcome) {
        match outcome {
            EnrichOutcome::AlreadyCompleted => self.skipped += 1,
            EnrichOutcome::Completed { .. } => self.completed += 1,
            EnrichOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct Enricher<'a> {
    backend: &'a dyn GenerativeBackend,
    options: GenerateOptions,
    chunk_size: usize,
    chunk_overlap: usize,
    call_delay: Duration,
    resolver: MetadataResolver,
    text_dir: PathBuf,
    enriched_dir: PathBuf,
    ledger: Ledger<LedgerStatus>,
    calls: usize,
}

impl<'a> Enricher<'a> {
    pub fn open(
        backend: &'a dyn GenerativeBackend,
        config: &EnrichmentConfig,
        archive: &ArchiveConfig,
        paths: &PathsConfig,
    ) -> Result<Self> {
        Ok(Self {
            backend,
            options: GenerateOptions::from_config(config),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            call_delay: Duration::from_millis(config.call_delay_ms),
            resolver: MetadataResolver::new(paths.metadata_dir(), &archive.doc_id_pattern)?,
            text_dir: paths.text_dir(),
            enriched_dir: paths.enriched_dir(),
            ledger: Ledger::load(paths.enrichment_ledger())?,
            calls: 0,
        })
    }

    pub fn ledger(&self) -> &Ledger<LedgerStatus> {
        &self.ledger
    }

    /// Enrich every text file with no ledger entry.
    #[instrument(skip_all)]
    pub async fn run_all(&mut self, progress: &dyn ProgressReporter) -> Result<EnrichSummary> {
        let files = list_files(&self.text_dir, "txt")?;
        let mut summary = EnrichSummary::default();
        progress.phase("Enriching text");

        for (i, path) in files.iter().enumerate() {
            let name = file_name(path);
            progress.item(i + 1, files.len(), &name);
            if self.ledger.contains(&name) {
                summary.skipped += 1;
                continue;
            }
            let outcome = self.process_file(path).await?;
            summary.record(&outcome);
        }

        progress.done(&format!(
            "{} enriched, {} failed, {} skipped",
            summary.completed, summary.failed, summary.skipped
        ));
        Ok(summary)
    }

    /// Re-enrich every file marked failed.
    #[instrument(skip_all)]
    pub async fn retry_failed(&mut self, progress: &dyn ProgressReporter) -> Result<EnrichSummary> {
        let failed = self.ledger.keys_with(LedgerStatus::Failed);
        let mut summary = EnrichSummary::default();
        progress.phase("Retrying failed enrichments");

        for (i, name) in failed.iter().enumerate() {
            progress.item(i + 1, failed.len(), name);
            let path = self.text_dir.join(name);
            let outcome = self.process_file(&path).await?;
            summary.record(&outcome);
        }

        progress.done(&format!(
            "{} enriched, {} failed",
            summary.completed, summary.failed
        ));
        Ok(summary)
    }

    /// Enrich one text file by name unless it is already completed.
    pub async fn single(&mut self, file: &str) -> Result<EnrichOutcome> {
        let mut name = file_name(Path::new(file));
        let has_txt = Path::new(&name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !has_txt {
            name = format!("{}.txt", Path::new(&name).with_extension("").display());
        }
        let path = self.text_dir.join(&name);
        if !path.is_file() {
            return Err(ArchivistError::validation(format!(
                "no extracted text at {}",
                path.display()
            )));
        }
        if self.ledger.get(&name) == Some(&LedgerStatus::Completed) {
            info!(file = %name, "already enriched");
            return Ok(EnrichOutcome::AlreadyCompleted);
        }
        self.process_file(&path).await
    }

    /// Enrich one file and checkpoint the result. Only ledger and output-file
    /// errors are returned as errors; input problems fail the file.
    #[instrument(skip_all, fields(file = %file_name(path)))]
    pub async fn process_file(&mut self, path: &Path) -> Result<EnrichOutcome> {
        let name = file_name(path);
        match self.enrich(path).await {
            Ok(outcome) => {
                self.ledger.set(name, LedgerStatus::Completed)?;
                Ok(outcome)
            }
            Err(e @ (ArchivistError::Storage(_) | ArchivistError::Io { .. })) => Err(e),
            Err(e) => {
                warn!(error = %e, "enrichment failed");
                self.ledger.set(name, LedgerStatus::Failed)?;
                Ok(EnrichOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    async fn enrich(&mut self, path: &Path) -> Result<EnrichOutcome> {
        let content = read_text_lossy(path)
            .map_err(|e| ArchivistError::Enrichment(format!("cannot read input: {e}")))?;
        let body = strip_filename_header(&content);
        if body.trim().is_empty() {
            return Err(ArchivistError::Enrichment("text file is empty".into()));
        }

        let stem = file_stem(path);
        let metadata = self.resolver.resolve(&stem);
        match &metadata {
            Some(m) => debug!(doc_id = %m.doc_id, tier = ?m.tier, "metadata found"),
            None => debug!("no metadata snapshot found"),
        }

        let chunks = chunk_text(body, self.chunk_size, self.chunk_overlap);
        let mut analyses = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let response = self.call(&build_prompt(&file_name(path), chunk)).await?;
            let analysis = parse_analysis(&response).unwrap_or_else(|| {
                warn!(chunk = %chunk.label(), "unparseable model answer, using fallback");
                ChunkAnalysis::default()
            });
            analyses.push(analysis);
        }

        let record = merge_record(
            &stem,
            &chunks,
            self.chunk_overlap,
            &analyses,
            metadata.as_ref().map(|m| &m.record),
        );
        if record.title == UNKNOWN {
            debug!("no title from metadata or model");
        }

        let output = self.enriched_dir.join(format!("{stem}.json"));
        write_json_atomic(&output, &record)?;
        info!(chunks = chunks.len(), output = %output.display(), "record written");

        Ok(EnrichOutcome::Completed {
            output,
            chunks: chunks.len(),
        })
    }

    async fn call(&mut self, prompt: &str) -> Result<String> {
        if self.calls > 0 && !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.calls += 1;
        self.backend.generate(prompt, &self.options).await
    }
}
