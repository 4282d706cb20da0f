//! Extraction stage: attachments in `data/PDFs`, text files out, one ledger
//! entry per attachment.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use archivist_shared::{
    ArchivistError, ExtractionConfig, LedgerStatus, OcrProgressEntry, PathsConfig,
    ProgressReporter, Result,
};
use archivist_storage::{Ledger, file_name, file_stem, list_files, read_text_lossy};

use crate::chain::{Acceptance, PageChain};
use crate::layers::DocumentOpener;
use crate::ocr::OcrEngine;

const HEADER_PREFIX: &str = "filename: ";
const PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Where a run writes its text files and ledger.
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    pub text_dir: PathBuf,
    pub ledger: PathBuf,
}

impl ExtractionTarget {
    pub fn primary(paths: &PathsConfig) -> Self {
        Self {
            text_dir: paths.text_dir(),
            ledger: paths.ocr_ledger(),
        }
    }

    /// Output of the alternate engine, read back by [`compare`].
    pub fn alternate(paths: &PathsConfig) -> Self {
        Self {
            text_dir: paths.compare_text_dir(),
            ledger: paths.compare_ocr_ledger(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// Ledger already says completed; nothing was done.
    AlreadyCompleted,
    Completed {
        text_file: PathBuf,
        recovered_pages: usize,
        total_pages: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub backfilled: usize,
}

impl ExtractSummary {
    fn record(&mut self, outcome: &ExtractOutcome) {
        match outcome {
            ExtractOutcome::AlreadyCompleted => self.skipped += 1,
            ExtractOutcome::Completed { .. } => self.completed += 1,
            ExtractOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct Extractor<'a> {
    opener: &'a dyn DocumentOpener,
    chain: PageChain<'a>,
    acceptance: Acceptance,
    pdf_dir: PathBuf,
    text_dir: PathBuf,
    ledger: Ledger<OcrProgressEntry>,
}

impl<'a> Extractor<'a> {
    pub fn open(
        opener: &'a dyn DocumentOpener,
        ocr: &'a dyn OcrEngine,
        config: &ExtractionConfig,
        paths: &PathsConfig,
        target: ExtractionTarget,
    ) -> Result<Self> {
        std::fs::create_dir_all(&target.text_dir)
            .map_err(|e| ArchivistError::io(&target.text_dir, e))?;
        Ok(Self {
            opener,
            chain: PageChain::new(ocr, config.upscale),
            acceptance: Acceptance {
                min_page_ratio: config.min_page_ratio,
                min_chars: config.min_chars,
            },
            pdf_dir: paths.pdf_dir(),
            text_dir: target.text_dir,
            ledger: Ledger::load(target.ledger)?,
        })
    }

    pub fn ledger(&self) -> &Ledger<OcrProgressEntry> {
        &self.ledger
    }

    /// Mark every text file with content as completed when the ledger disagrees.
    /// Returns the number of entries changed. Unreadable files are skipped.
    pub fn backfill(&mut self) -> Result<usize> {
        let mut changed = 0;
        for text_file in list_files(&self.text_dir, "txt")? {
            let content = match read_text_lossy(&text_file) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %text_file.display(), error = %e, "skipping unreadable text file");
                    continue;
                }
            };
            if strip_filename_header(&content).trim().is_empty() {
                continue;
            }

            let name = header_filename(&content)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}.pdf", file_stem(&text_file)));
            if self
                .ledger
                .get(&name)
                .is_some_and(|e| e.status == LedgerStatus::Completed)
            {
                continue;
            }

            let source = self.pdf_dir.join(&name);
            self.ledger.set(
                name.clone(),
                OcrProgressEntry::completed(&name, source.to_string_lossy()),
            )?;
            debug!(file = %name, "backfilled from existing text");
            changed += 1;
        }
        if changed > 0 {
            info!(changed, "ledger backfilled from text files");
        }
        Ok(changed)
    }

    /// Process every attachment with no ledger entry.
    #[instrument(skip_all)]
    pub async fn run_all(&mut self, progress: &dyn ProgressReporter) -> Result<ExtractSummary> {
        progress.phase("Reconciling ledger");
        let mut summary = ExtractSummary {
            backfilled: self.backfill()?,
            ..ExtractSummary::default()
        };

        let files = list_files(&self.pdf_dir, "pdf")?;
        progress.phase("Extracting text");
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

        progress.done(&summary_line(&summary));
        Ok(summary)
    }

    /// Reprocess every ledger entry marked failed.
    #[instrument(skip_all)]
    pub async fn retry_failed(&mut self, progress: &dyn ProgressReporter) -> Result<ExtractSummary> {
        let failed = self.ledger.keys_with(LedgerStatus::Failed);
        let mut summary = ExtractSummary::default();
        progress.phase("Retrying failed extractions");

        for (i, name) in failed.iter().enumerate() {
            progress.item(i + 1, failed.len(), name);
            let recorded = self
                .ledger
                .get(name)
                .map(|e| PathBuf::from(&e.file_path))
                .filter(|p| p.exists());
            let path = recorded.unwrap_or_else(|| self.pdf_dir.join(name));
            let outcome = self.process_file(&path).await?;
            summary.record(&outcome);
        }

        progress.done(&summary_line(&summary));
        Ok(summary)
    }

    /// Process one attachment by name (or path) unless it is already completed.
    pub async fn single(&mut self, file: &str) -> Result<ExtractOutcome> {
        let candidate = Path::new(file);
        let path = if candidate.is_file() {
            candidate.to_path_buf()
        } else {
            self.pdf_dir.join(file)
        };
        if !path.is_file() {
            return Err(ArchivistError::validation(format!(
                "no such attachment: {}",
                path.display()
            )));
        }

        let name = file_name(&path);
        if self
            .ledger
            .get(&name)
            .is_some_and(|e| e.status == LedgerStatus::Completed)
        {
            info!(file = %name, "already completed");
            return Ok(ExtractOutcome::AlreadyCompleted);
        }
        self.process_file(&path).await
    }

    /// Extract one attachment and record the result. Only store and
    /// output-file errors are returned as errors.
    #[instrument(skip_all, fields(file = %file_name(path)))]
    pub async fn process_file(&mut self, path: &Path) -> Result<ExtractOutcome> {
        let name = file_name(path);
        let source_path = path.to_string_lossy().into_owned();

        match self.extract(path, &name).await {
            Ok(outcome) => {
                if let ExtractOutcome::Completed { .. } = &outcome {
                    self.ledger
                        .set(name.clone(), OcrProgressEntry::completed(&name, &source_path))?;
                }
                Ok(outcome)
            }
            Err(e @ (ArchivistError::Storage(_) | ArchivistError::Io { .. })) => Err(e),
            Err(e) => {
                warn!(error = %e, "extraction failed");
                let error = e.to_string();
                self.ledger.set(
                    name.clone(),
                    OcrProgressEntry::failed(&name, &source_path, &error),
                )?;
                Ok(ExtractOutcome::Failed { error })
            }
        }
    }

    async fn extract(&self, path: &Path, name: &str) -> Result<ExtractOutcome> {
        let source = self.opener.open(path).await?;

        let scratch =
            std::env::temp_dir().join(format!("archivist-ocr-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&scratch).map_err(|e| ArchivistError::io(&scratch, e))?;
        let doc = self.chain.document(source.as_ref(), &scratch).await;
        let _ = std::fs::remove_dir_all(&scratch);

        let (recovered, total, chars) = (doc.recovered_pages(), doc.total_pages(), doc.chars());
        if !self.acceptance.evaluate(recovered, total, chars) {
            return Err(ArchivistError::Extraction(format!(
                "insufficient text: {recovered}/{total} pages recovered, {chars} chars"
            )));
        }

        let text_file = self.text_dir.join(format!("{}.txt", file_stem(path)));
        let content = format!("{HEADER_PREFIX}{name}\n\n{}", doc.text());
        std::fs::write(&text_file, content).map_err(|e| ArchivistError::io(&text_file, e))?;

        info!(recovered, total, chars, "text extracted");
        Ok(ExtractOutcome::Completed {
            text_file,
            recovered_pages: recovered,
            total_pages: total,
        })
    }
}

fn summary_line(summary: &ExtractSummary) -> String {
    format!(
        "{} completed, {} failed, {} skipped, {} backfilled",
        summary.completed, summary.failed, summary.skipped, summary.backfilled
    )
}

// ---------------------------------------------------------------------------
// Text files
// ---------------------------------------------------------------------------

/// Drop the leading `filename: ...` header (and the blank line after it).
pub fn strip_filename_header(content: &str) -> &str {
    if !content.starts_with(HEADER_PREFIX) {
        return content;
    }
    match content.split_once("\n\n") {
        Some((_, body)) => body,
        None => "",
    }
}

fn header_filename(content: &str) -> Option<&str> {
    let first = content.lines().next()?;
    let name = first.strip_prefix(HEADER_PREFIX)?.trim();
    (!name.is_empty()).then_some(name)
}

/// Side-by-side view of the primary and alternate text for one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub primary_len: usize,
    pub alternate_len: usize,
    pub difference: usize,
    pub primary_preview: String,
    pub alternate_preview: String,
}

/// Compare the primary and alternate extraction output for `file`
/// (an attachment name, a text file name or a bare stem).
pub fn compare(paths: &PathsConfig, file: &str) -> Result<Comparison> {
    let stem = file_stem(Path::new(file));
    let read = |dir: PathBuf| -> Result<String> {
        let path = dir.join(format!("{stem}.txt"));
        if !path.is_file() {
            return Err(ArchivistError::validation(format!(
                "no extracted text at {}",
                path.display()
            )));
        }
        Ok(strip_filename_header(&read_text_lossy(&path)?).to_string())
    };

    let primary = read(paths.text_dir())?;
    let alternate = read(paths.compare_text_dir())?;
    let (primary_len, alternate_len) = (primary.chars().count(), alternate.chars().count());

    Ok(Comparison {
        primary_len,
        alternate_len,
        difference: primary_len.abs_diff(alternate_len),
        primary_preview: primary.chars().take(PREVIEW_CHARS).collect(),
        alternate_preview: alternate.chars().take(PREVIEW_CHARS).collect(),
    })
}
