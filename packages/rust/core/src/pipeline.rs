//! Stage entry points: crawl, extract, enrich, status.
//!
//! Each stage opens its own stores from [`AppConfig`], runs to completion
//! and returns a report. Stages only meet through the files they leave on disk.

use std::time::{Duration, Instant};

use tracing::{info, instrument};

use archivist_crawler::{
    FrontierWalker, HarvestStats, Harvester, HttpDriver, PageDriver, WalkOptions, WalkStart,
    WalkSummary,
};
use archivist_extraction::{
    ExtractOutcome, ExtractSummary, ExtractionTarget, Extractor, PdfOpener, engine_from_config,
};
use archivist_shared::{AppConfig, ArchivistError, Cursor, ProgressReporter, Result};
use archivist_storage::{CursorStore, Ledger, StatusLog, UrlSet};

use crate::backend::OllamaBackend;
use crate::enrichment::{EnrichOutcome, EnrichSummary, Enricher};

/// Which items a ledger-driven stage processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageMode {
    /// Everything without a ledger entry.
    All,
    /// Entries marked failed.
    Retry,
    /// One named file.
    Single(String),
}

/// Result of a ledger-driven stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageReport<S, O> {
    Sweep(S),
    Single(O),
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

/// Interpret the optional crawl argument: nothing resumes, a number is a
/// start year, a URL is an exact listing page.
pub fn parse_crawl_target(arg: Option<&str>) -> Result<WalkStart> {
    let Some(arg) = arg.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(WalkStart::Resume);
    };
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(WalkStart::Url(arg.to_string()));
    }
    arg.parse::<i32>().map(WalkStart::Year).map_err(|_| {
        ArchivistError::validation(format!("expected a year or a listing URL, got {arg:?}"))
    })
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub walk: WalkSummary,
    pub harvest: HarvestStats,
    pub elapsed: Duration,
}

/// Walk the listing over HTTP and harvest every document found.
pub async fn crawl(
    config: &AppConfig,
    start: WalkStart,
    options: &WalkOptions,
    progress: &dyn ProgressReporter,
) -> Result<CrawlReport> {
    let mut driver = HttpDriver::new(Duration::from_secs(
        config.archive.navigation_timeout_secs,
    ))?;
    crawl_with(config, &mut driver, start, options, progress).await
}

/// [`crawl`] with a caller-supplied page driver.
#[instrument(skip_all, fields(driver = driver.name()))]
pub async fn crawl_with(
    config: &AppConfig,
    driver: &mut dyn PageDriver,
    start: WalkStart,
    options: &WalkOptions,
    progress: &dyn ProgressReporter,
) -> Result<CrawlReport> {
    let started = Instant::now();
    config.paths.ensure_dirs()?;

    let mut harvester = Harvester::open(&config.archive, &config.paths)?;
    let mut walker = FrontierWalker::new(
        config.archive.clone(),
        CursorStore::load(config.paths.cursor_file())?,
    );

    let walk = walker
        .walk(driver, &mut harvester, start, options, progress)
        .await?;
    let harvest = harvester.stats().clone();

    info!(
        pages = walk.pages_fetched,
        harvested = harvest.harvested,
        failed = harvest.failed,
        cursor = %walk.cursor,
        "crawl finished"
    );
    Ok(CrawlReport {
        walk,
        harvest,
        elapsed: started.elapsed(),
    })
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// Run the extraction stage. `alternate` runs the other OCR engine into the
/// comparison directory with its own ledger.
pub async fn extract(
    config: &AppConfig,
    mode: StageMode,
    alternate: bool,
    progress: &dyn ProgressReporter,
) -> Result<StageReport<ExtractSummary, ExtractOutcome>> {
    config.paths.ensure_dirs()?;
    let opener = PdfOpener::from_config(&config.extraction);
    let engine = engine_from_config(&config.extraction, alternate);
    let target = if alternate {
        ExtractionTarget::alternate(&config.paths)
    } else {
        ExtractionTarget::primary(&config.paths)
    };
    info!(engine = engine.name(), text_dir = %target.text_dir.display(), "extraction starting");

    let mut extractor = Extractor::open(
        &opener,
        engine.as_ref(),
        &config.extraction,
        &config.paths,
        target,
    )?;
    Ok(match mode {
        StageMode::All => StageReport::Sweep(extractor.run_all(progress).await?),
        StageMode::Retry => StageReport::Sweep(extractor.retry_failed(progress).await?),
        StageMode::Single(file) => StageReport::Single(extractor.single(&file).await?),
    })
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

/// Run the enrichment stage against the configured backend. Fails up front
/// when the configured model is not installed.
pub async fn enrich(
    config: &AppConfig,
    mode: StageMode,
    progress: &dyn ProgressReporter,
) -> Result<StageReport<EnrichSummary, EnrichOutcome>> {
    config.paths.ensure_dirs()?;
    let backend = OllamaBackend::new(&config.enrichment)?;
    progress.phase("Checking model");
    backend.check_model().await?;

    let mut enricher = Enricher::open(&backend, &config.enrichment, &config.archive, &config.paths)?;
    Ok(match mode {
        StageMode::All => StageReport::Sweep(enricher.run_all(progress).await?),
        StageMode::Retry => StageReport::Sweep(enricher.retry_failed(progress).await?),
        StageMode::Single(file) => StageReport::Single(enricher.single(&file).await?),
    })
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Saved listing position per year.
    pub cursors: Vec<Cursor>,
    pub visited: usize,
    pub unavailable: Vec<String>,
    pub documents_logged: usize,
    /// `(completed, failed)`.
    pub extraction: (usize, usize),
    pub enrichment: (usize, usize),
}

/// Read every store without modifying anything.
pub fn status(config: &AppConfig) -> Result<StatusReport> {
    let paths = &config.paths;
    let cursors = CursorStore::load(paths.cursor_file())?;
    let visited = UrlSet::load(paths.visited_file())?;
    let unavailable = UrlSet::load(paths.unavailable_file())?;
    let extraction = Ledger::<archivist_shared::OcrProgressEntry>::load(paths.ocr_ledger())?;
    let enrichment = Ledger::<archivist_shared::LedgerStatus>::load(paths.enrichment_ledger())?;

    Ok(StatusReport {
        cursors: cursors.all(),
        visited: visited.len(),
        unavailable: unavailable.iter().map(str::to_string).collect(),
        documents_logged: StatusLog::new(paths.status_log()).read_all()?.len(),
        extraction: extraction.counts(),
        enrichment: enrichment.counts(),
    })
}
