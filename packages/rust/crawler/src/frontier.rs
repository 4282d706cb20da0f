//! Frontier walker: drives the `(year, page)` cursor through the search listing.
//!
//! Each iteration persists the cursor, loads one listing page and classifies
//! it. Document links go to a [`DocumentSink`]; end-of-year conditions roll
//! the cursor to page 0 of the next year.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::{debug, info, instrument, warn};

use archivist_shared::{ArchiveConfig, ArchivistError, Cursor, ProgressReporter, Result};
use archivist_storage::CursorStore;

use crate::adapters::PageDriver;
use crate::listing::{
    flags_unavailable, is_document_url, is_root_url, is_search_url, parse_resume_url, search_url,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Receives document URLs in listing order.
#[async_trait]
pub trait DocumentSink: Send {
    async fn accept(&mut self, driver: &mut dyn PageDriver, url: &str) -> Result<()>;
}

/// Where a walk begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStart {
    /// Latest saved cursor, else page 0 of the configured start year.
    Resume,
    /// The saved page of this year, else page 0.
    Year(i32),
    /// This exact listing URL first; year and page are inferred from it.
    Url(String),
}

/// Bounds on a single run.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Stop after fetching this many listing pages.
    pub max_pages: Option<u32>,
    /// Stop once the cursor rolls past this year. Overrides the config value.
    pub end_year: Option<i32>,
}

/// Why a listing page ended its year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfYear {
    /// Navigation kept settling on the landing page after every forced reload.
    Redirected,
    /// The resolved URL left the search path.
    LeftSearch,
    /// Landing-page title outside the search path.
    RootTitle,
    /// No results, but the landing-page marker is in the body.
    RootMarker,
}

/// Classification of a loaded listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    /// The listing page flagged itself dead; move to the next page.
    Unavailable,
    /// No more results for this year.
    EndOfYear(EndOfYear),
    /// Document URLs in page order.
    Documents(Vec<String>),
}

/// Why a walk stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PastEndYear,
    PageLimit,
}

/// Summary of a completed walk.
#[derive(Debug, Clone)]
pub struct WalkSummary {
    pub pages_fetched: u32,
    pub documents_seen: usize,
    pub unavailable_pages: u32,
    pub years_completed: u32,
    /// Cursor the next run resumes from.
    pub cursor: Cursor,
    pub stop: StopReason,
}

/// What happened when navigating to a listing URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landing {
    Settled,
    Redirected,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Decide what a loaded listing page means. Checks run in a fixed order and
/// the first that applies wins.
pub fn classify(
    archive: &ArchiveConfig,
    url: &str,
    title: &str,
    body: &str,
    anchors: Vec<String>,
) -> Result<ListingState> {
    if flags_unavailable(archive, body) {
        return Ok(ListingState::Unavailable);
    }
    if !is_search_url(archive, url) {
        return Ok(ListingState::EndOfYear(EndOfYear::LeftSearch));
    }
    // Past the check above the URL is under the search path, so this only
    // fires when the configured search path has no "search" in it. Keep the
    // order: the landing-page title must not outrank leaving the search path.
    if title.contains(&archive.root_title) && !url.to_lowercase().contains("search") {
        return Ok(ListingState::EndOfYear(EndOfYear::RootTitle));
    }
    if anchors.is_empty() {
        if body.contains(&archive.root_title) {
            return Ok(ListingState::EndOfYear(EndOfYear::RootMarker));
        }
        return Err(ArchivistError::structural(
            url,
            "listing has no document links and no end-of-results marker",
        ));
    }
    Ok(ListingState::Documents(anchors))
}

// ---------------------------------------------------------------------------
// FrontierWalker
// ---------------------------------------------------------------------------

/// Listing walker over a [`PageDriver`].
pub struct FrontierWalker {
    archive: ArchiveConfig,
    cursors: CursorStore,
    poll_window: Duration,
    poll_step: Duration,
}

impl FrontierWalker {
    pub fn new(archive: ArchiveConfig, cursors: CursorStore) -> Self {
        let poll_window = Duration::from_millis(archive.redirect_poll_window_ms);
        let poll_step = Duration::from_millis(archive.redirect_poll_step_ms.max(1));
        Self {
            archive,
            cursors,
            poll_window,
            poll_step,
        }
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Cursor a walk from `start` would begin at.
    pub fn start_cursor(&self, start: &WalkStart) -> Cursor {
        match start {
            WalkStart::Resume => self.cursors.latest().unwrap_or_else(|| {
                let year = self.archive.start_year;
                Cursor::new(year, self.cursors.page_for(year).unwrap_or(0))
            }),
            WalkStart::Year(year) => Cursor::new(*year, self.cursors.page_for(*year).unwrap_or(0)),
            WalkStart::Url(url) => parse_resume_url(url, self.archive.start_year),
        }
    }

    /// Walk the listing until the cursor passes the end year or the page
    /// limit is hit.
    ///
    /// Navigation failures and unclassifiable listing pages abort the walk;
    /// the cursor on disk still names the page that failed.
    #[instrument(skip_all)]
    pub async fn walk(
        &mut self,
        driver: &mut dyn PageDriver,
        sink: &mut dyn DocumentSink,
        start: WalkStart,
        options: &WalkOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<WalkSummary> {
        let end_year = options
            .end_year
            .or(self.archive.end_year)
            .unwrap_or_else(|| Utc::now().year());

        let mut cursor = self.start_cursor(&start);
        let mut first_url = match start {
            WalkStart::Url(url) => Some(url),
            _ => None,
        };

        let mut summary = WalkSummary {
            pages_fetched: 0,
            documents_seen: 0,
            unavailable_pages: 0,
            years_completed: 0,
            cursor,
            stop: StopReason::PastEndYear,
        };

        info!(%cursor, end_year, driver = driver.name(), "starting listing walk");

        loop {
            if cursor.year > end_year {
                summary.stop = StopReason::PastEndYear;
                break;
            }
            if options
                .max_pages
                .is_some_and(|max| summary.pages_fetched >= max)
            {
                summary.stop = StopReason::PageLimit;
                break;
            }

            self.cursors.save(cursor)?;
            progress.phase(&format!("Listing {cursor}"));

            let url = first_url
                .take()
                .unwrap_or_else(|| search_url(&self.archive, cursor));
            let landing = self.land(driver, &url).await?;
            summary.pages_fetched += 1;

            let state = match landing {
                Landing::Redirected => ListingState::EndOfYear(EndOfYear::Redirected),
                Landing::Settled => self.read_listing(driver).await?,
            };

            match state {
                ListingState::Unavailable => {
                    warn!(%cursor, "listing page unavailable, skipping");
                    summary.unavailable_pages += 1;
                    cursor = cursor.next_page();
                }
                ListingState::EndOfYear(reason) => {
                    info!(%cursor, ?reason, "end of results for year");
                    cursor = cursor.next_year();
                    self.cursors.save(cursor)?;
                    summary.years_completed += 1;
                }
                ListingState::Documents(urls) => {
                    debug!(%cursor, count = urls.len(), "listing page parsed");
                    let total = urls.len();
                    for (i, doc_url) in urls.iter().enumerate() {
                        progress.item(i + 1, total, doc_url);
                        sink.accept(driver, doc_url).await?;
                    }
                    summary.documents_seen += total;
                    cursor = cursor.next_page();
                }
            }
        }

        summary.cursor = cursor;
        info!(
            pages = summary.pages_fetched,
            documents = summary.documents_seen,
            years = summary.years_completed,
            cursor = %summary.cursor,
            stop = ?summary.stop,
            "listing walk finished"
        );
        progress.done(&format!(
            "{} listing pages, {} documents, next {}",
            summary.pages_fetched, summary.documents_seen, summary.cursor
        ));
        Ok(summary)
    }

    /// Navigate to a listing URL, forcing fresh navigations while the engine
    /// keeps landing on the archive root.
    async fn land(&self, driver: &mut dyn PageDriver, url: &str) -> Result<Landing> {
        let attempts = self.archive.max_forced_reloads.max(1);

        for attempt in 1..=attempts {
            if let Err(e) = driver.navigate(url).await {
                if attempt == attempts {
                    return Err(e);
                }
                warn!(%url, attempt, error = %e, "listing navigation failed, retrying");
                continue;
            }

            if !self.settles_on_root(driver).await? {
                return Ok(Landing::Settled);
            }
            warn!(%url, attempt, attempts, "redirected to archive root, forcing reload");
        }

        Ok(Landing::Redirected)
    }

    /// Poll the current URL for the configured window. `true` means the
    /// engine landed on the archive root rather than a search page.
    async fn settles_on_root(&self, driver: &mut dyn PageDriver) -> Result<bool> {
        let polls = (self.poll_window.as_millis() / self.poll_step.as_millis()).max(1);
        for _ in 0..polls {
            let current = driver.current_url().await?;
            if is_search_url(&self.archive, &current) {
                return Ok(false);
            }
            if is_root_url(&self.archive, &current) {
                return Ok(true);
            }
            tokio::time::sleep(self.poll_step).await;
        }
        Ok(false)
    }

    async fn read_listing(&self, driver: &mut dyn PageDriver) -> Result<ListingState> {
        let url = driver.current_url().await?;
        let anchors = driver
            .extract_links(&self.archive.listing_selector)?
            .into_iter()
            .map(|link| link.href)
            .filter(|href| is_document_url(&self.archive, href))
            .collect();
        classify(
            &self.archive,
            &url,
            &driver.title(),
            driver.content(),
            anchors,
        )
    }
}
