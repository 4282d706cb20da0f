//! Document harvester: one document page in, one record (or a skip) out.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use archivist_shared::{ArchiveConfig, ArchivistError, DocumentRecord, PathsConfig, Result};
use archivist_storage::{SnapshotStore, StatusLog, UrlSet};

use crate::adapters::PageDriver;
use crate::attachments::{AttachmentPolicy, DownloadStatus, Downloader, attachment_file_name};
use crate::doc_id::{DocId, DocIdResolver, DocIdSource, slugify, truncate_utf8};
use crate::frontier::DocumentSink;
use crate::listing::flags_unavailable;

/// Longest title slug, in bytes, used in attachment file names. Leaves room
/// for the document id and suffix under the usual 255-byte name limit.
const MAX_TITLE_SLUG_BYTES: usize = 120;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of [`Harvester::harvest`] for one URL.
#[derive(Debug, Clone)]
pub enum HarvestOutcome {
    /// Already in the visited set.
    AlreadyVisited,
    /// Already in the unavailable set.
    KnownUnavailable,
    /// The page flagged itself dead; it is now skip-listed.
    MarkedUnavailable,
    /// The page was processed and recorded.
    Harvested { record: DocumentRecord, doc_id: DocId },
    /// Processing failed; the URL stays unvisited and is retried on the next run.
    Failed { error: String },
}

/// Running totals for one harvester instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub harvested: usize,
    pub skipped: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub files_downloaded: usize,
    pub files_present: usize,
    pub files_failed: usize,
    /// Documents with no attachment link but a download-looking button.
    pub button_only: usize,
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Turns document URLs into attachments, a metadata snapshot and a status line.
pub struct Harvester {
    archive: ArchiveConfig,
    pdf_dir: PathBuf,
    visited: UrlSet,
    unavailable: UrlSet,
    status_log: StatusLog,
    snapshots: SnapshotStore,
    resolver: DocIdResolver,
    policy: AttachmentPolicy,
    downloader: Downloader,
    settle: Duration,
    stats: HarvestStats,
}

impl Harvester {
    /// Open the harvester's stores under `paths`.
    pub fn open(archive: &ArchiveConfig, paths: &PathsConfig) -> Result<Self> {
        Ok(Self {
            archive: archive.clone(),
            pdf_dir: paths.pdf_dir(),
            visited: UrlSet::load(paths.visited_file())?,
            unavailable: UrlSet::load(paths.unavailable_file())?,
            status_log: StatusLog::new(paths.status_log()),
            snapshots: SnapshotStore::new(paths.metadata_dir()),
            resolver: DocIdResolver::from_config(archive)?,
            policy: AttachmentPolicy::from_config(archive),
            downloader: Downloader::new(Duration::from_secs(archive.download_timeout_secs))?,
            settle: Duration::from_millis(archive.settle_delay_ms),
            stats: HarvestStats::default(),
        })
    }

    pub fn stats(&self) -> &HarvestStats {
        &self.stats
    }

    pub fn visited(&self) -> &UrlSet {
        &self.visited
    }

    pub fn unavailable(&self) -> &UrlSet {
        &self.unavailable
    }

    /// Process one document URL.
    ///
    /// Per-document failures come back as [`HarvestOutcome::Failed`]; only
    /// store failures are returned as errors.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn harvest(
        &mut self,
        driver: &mut dyn PageDriver,
        url: &str,
    ) -> Result<HarvestOutcome> {
        if self.visited.contains(url) {
            debug!("already visited");
            self.stats.skipped += 1;
            return Ok(HarvestOutcome::AlreadyVisited);
        }
        if self.unavailable.contains(url) {
            debug!("known unavailable");
            self.stats.skipped += 1;
            return Ok(HarvestOutcome::KnownUnavailable);
        }

        match self.process(driver, url).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ (ArchivistError::Storage(_) | ArchivistError::Io { .. })) => Err(e),
            Err(e) => {
                warn!(error = %e, "document failed");
                self.stats.failed += 1;
                Ok(HarvestOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    async fn process(&mut self, driver: &mut dyn PageDriver, url: &str) -> Result<HarvestOutcome> {
        driver.navigate(url).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        if flags_unavailable(&self.archive, driver.content()) {
            info!("document unavailable");
            self.unavailable.insert(url)?;
            self.stats.unavailable += 1;
            return Ok(HarvestOutcome::MarkedUnavailable);
        }

        let title = driver.title();
        let metadata = driver.extract_fields();
        let links = driver.extract_links("a[href]")?;
        let pdf_urls = self.policy.select(&links);

        let doc_id = self.resolver.resolve(url, &metadata, &title);
        if doc_id.source == DocIdSource::FallbackSlug {
            info!(doc_id = %doc_id.value, "no document number found, using title slug");
        } else {
            debug!(doc_id = %doc_id.value, source = doc_id.source.as_str(), "document id resolved");
        }

        if pdf_urls.is_empty() {
            let buttons = self.policy.download_buttons(driver.extract_buttons());
            if buttons.is_empty() {
                warn!("no attachments found");
            } else {
                warn!(?buttons, "no attachment links, download sits behind a button");
                self.stats.button_only += 1;
            }
        }

        let title_slug = title_slug(&title);
        let mut downloaded_files = Vec::new();
        for (index, pdf_url) in pdf_urls.iter().enumerate() {
            let name =
                attachment_file_name(&title_slug, &doc_id.value, index, pdf_urls.len(), pdf_url);
            let dest = self.pdf_dir.join(name);
            match self.downloader.fetch(pdf_url, &dest).await {
                Ok(status) => {
                    match status {
                        DownloadStatus::AlreadyPresent => self.stats.files_present += 1,
                        DownloadStatus::Fetched(_) => self.stats.files_downloaded += 1,
                    }
                    downloaded_files.push(dest.display().to_string());
                }
                Err(e) => {
                    warn!(attachment = %pdf_url, error = %e, "attachment download failed");
                    self.stats.files_failed += 1;
                }
            }
        }

        let record = DocumentRecord {
            url: url.to_string(),
            title,
            pdf_urls,
            downloaded: !downloaded_files.is_empty(),
            downloaded_files,
            metadata,
        };

        self.snapshots.write(&doc_id.value, &record)?;
        self.status_log.append(&record)?;
        self.visited.insert(url)?;
        self.stats.harvested += 1;

        info!(
            doc_id = %doc_id.value,
            attachments = record.pdf_urls.len(),
            downloaded = record.downloaded_files.len(),
            "document harvested"
        );
        Ok(HarvestOutcome::Harvested { record, doc_id })
    }
}

#[async_trait]
impl DocumentSink for Harvester {
    async fn accept(&mut self, driver: &mut dyn PageDriver, url: &str) -> Result<()> {
        self.harvest(driver, url).await.map(|_| ())
    }
}

fn title_slug(title: &str) -> String {
    truncate_utf8(&slugify(title), MAX_TITLE_SLUG_BYTES).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::HttpDriver;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/readingroom/document/CIA-RDP79T00975A000100010001-1";

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn setup(server: &MockServer) -> (ArchiveConfig, PathsConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("archivist-harvest-{}", uuid::Uuid::now_v7()));
        let archive = ArchiveConfig {
            base_url: server.uri(),
            settle_delay_ms: 0,
            download_timeout_secs: 5,
            ..ArchiveConfig::default()
        };
        (archive, PathsConfig::under(&dir), dir)
    }

    async fn mount_document(server: &MockServer, doc_path: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(doc_path.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_attachment(server: &MockServer, expected_hits: u64) {
        Mock::given(method("GET"))
            .and(path("/readingroom/docs/CIA-RDP79T00975A000100010001-1.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .expect(expected_hits)
            .mount(server)
            .await;
    }

    #[test]
    fn long_non_ascii_titles_still_fit_a_file_name() {
        let title = "ソ連の核ミサイル配備に関する週次報告".repeat(20);
        let slug = title_slug(&title);
        assert!(slug.len() <= MAX_TITLE_SLUG_BYTES);
        assert!(title.starts_with(&slug));

        let doc_id = DocIdResolver::from_config(&ArchiveConfig::default())
            .unwrap()
            .resolve(
                "https://www.cia.gov/readingroom/document/06753812",
                &Default::default(),
                &title,
            );
        let name = attachment_file_name(
            &slug,
            &doc_id.value,
            11,
            12,
            "https://www.cia.gov/readingroom/docs/x.pdf",
        );
        assert!(name.len() <= 255, "{} bytes", name.len());
        assert!(name.ends_with("_12.pdf"));
    }

    #[tokio::test]
    async fn harvest_downloads_and_records() {
        let server = MockServer::start().await;
        mount_document(&server, DOC_PATH, fixture("document.html")).await;
        mount_attachment(&server, 1).await;

        let (archive, paths, dir) = setup(&server);
        let mut harvester = Harvester::open(&archive, &paths).unwrap();
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}{DOC_PATH}", server.uri());

        let outcome = harvester.harvest(&mut driver, &url).await.unwrap();
        let HarvestOutcome::Harvested { record, doc_id } = outcome else {
            panic!("expected a harvested record");
        };

        assert_eq!(doc_id.source, DocIdSource::MatchedByUrl);
        assert_eq!(record.title, "Central Intelligence Bulletin");
        assert_eq!(
            record.metadata.get("Publication Date").map(String::as_str),
            Some("March 4, 1962")
        );
        assert!(record.downloaded);
        assert_eq!(record.downloaded_files.len(), 1);
        assert!(record.downloaded_files[0].ends_with(
            "Central_Intelligence_Bulletin_CIA-RDP79T00975A000100010001-1.pdf"
        ));
        for file in &record.downloaded_files {
            assert!(std::path::Path::new(file).exists());
        }

        assert!(harvester.visited().contains(&url));
        let snapshot = SnapshotStore::new(paths.metadata_dir())
            .read("CIA-RDP79T00975A000100010001-1")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot, record);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn second_run_over_visited_urls_is_a_no_op() {
        let server = MockServer::start().await;
        mount_document(&server, DOC_PATH, fixture("document.html")).await;
        mount_attachment(&server, 1).await;

        let (archive, paths, dir) = setup(&server);
        let url = format!("{}{DOC_PATH}", server.uri());
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();

        let mut first = Harvester::open(&archive, &paths).unwrap();
        first.harvest(&mut driver, &url).await.unwrap();
        let log_before = std::fs::read_to_string(paths.status_log()).unwrap();

        let mut second = Harvester::open(&archive, &paths).unwrap();
        let outcome = second.harvest(&mut driver, &url).await.unwrap();

        assert!(matches!(outcome, HarvestOutcome::AlreadyVisited));
        assert_eq!(second.stats().files_downloaded, 0);
        assert_eq!(std::fs::read_to_string(paths.status_log()).unwrap(), log_before);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unavailable_page_is_skip_listed_without_record() {
        let server = MockServer::start().await;
        mount_document(&server, "/readingroom/document/0000001", fixture("unavailable.html"))
            .await;

        let (archive, paths, dir) = setup(&server);
        let url = format!("{}/readingroom/document/0000001", server.uri());
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
        let mut harvester = Harvester::open(&archive, &paths).unwrap();

        let outcome = harvester.harvest(&mut driver, &url).await.unwrap();
        assert!(matches!(outcome, HarvestOutcome::MarkedUnavailable));
        assert!(!paths.status_log().exists());

        let mut reopened = Harvester::open(&archive, &paths).unwrap();
        assert!(reopened.unavailable().contains(&url));
        assert!(!reopened.visited().contains(&url));

        let outcome = reopened.harvest(&mut driver, &url).await.unwrap();
        assert!(matches!(outcome, HarvestOutcome::KnownUnavailable));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn colliding_doc_ids_overwrite_the_snapshot() {
        let server = MockServer::start().await;
        let page = |doc: &str| {
            format!(
                r#"<html><head><title>Daily Brief</title></head><body>
                <div class="field"><div class="field-label">Document Type:</div>
                <div class="field-item">{doc}</div></div></body></html>"#
            )
        };
        mount_document(&server, "/readingroom/document/0000101", page("first")).await;
        mount_document(&server, "/readingroom/document/0000102", page("second")).await;

        let (archive, paths, dir) = setup(&server);
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
        let mut harvester = Harvester::open(&archive, &paths).unwrap();

        for id in ["0000101", "0000102"] {
            let url = format!("{}/readingroom/document/{id}", server.uri());
            let outcome = harvester.harvest(&mut driver, &url).await.unwrap();
            let HarvestOutcome::Harvested { doc_id, record } = outcome else {
                panic!("expected a harvested record");
            };
            assert_eq!(doc_id.source, DocIdSource::FallbackSlug);
            assert_eq!(doc_id.value, "Daily_Brief");
            assert!(!record.downloaded);
        }

        let snapshots = SnapshotStore::new(paths.metadata_dir());
        assert_eq!(snapshots.list().unwrap(), vec!["Daily_Brief"]);
        let kept = snapshots.read("Daily_Brief").unwrap().unwrap();
        assert!(kept.url.ends_with("0000102"));
        assert_eq!(kept.metadata.get("Document Type").map(String::as_str), Some("second"));

        let lines = std::fs::read_to_string(paths.status_log()).unwrap();
        assert_eq!(lines.lines().count(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn button_only_download_is_counted() {
        let server = MockServer::start().await;
        mount_document(
            &server,
            "/readingroom/document/0000201",
            r#"<html><head><title>Scanned Cable</title></head><body>
               <form><button type="submit">Download PDF</button>
               <input type="button" value="Print"></form></body></html>"#
                .to_string(),
        )
        .await;

        let (archive, paths, dir) = setup(&server);
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
        let mut harvester = Harvester::open(&archive, &paths).unwrap();
        let url = format!("{}/readingroom/document/0000201", server.uri());

        let outcome = harvester.harvest(&mut driver, &url).await.unwrap();
        let HarvestOutcome::Harvested { record, .. } = outcome else {
            panic!("expected a harvested record");
        };
        assert!(!record.downloaded);
        assert!(record.pdf_urls.is_empty());
        assert_eq!(harvester.stats().button_only, 1);
        assert!(harvester.visited().contains(&url));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_attachment_still_marks_visited() {
        let server = MockServer::start().await;
        mount_document(&server, DOC_PATH, fixture("document.html")).await;
        Mock::given(method("GET"))
            .and(path("/readingroom/docs/CIA-RDP79T00975A000100010001-1.pdf"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (archive, paths, dir) = setup(&server);
        let url = format!("{}{DOC_PATH}", server.uri());
        let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
        let mut harvester = Harvester::open(&archive, &paths).unwrap();

        let outcome = harvester.harvest(&mut driver, &url).await.unwrap();
        let HarvestOutcome::Harvested { record, .. } = outcome else {
            panic!("expected a harvested record");
        };
        assert!(!record.downloaded);
        assert!(record.downloaded_files.is_empty());
        assert_eq!(record.pdf_urls.len(), 1);
        assert_eq!(harvester.stats().files_failed, 1);
        assert!(harvester.visited().contains(&url));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn navigation_failure_leaves_url_unvisited() {
        let server = MockServer::start().await;
        let (archive, paths, dir) = setup(&server);
        let mut driver = HttpDriver::new(Duration::from_secs(2)).unwrap();
        let mut harvester = Harvester::open(&archive, &paths).unwrap();

        let url = "http://127.0.0.1:9/readingroom/document/unreachable";
        let outcome = harvester.harvest(&mut driver, url).await.unwrap();

        assert!(matches!(outcome, HarvestOutcome::Failed { .. }));
        assert!(!harvester.visited().contains(url));
        assert!(!paths.status_log().exists());
        assert_eq!(harvester.stats().failed, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
