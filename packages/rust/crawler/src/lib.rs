//! Archive crawling: listing walk, document harvest and the page-driver seam.
//!
//! This crate provides:
//! - [`adapters`]: the [`PageDriver`] capability and the HTTP adapter
//! - [`frontier`]: the `(year, page)` listing walker
//! - [`harvester`]: per-document metadata, attachments and records
//! - [`doc_id`], [`attachments`], [`listing`]: the pieces both of them share

pub mod adapters;
pub mod attachments;
pub mod doc_id;
pub mod frontier;
pub mod harvester;
pub mod listing;

pub use adapters::{HttpDriver, Link, PageDriver};
pub use attachments::{AttachmentPolicy, DownloadStatus, Downloader, attachment_file_name};
pub use doc_id::{DocId, DocIdResolver, DocIdSource, slugify, truncate_utf8};
pub use frontier::{
    DocumentSink, EndOfYear, FrontierWalker, ListingState, StopReason, WalkOptions, WalkStart,
    WalkSummary, classify,
};
pub use harvester::{HarvestOutcome, HarvestStats, Harvester};
pub use listing::{parse_resume_url, search_url};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use archivist_shared::{ArchiveConfig, Cursor, PathsConfig, SilentProgress};
    use archivist_storage::{CursorStore, StatusLog};
    use scraper::Html;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    // -----------------------------------------------------------------------
    // Fixture sanity
    // -----------------------------------------------------------------------

    #[test]
    fn listing_fixture_matches_default_selector() {
        let doc = Html::parse_document(&load_fixture("listing.html"));
        let base = url::Url::parse("https://www.cia.gov/readingroom/search/site?page=0").unwrap();
        let links =
            adapters::select_links(&doc, &base, &ArchiveConfig::default().listing_selector)
                .unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn document_fixture_fields_and_attachment() {
        let doc = Html::parse_document(&load_fixture("document.html"));
        let base = url::Url::parse("https://www.cia.gov/readingroom/document/x").unwrap();

        let fields = adapters::field_map(&doc);
        assert_eq!(
            fields.get("Document Number (FOIA) /ESDN (CREST)").map(String::as_str),
            Some("CIA-RDP79T00975A000100010001-1")
        );
        assert_eq!(fields.get("Document Type").map(String::as_str), Some("CREST"));

        let links = adapters::select_links(&doc, &base, "a[href]").unwrap();
        let policy = AttachmentPolicy::from_config(&ArchiveConfig::default());
        assert_eq!(
            policy.select(&links),
            vec!["https://www.cia.gov/readingroom/docs/CIA-RDP79T00975A000100010001-1.pdf"]
        );
    }

    // -----------------------------------------------------------------------
    // Walk + harvest
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn walk_feeds_harvester_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/readingroom/search/site"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("listing.html")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readingroom/search/site"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("root.html")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readingroom/document/CIA-RDP79T00975A000100010001-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("document.html")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readingroom/document/06753812"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(load_fixture("unavailable.html")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readingroom/docs/CIA-RDP79T00975A000100010001-1.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("archivist-e2e-{}", uuid::Uuid::now_v7()));
        let paths = PathsConfig::under(&dir);
        let archive = ArchiveConfig {
            base_url: server.uri(),
            settle_delay_ms: 0,
            redirect_poll_window_ms: 5,
            redirect_poll_step_ms: 1,
            ..ArchiveConfig::default()
        };
        let options = WalkOptions {
            max_pages: None,
            end_year: Some(2012),
        };

        // The second pass re-lists page 0 explicitly; everything on it is already handled.
        let starts = [
            WalkStart::Year(2012),
            WalkStart::Url(search_url(&archive, Cursor::new(2012, 0))),
        ];
        for start in starts {
            let mut driver = HttpDriver::new(Duration::from_secs(5)).unwrap();
            let mut harvester = Harvester::open(&archive, &paths).unwrap();
            let mut walker = FrontierWalker::new(
                archive.clone(),
                CursorStore::load(paths.cursor_file()).unwrap(),
            );
            walker
                .walk(
                    &mut driver,
                    &mut harvester,
                    start,
                    &options,
                    &SilentProgress,
                )
                .await
                .unwrap();
        }

        let records = StatusLog::new(paths.status_log()).read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].downloaded);

        let harvester = Harvester::open(&archive, &paths).unwrap();
        assert_eq!(harvester.visited().len(), 1);
        assert_eq!(harvester.unavailable().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
