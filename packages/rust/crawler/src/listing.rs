//! Listing URL construction and recognition.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use archivist_shared::{ArchiveConfig, Cursor};

static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page=(\d+)").expect("valid regex"));

static YEAR_FACET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-01-01T00").expect("valid regex"));

/// Listing URL for `cursor`: the search page filtered to documents created
/// within the cursor's calendar year.
pub fn search_url(archive: &ArchiveConfig, cursor: Cursor) -> String {
    let search = archive.search_url();
    let search = search.trim_end_matches('/');
    let (year, next) = (cursor.year, cursor.year + 1);
    format!(
        "{search}?page={page}\
         &f%5B0%5D=ds_created%3A%5B{year}-01-01T00%3A00%3A00Z\
         %20TO%20{next}-01-01T00%3A00%3A00Z%5D",
        page = cursor.page,
    )
}

/// Infer the cursor a listing URL points at.
///
/// Page defaults to 0 and year to `default_year` when the URL carries none.
pub fn parse_resume_url(url: &str, default_year: i32) -> Cursor {
    let page = PAGE_PARAM
        .captures(url)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let year = YEAR_FACET
        .captures(url)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(default_year);
    Cursor::new(year, page)
}

/// True when `url` is still under the archive's search path.
pub fn is_search_url(archive: &ArchiveConfig, url: &str) -> bool {
    let search_path = archive.search_path.trim_end_matches('/');
    match Url::parse(url) {
        Ok(parsed) => parsed.path().starts_with(search_path),
        Err(_) => url.contains(search_path),
    }
}

/// True when `url` is the archive's landing page.
pub fn is_root_url(archive: &ArchiveConfig, url: &str) -> bool {
    let root_path = archive.root_path.trim_end_matches('/');
    match Url::parse(url) {
        Ok(parsed) => parsed.path().trim_end_matches('/') == root_path,
        Err(_) => url.trim_end_matches('/').ends_with(root_path),
    }
}

/// True when the page body carries the dead-page marker (case-insensitive).
pub fn flags_unavailable(archive: &ArchiveConfig, body: &str) -> bool {
    body.to_lowercase()
        .contains(&archive.unavailable_marker.to_lowercase())
}

/// True when `href` points at a document page.
pub fn is_document_url(archive: &ArchiveConfig, href: &str) -> bool {
    href.starts_with(&archive.document_prefix()) && !is_search_url(archive, href)
}
