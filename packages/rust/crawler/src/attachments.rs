//! Attachment candidate selection and idempotent downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use archivist_shared::{ArchiveConfig, ArchivistError, Result};

use crate::adapters::{Link, USER_AGENT};

/// Which anchors on a document page count as attachments.
///
/// A link qualifies when any rule matches: href suffix, href path segment,
/// or anchor text. All comparisons are case-insensitive.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    suffix: String,
    path_segment: String,
    anchor_text: String,
}

impl AttachmentPolicy {
    pub fn from_config(archive: &ArchiveConfig) -> Self {
        Self {
            suffix: archive.attachment_suffix.to_lowercase(),
            path_segment: archive.attachment_path_segment.to_lowercase(),
            anchor_text: archive.attachment_anchor_text.to_lowercase(),
        }
    }

    pub fn matches(&self, link: &Link) -> bool {
        let href = link.href.to_lowercase();
        (!self.suffix.is_empty() && href.ends_with(&self.suffix))
            || (!self.path_segment.is_empty() && href.contains(&self.path_segment))
            || (!self.anchor_text.is_empty() && link.text.to_lowercase().contains(&self.anchor_text))
    }

    /// Button labels that look like a download control. A plain page fetch
    /// cannot follow these, so they are only reported.
    pub fn download_buttons(&self, labels: Vec<String>) -> Vec<String> {
        labels
            .into_iter()
            .filter(|label| {
                let label = label.to_lowercase();
                label.contains("download")
                    || (!self.anchor_text.is_empty() && label.contains(&self.anchor_text))
            })
            .collect()
    }

    /// Candidate URLs in page order, without duplicates.
    pub fn select(&self, links: &[Link]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for link in links.iter().filter(|l| self.matches(l)) {
            if !out.contains(&link.href) {
                out.push(link.href.clone());
            }
        }
        out
    }
}

/// Local file name for attachment `index` (0-based) of `total`.
///
/// `{title_slug}_{doc_id}[_{n}].{ext}` where `n` is 1-based and only present
/// when the page has more than one attachment.
pub fn attachment_file_name(
    title_slug: &str,
    doc_id: &str,
    index: usize,
    total: usize,
    url: &str,
) -> String {
    let suffix = if total > 1 {
        format!("_{}", index + 1)
    } else {
        String::new()
    };
    format!("{title_slug}_{doc_id}{suffix}.{}", extension_of(url))
}

/// File extension from the URL path, lowercase. Defaults to `pdf`.
fn extension_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            let last = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let valid = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| "pdf".to_string())
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

/// What [`Downloader::fetch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Destination already existed; nothing was requested.
    AlreadyPresent,
    /// Fetched and written this many bytes.
    Fetched(usize),
}

/// Attachment HTTP client. Writes go to `{dest}.part` and are renamed into
/// place, so a file at `dest` is always complete.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ArchivistError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    #[instrument(skip_all, fields(url = %url, dest = %dest.display()))]
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<DownloadStatus> {
        if dest.exists() {
            debug!("already downloaded");
            return Ok(DownloadStatus::AlreadyPresent);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArchivistError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchivistError::Network(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchivistError::Network(format!("{url}: body read failed: {e}")))?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchivistError::io(parent, e))?;
        }
        let part = part_path(dest);
        std::fs::write(&part, &bytes).map_err(|e| ArchivistError::io(&part, e))?;
        std::fs::rename(&part, dest).map_err(|e| ArchivistError::io(dest, e))?;

        debug!(bytes = bytes.len(), "downloaded");
        Ok(DownloadStatus::Fetched(bytes.len()))
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}
