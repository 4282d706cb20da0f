//! Application configuration for archivist.
//!
//! User config lives at `~/.archivist/archivist.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArchivistError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "archivist.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".archivist";

// ---------------------------------------------------------------------------
// Config structs (matching archivist.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote archive layout and crawl behaviour.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// On-disk layout of data and settings files.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Text extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Generative backend and chunking settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Scheme + host of the archive, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the paginated search listing.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Path of the archive's landing page (where dead searches redirect).
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Path prefix every document link must live under.
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Title (and body marker) of the landing page.
    #[serde(default = "default_root_title")]
    pub root_title: String,

    /// Case-insensitive body marker of a dead page.
    #[serde(default = "default_unavailable_marker")]
    pub unavailable_marker: String,

    /// CSS selector of document anchors on a listing page.
    #[serde(default = "default_listing_selector")]
    pub listing_selector: String,

    /// Year the walk starts from when no resume URL is given.
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last year to walk. `None` means the current UTC year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,

    /// Timeout for page navigation requests.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Timeout for attachment downloads.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Pause after loading a document page.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// How long to watch a listing navigation for a redirect to the root page.
    #[serde(default = "default_poll_window")]
    pub redirect_poll_window_ms: u64,

    /// Interval between redirect polls.
    #[serde(default = "default_poll_step")]
    pub redirect_poll_step_ms: u64,

    /// Fresh navigations attempted before a redirect is accepted as end-of-results.
    #[serde(default = "default_max_forced_reloads")]
    pub max_forced_reloads: u32,

    /// Regex whose first match in the URL (or metadata field) is the document id.
    #[serde(default = "default_doc_id_pattern")]
    pub doc_id_pattern: String,

    /// Metadata label searched for the document id when the URL has none.
    #[serde(default = "default_doc_id_field")]
    pub doc_id_metadata_field: String,

    /// Maximum length in bytes of the title slug used as a fallback document id.
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,

    /// Attachment links ending with this suffix are candidates.
    #[serde(default = "default_attachment_suffix")]
    pub attachment_suffix: String,

    /// Attachment links containing this path segment are candidates.
    #[serde(default = "default_attachment_segment")]
    pub attachment_path_segment: String,

    /// Attachment links whose anchor text contains this are candidates.
    #[serde(default = "default_attachment_text")]
    pub attachment_anchor_text: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            root_path: default_root_path(),
            document_path: default_document_path(),
            root_title: default_root_title(),
            unavailable_marker: default_unavailable_marker(),
            listing_selector: default_listing_selector(),
            start_year: default_start_year(),
            end_year: None,
            navigation_timeout_secs: default_navigation_timeout(),
            download_timeout_secs: default_download_timeout(),
            settle_delay_ms: default_settle_delay(),
            redirect_poll_window_ms: default_poll_window(),
            redirect_poll_step_ms: default_poll_step(),
            max_forced_reloads: default_max_forced_reloads(),
            doc_id_pattern: default_doc_id_pattern(),
            doc_id_metadata_field: default_doc_id_field(),
            slug_max_len: default_slug_max_len(),
            attachment_suffix: default_attachment_suffix(),
            attachment_path_segment: default_attachment_segment(),
            attachment_anchor_text: default_attachment_text(),
        }
    }
}

impl ArchiveConfig {
    /// Absolute URL of the search listing.
    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, self.search_path)
    }

    /// Absolute URL of the landing page.
    pub fn root_url(&self) -> String {
        format!("{}{}", self.base_url, self.root_path)
    }

    /// Absolute URL prefix of document pages.
    pub fn document_prefix(&self) -> String {
        format!("{}{}", self.base_url, self.document_path)
    }
}

fn default_base_url() -> String {
    "https://www.cia.gov".into()
}
fn default_search_path() -> String {
    "/readingroom/search/site/".into()
}
fn default_root_path() -> String {
    "/readingroom".into()
}
fn default_document_path() -> String {
    "/readingroom/".into()
}
fn default_root_title() -> String {
    "Freedom of Information Act Electronic Reading Room".into()
}
fn default_unavailable_marker() -> String {
    "unavailable".into()
}
fn default_listing_selector() -> String {
    "#block-system-main > div > ol > li h3 a".into()
}
fn default_start_year() -> i32 {
    2012
}
fn default_navigation_timeout() -> u64 {
    60
}
fn default_download_timeout() -> u64 {
    60
}
fn default_settle_delay() -> u64 {
    1500
}
fn default_poll_window() -> u64 {
    2000
}
fn default_poll_step() -> u64 {
    100
}
fn default_max_forced_reloads() -> u32 {
    3
}
fn default_doc_id_pattern() -> String {
    r"CIA-RDP\S+".into()
}
fn default_doc_id_field() -> String {
    "Document Number (FOIA) /ESDN (CREST)".into()
}
fn default_slug_max_len() -> usize {
    40
}
fn default_attachment_suffix() -> String {
    ".pdf".into()
}
fn default_attachment_segment() -> String {
    "/docs/".into()
}
fn default_attachment_text() -> String {
    "pdf".into()
}

/// `[paths]` section. Every file and directory the stages touch derives from these two roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for attachments, metadata snapshots, text and enriched output.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root for cursor, URL sets, status log and ledgers.
    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            settings_dir: default_settings_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_settings_dir() -> PathBuf {
    PathBuf::from("settings")
}

impl PathsConfig {
    /// Both roots under one base directory (used by tests and `--workdir`-style setups).
    pub fn under(base: &Path) -> Self {
        Self {
            data_dir: base.join("data"),
            settings_dir: base.join("settings"),
        }
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.data_dir.join("PDFs")
    }
    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }
    pub fn text_dir(&self) -> PathBuf {
        self.data_dir.join("OCR")
    }
    /// Text produced by an alternate engine, used by `extract compare`.
    pub fn compare_text_dir(&self) -> PathBuf {
        self.data_dir.join("OCR_alt")
    }
    pub fn enriched_dir(&self) -> PathBuf {
        self.data_dir.join("enriched")
    }
    pub fn visited_file(&self) -> PathBuf {
        self.settings_dir.join("visited_urls.json")
    }
    pub fn unavailable_file(&self) -> PathBuf {
        self.settings_dir.join("unavailables.json")
    }
    pub fn status_log(&self) -> PathBuf {
        self.settings_dir.join("download_status.jsonl")
    }
    pub fn cursor_file(&self) -> PathBuf {
        self.settings_dir.join("scrape_progress.json")
    }
    pub fn ocr_ledger(&self) -> PathBuf {
        self.settings_dir.join("ocr_progress.json")
    }
    /// Ledger of the alternate-engine extraction run (`extract --alternate`).
    pub fn compare_ocr_ledger(&self) -> PathBuf {
        self.settings_dir.join("ocr_alt_progress.json")
    }
    pub fn enrichment_ledger(&self) -> PathBuf {
        self.settings_dir.join("enrichment_progress.json")
    }

    /// Create every directory the stages write into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.settings_dir.clone(),
            self.pdf_dir(),
            self.metadata_dir(),
            self.text_dir(),
            self.enriched_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ArchivistError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Which recognition engine runs the last extraction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineKind {
    /// External `tesseract` binary, tried under each configured segmentation mode.
    Tesseract,
    /// A local recognizer invoked as a command (`ocr_command`).
    Command,
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Rasterization scale relative to 72 DPI.
    #[serde(default = "default_upscale")]
    pub upscale: f32,

    /// Recognition engine for the last layer.
    #[serde(default = "default_ocr_engine")]
    pub ocr_engine: OcrEngineKind,

    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,

    /// Argument sets tried in order; the first non-empty result wins.
    #[serde(default = "default_tesseract_configs")]
    pub tesseract_configs: Vec<String>,

    /// argv of the local recognizer; `{image}` is replaced by the page image path.
    #[serde(default = "default_ocr_command")]
    pub ocr_command: Vec<String>,

    #[serde(default = "default_pdftotext_cmd")]
    pub pdftotext_cmd: String,

    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,

    /// Minimum share of recovered pages for a document to be accepted.
    #[serde(default = "default_min_page_ratio")]
    pub min_page_ratio: f64,

    /// Minimum trimmed character count for a document to be accepted.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            upscale: default_upscale(),
            ocr_engine: default_ocr_engine(),
            tesseract_cmd: default_tesseract_cmd(),
            tesseract_configs: default_tesseract_configs(),
            ocr_command: default_ocr_command(),
            pdftotext_cmd: default_pdftotext_cmd(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            min_page_ratio: default_min_page_ratio(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_upscale() -> f32 {
    3.0
}
fn default_ocr_engine() -> OcrEngineKind {
    OcrEngineKind::Tesseract
}
fn default_tesseract_cmd() -> String {
    "tesseract".into()
}
fn default_tesseract_configs() -> Vec<String> {
    vec![
        "--oem 3 --psm 6".into(),
        "--oem 3 --psm 3".into(),
        "--oem 1 --psm 6".into(),
        "--oem 3 --psm 1".into(),
    ]
}
fn default_ocr_command() -> Vec<String> {
    vec![
        "easyocr".into(),
        "-l".into(),
        "en".into(),
        "--detail".into(),
        "0".into(),
        "-f".into(),
        "{image}".into(),
    ]
}
fn default_pdftotext_cmd() -> String {
    "pdftotext".into()
}
fn default_pdftoppm_cmd() -> String {
    "pdftoppm".into()
}
fn default_min_page_ratio() -> f64 {
    0.10
}
fn default_min_chars() -> usize {
    100
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Base URL of the local generative backend.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Model name passed with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens generated per call.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    /// Bounded wait for one backend call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause between backend calls.
    #[serde(default = "default_call_delay")]
    pub call_delay_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            model: default_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            num_predict: default_num_predict(),
            request_timeout_secs: default_request_timeout(),
            call_delay_ms: default_call_delay(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "deepseek-coder:7b-instruct".into()
}
fn default_chunk_size() -> usize {
    4000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}
fn default_num_predict() -> u32 {
    2048
}
fn default_request_timeout() -> u64 {
    120
}
fn default_call_delay() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject combinations the stages cannot run with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.enrichment;
        if e.chunk_size == 0 {
            return Err(ArchivistError::config("enrichment.chunk_size must be positive"));
        }
        if e.chunk_overlap >= e.chunk_size {
            return Err(ArchivistError::config(format!(
                "enrichment.chunk_overlap ({}) must be smaller than chunk_size ({})",
                e.chunk_overlap, e.chunk_size
            )));
        }

        let x = &self.extraction;
        if !(0.0..=1.0).contains(&x.min_page_ratio) {
            return Err(ArchivistError::config(
                "extraction.min_page_ratio must be within [0, 1]",
            ));
        }
        if x.ocr_engine == OcrEngineKind::Tesseract && x.tesseract_configs.is_empty() {
            return Err(ArchivistError::config(
                "extraction.tesseract_configs must list at least one configuration",
            ));
        }
        if x.ocr_engine == OcrEngineKind::Command && x.ocr_command.is_empty() {
            return Err(ArchivistError::config("extraction.ocr_command is empty"));
        }

        if self.archive.max_forced_reloads == 0 {
            return Err(ArchivistError::config(
                "archive.max_forced_reloads must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.archivist/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArchivistError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.archivist/archivist.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ArchivistError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ArchivistError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ArchivistError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArchivistError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ArchivistError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("search_path"));
        assert!(toml_str.contains("chunk_overlap"));
        assert!(toml_str.contains("tesseract_configs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.archive.start_year, 2012);
        assert_eq!(parsed.archive.max_forced_reloads, 3);
        assert_eq!(parsed.extraction.ocr_engine, OcrEngineKind::Tesseract);
        assert_eq!(parsed.enrichment.chunk_size, 4000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[archive]
start_year = 1999
end_year = 2001

[extraction]
ocr_engine = "command"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.archive.start_year, 1999);
        assert_eq!(config.archive.end_year, Some(2001));
        assert_eq!(config.archive.root_title, default_root_title());
        assert_eq!(config.extraction.ocr_engine, OcrEngineKind::Command);
        assert_eq!(config.extraction.min_chars, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let mut config = AppConfig::default();
        config.enrichment.chunk_overlap = config.enrichment.chunk_size;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_reloads_rejected() {
        let mut config = AppConfig::default();
        config.archive.max_forced_reloads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_urls_and_paths() {
        let archive = ArchiveConfig::default();
        assert_eq!(
            archive.search_url(),
            "https://www.cia.gov/readingroom/search/site/"
        );
        assert_eq!(archive.root_url(), "https://www.cia.gov/readingroom");
        assert_eq!(archive.document_prefix(), "https://www.cia.gov/readingroom/");

        let paths = PathsConfig::under(Path::new("/srv/archive"));
        assert_eq!(paths.pdf_dir(), PathBuf::from("/srv/archive/data/PDFs"));
        assert_eq!(
            paths.cursor_file(),
            PathBuf::from("/srv/archive/settings/scrape_progress.json")
        );
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("archivist-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("archivist.toml");
        std::fs::write(&path, "[enrichment]\nchunk_size = 100\nchunk_overlap = 150\n").unwrap();

        let result = load_config_from(&path);
        assert!(result.is_err());

        std::fs::write(&path, "[enrichment]\nchunk_size = 100\nchunk_overlap = 10\n").unwrap();
        let config = load_config_from(&path).expect("valid config");
        assert_eq!(config.enrichment.chunk_size, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn init_config_at_writes_loadable_defaults() {
        let dir = std::env::temp_dir().join(format!("archivist-init-{}", std::process::id()));
        let path = dir.join("nested").join("archivist.toml");

        init_config_at(&path).expect("write defaults");
        let config = load_config_from(&path).expect("load defaults");
        assert_eq!(config.archive.start_year, 2012);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
