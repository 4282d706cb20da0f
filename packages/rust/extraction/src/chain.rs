//! The per-page fallback chain and the document acceptance rule.

use std::path::Path;

use tracing::{debug, warn};

use crate::layers::PageSource;
use crate::ocr::OcrEngine;

const SENTINEL_PREFIX: &str = "[EXTRACTION FAILED: ";

/// Placeholder text for a page no layer could recover.
pub fn sentinel(cause: &str) -> String {
    format!("{SENTINEL_PREFIX}{cause}]")
}

pub fn is_sentinel(text: &str) -> bool {
    text.starts_with(SENTINEL_PREFIX)
}

/// Which layer produced a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Primary,
    Alternate,
    Blocks,
    Ocr,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Alternate => "alternate",
            Self::Blocks => "blocks",
            Self::Ocr => "ocr",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub text: String,
    /// `None` when the page is a sentinel.
    pub layer: Option<Layer>,
}

impl PageText {
    pub fn recovered(&self) -> bool {
        self.layer.is_some()
    }
}

// ---------------------------------------------------------------------------
// PageChain
// ---------------------------------------------------------------------------

/// Runs the four layers in order and keeps the first non-blank result.
pub struct PageChain<'a> {
    ocr: &'a dyn OcrEngine,
    upscale: f32,
}

impl<'a> PageChain<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, upscale: f32) -> Self {
        Self { ocr, upscale }
    }

    /// Text for one page. Never fails: exhaustion yields a sentinel page.
    /// Rendered images go into `scratch` and are removed after recognition.
    pub async fn page(&self, source: &dyn PageSource, page: usize, scratch: &Path) -> PageText {
        let mut last_error = None;

        match source.primary_text(page).await {
            Ok(text) if !text.trim().is_empty() => return found(text, Layer::Primary),
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }

        match source.alternate_text(page).await {
            Ok(text) if !text.trim().is_empty() => return found(text, Layer::Alternate),
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }

        match source.text_blocks(page).await {
            Ok(blocks) => {
                let text = blocks.join("\n");
                if !text.trim().is_empty() {
                    return found(text, Layer::Blocks);
                }
            }
            Err(e) => last_error = Some(e.to_string()),
        }

        match self.recognize(source, page, scratch).await {
            Ok(text) if !text.trim().is_empty() => return found(text, Layer::Ocr),
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }

        let cause = last_error.unwrap_or_else(|| "no text on any layer".to_string());
        warn!(page = page + 1, cause = %cause, "page not recovered");
        PageText {
            text: sentinel(&cause),
            layer: None,
        }
    }

    async fn recognize(
        &self,
        source: &dyn PageSource,
        page: usize,
        scratch: &Path,
    ) -> archivist_shared::Result<String> {
        let image = source.render(page, self.upscale, scratch).await?;
        let result = self.ocr.recognize(&image).await;
        if let Err(e) = std::fs::remove_file(&image) {
            debug!(image = %image.display(), error = %e, "could not remove page image");
        }
        result
    }

    /// Text for every page, in order.
    pub async fn document(&self, source: &dyn PageSource, scratch: &Path) -> DocumentText {
        let mut pages = Vec::with_capacity(source.page_count());
        for page in 0..source.page_count() {
            let text = self.page(source, page, scratch).await;
            if let Some(layer) = text.layer {
                debug!(page = page + 1, layer = layer.as_str(), "page recovered");
            }
            pages.push(text);
        }
        DocumentText { pages }
    }
}

fn found(text: String, layer: Layer) -> PageText {
    PageText {
        text,
        layer: Some(layer),
    }
}

// ---------------------------------------------------------------------------
// DocumentText / Acceptance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DocumentText {
    pub pages: Vec<PageText>,
}

impl DocumentText {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn recovered_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.recovered()).count()
    }

    /// Trimmed character count of the recovered text. Sentinels do not count.
    pub fn chars(&self) -> usize {
        let recovered: Vec<&str> = self
            .pages
            .iter()
            .filter(|p| p.recovered())
            .map(|p| p.text.as_str())
            .collect();
        recovered.join("\n\n").trim().chars().count()
    }

    /// All pages, sentinels included, separated by blank lines.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Whether a document recovered enough text to count as extracted.
#[derive(Debug, Clone, Copy)]
pub struct Acceptance {
    pub min_page_ratio: f64,
    pub min_chars: usize,
}

impl Acceptance {
    pub fn evaluate(&self, recovered_pages: usize, total_pages: usize, chars: usize) -> bool {
        if total_pages == 0 {
            return false;
        }
        let ratio = recovered_pages as f64 / total_pages as f64;
        ratio >= self.min_page_ratio || chars >= self.min_chars
    }

    pub fn accepts(&self, doc: &DocumentText) -> bool {
        self.evaluate(doc.recovered_pages(), doc.total_pages(), doc.chars())
    }
}
