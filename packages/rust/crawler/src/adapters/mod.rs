//! Page-driver capability and its adapters.
//!
//! The walker and harvester only ever talk to a [`PageDriver`]; which engine
//! actually loads pages (plain HTTP, a headless browser, a recorded fixture)
//! is decided by the caller.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use archivist_shared::{ArchivistError, Result};

pub use http::HttpDriver;

/// User-Agent string for archive requests.
pub(crate) const USER_AGENT: &str = concat!("Archivist/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An anchor found on the loaded page, with its href resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    /// Visible anchor text, whitespace-trimmed.
    pub text: String,
}

/// Capability interface over a page-automation engine.
///
/// A driver holds at most one loaded page. Query methods read that page and
/// return empty values when nothing has been loaded yet.
#[async_trait]
pub trait PageDriver: Send {
    /// Load `url`, following redirects the way the engine normally would.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// URL the engine currently shows. May differ from the last `navigate`
    /// target after redirects.
    async fn current_url(&mut self) -> Result<String>;

    /// Document title of the loaded page.
    fn title(&self) -> String;

    /// Raw markup of the loaded page.
    fn content(&self) -> &str;

    /// Anchors matching `selector`, in document order.
    fn extract_links(&self, selector: &str) -> Result<Vec<Link>>;

    /// Label → value pairs from the page's `div.field` markup.
    fn extract_fields(&self) -> BTreeMap<String, String>;

    /// Visible labels of buttons and submit inputs, in document order.
    fn extract_buttons(&self) -> Vec<String>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Shared markup helpers
// ---------------------------------------------------------------------------

/// `<title>` text of a document, trimmed.
pub(crate) fn document_title(doc: &Html) -> String {
    let sel = Selector::parse("title").expect("valid selector");
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Anchors under `selector`, resolved against `base`. Anchors without an
/// href or with an unresolvable one are dropped.
pub(crate) fn select_links(doc: &Html, base: &Url, selector: &str) -> Result<Vec<Link>> {
    let sel = Selector::parse(selector)
        .map_err(|e| ArchivistError::parse(format!("invalid selector {selector:?}: {e}")))?;

    let mut links = Vec::new();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        links.push(Link {
            href: resolved.to_string(),
            text: collapse_whitespace(&el.text().collect::<String>()),
        });
    }
    Ok(links)
}

/// `div.field` rows as label → value. The first `:` of a label is removed.
pub(crate) fn field_map(doc: &Html) -> BTreeMap<String, String> {
    let row_sel = Selector::parse("div.field").expect("valid selector");
    let label_sel = Selector::parse(".field-label").expect("valid selector");
    let item_sel = Selector::parse(".field-item").expect("valid selector");

    let mut fields = BTreeMap::new();
    for row in doc.select(&row_sel) {
        let (Some(label), Some(value)) =
            (row.select(&label_sel).next(), row.select(&item_sel).next())
        else {
            continue;
        };
        let label = collapse_whitespace(&label.text().collect::<String>()).replacen(':', "", 1);
        let value = collapse_whitespace(&value.text().collect::<String>());
        fields.insert(label.trim().to_string(), value);
    }
    fields
}

/// Labels of `<button>` elements and button-like `<input>`s. Blank labels are skipped.
pub(crate) fn button_labels(doc: &Html) -> Vec<String> {
    let sel = Selector::parse(r#"button, input[type="submit"], input[type="button"]"#)
        .expect("valid selector");
    doc.select(&sel)
        .filter_map(|el| {
            let label = match el.value().name() {
                "input" => el.value().attr("value").unwrap_or_default().to_string(),
                _ => el.text().collect::<String>(),
            };
            let label = collapse_whitespace(&label);
            (!label.is_empty()).then_some(label)
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
