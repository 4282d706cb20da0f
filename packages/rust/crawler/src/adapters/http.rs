//! Plain-HTTP page driver built on `reqwest` + `scraper`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use tracing::debug;
use url::Url;

use archivist_shared::{ArchivistError, Result};

use super::{
    Link, PageDriver, USER_AGENT, button_labels, document_title, field_map, select_links,
};

struct LoadedPage {
    url: Url,
    body: String,
}

/// Driver that loads pages with a single GET, following redirects.
///
/// Any HTTP response counts as a loaded page, as it would in a browser; only
/// transport failures are errors. Markup is re-parsed per query because
/// `scraper::Html` cannot be held across an await.
pub struct HttpDriver {
    client: Client,
    page: Option<LoadedPage>,
}

impl HttpDriver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ArchivistError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, page: None })
    }

    fn parsed(&self) -> Option<(Html, &Url)> {
        self.page
            .as_ref()
            .map(|page| (Html::parse_document(&page.body), &page.url))
    }
}

#[async_trait]
impl PageDriver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArchivistError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ArchivistError::Network(format!("{url}: body read failed: {e}")))?;

        debug!(%url, final_url = %final_url, status = status.as_u16(), bytes = body.len(), "page loaded");
        self.page = Some(LoadedPage {
            url: final_url,
            body,
        });
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page
            .as_ref()
            .map(|page| page.url.to_string())
            .ok_or_else(|| ArchivistError::validation("no page loaded"))
    }

    fn title(&self) -> String {
        self.parsed()
            .map(|(doc, _)| document_title(&doc))
            .unwrap_or_default()
    }

    fn content(&self) -> &str {
        self.page.as_ref().map(|page| page.body.as_str()).unwrap_or("")
    }

    fn extract_links(&self, selector: &str) -> Result<Vec<Link>> {
        match self.parsed() {
            Some((doc, base)) => select_links(&doc, base, selector),
            None => Ok(Vec::new()),
        }
    }

    fn extract_fields(&self) -> BTreeMap<String, String> {
        self.parsed()
            .map(|(doc, _)| field_map(&doc))
            .unwrap_or_default()
    }

    fn extract_buttons(&self) -> Vec<String> {
        self.parsed()
            .map(|(doc, _)| button_labels(&doc))
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "http"
    }
}
