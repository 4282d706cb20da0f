//! Generative text backend: a local Ollama-compatible HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use archivist_shared::{ArchivistError, EnrichmentConfig, Result};

const USER_AGENT: &str = concat!("Archivist/", env!("CARGO_PKG_VERSION"));

/// Decoding options sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl GenerateOptions {
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            num_predict: config.num_predict,
        }
    }
}

/// `generate(prompt, options) -> text`.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for `/api/generate` and `/api/tags`.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ArchivistError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ArchivistError::Enrichment(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ArchivistError::Enrichment(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ArchivistError::Enrichment(format!("{url}: invalid tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Fail unless the configured model is installed.
    pub async fn check_model(&self) -> Result<()> {
        let models = self.list_models().await?;
        if models.iter().any(|m| m == &self.model) {
            info!(model = %self.model, "model available");
            return Ok(());
        }
        let available = if models.is_empty() {
            "none".to_string()
        } else {
            models.join(", ")
        };
        Err(ArchivistError::Enrichment(format!(
            "model {} is not installed (available: {available}); run `ollama pull {}`",
            self.model, self.model
        )))
    }
}

#[async_trait]
impl GenerativeBackend for OllamaBackend {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ArchivistError::Enrichment(format!("{url}: request timed out"))
                } else {
                    ArchivistError::Enrichment(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchivistError::Enrichment(format!(
                "{url}: HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ArchivistError::Enrichment(format!("{url}: invalid response: {e}")))?;
        debug!(chars = body.response.len(), "generation finished");
        Ok(body.response.trim().to_string())
    }
}
