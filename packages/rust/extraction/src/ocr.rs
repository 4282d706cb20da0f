//! Optical recognition engines for the last extraction layer.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use archivist_shared::{ArchivistError, ExtractionConfig, OcrEngineKind, Result};

use crate::layers::run_tool;

/// Recognizes text in a rasterized page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognized text. May be empty when nothing legible was found.
    async fn recognize(&self, image: &Path) -> Result<String>;
}

/// Build the configured engine, or the other one when `alternate` is set.
pub fn engine_from_config(config: &ExtractionConfig, alternate: bool) -> Box<dyn OcrEngine> {
    let kind = match (config.ocr_engine, alternate) {
        (kind, false) => kind,
        (OcrEngineKind::Tesseract, true) => OcrEngineKind::Command,
        (OcrEngineKind::Command, true) => OcrEngineKind::Tesseract,
    };
    match kind {
        OcrEngineKind::Tesseract => Box::new(TesseractEngine::from_config(config)),
        OcrEngineKind::Command => Box::new(CommandEngine::from_config(config)),
    }
}

// ---------------------------------------------------------------------------
// Tesseract
// ---------------------------------------------------------------------------

/// External `tesseract` CLI, tried under each configured argument set.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    configs: Vec<String>,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, configs: Vec<String>) -> Self {
        Self {
            command: command.into(),
            configs,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(&config.tesseract_cmd, config.tesseract_configs.clone())
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &Path) -> Result<String> {
        let image_arg = image.to_string_lossy().into_owned();
        let mut last_error = None;

        for config in &self.configs {
            let mut args = vec![image_arg.as_str(), "stdout"];
            args.extend(config.split_whitespace());

            match run_tool(&self.command, &args).await {
                Ok(stdout) => {
                    let text = String::from_utf8_lossy(&stdout).into_owned();
                    if !text.trim().is_empty() {
                        return Ok(text);
                    }
                    debug!(config = %config, "tesseract returned no text");
                }
                Err(e) => {
                    debug!(config = %config, error = %e, "tesseract config failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            // Every config ran but nothing was legible.
            None => Ok(String::new()),
            Some(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A local recognizer invoked as a command. `{image}` in the argv is
/// replaced with the page image path; stdout is the recognized text.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    argv: Vec<String>,
}

impl CommandEngine {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.ocr_command.clone())
    }
}

#[async_trait]
impl OcrEngine for CommandEngine {
    fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("command")
    }

    async fn recognize(&self, image: &Path) -> Result<String> {
        let Some((program, rest)) = self.argv.split_first() else {
            return Err(ArchivistError::config("ocr_command is empty"));
        };
        let image_arg = image.to_string_lossy();
        let args: Vec<String> = rest
            .iter()
            .map(|arg| arg.replace("{image}", &image_arg))
            .collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let stdout = run_tool(program, &args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_flips_engine_kind() {
        let config = ExtractionConfig::default();
        assert_eq!(engine_from_config(&config, false).name(), "tesseract");
        assert_eq!(engine_from_config(&config, true).name(), "easyocr");

        let config = ExtractionConfig {
            ocr_engine: OcrEngineKind::Command,
            ..ExtractionConfig::default()
        };
        assert_eq!(engine_from_config(&config, true).name(), "tesseract");
    }

    #[tokio::test]
    async fn empty_command_is_a_config_error() {
        let engine = CommandEngine::new(Vec::new());
        let err = engine.recognize(Path::new("page.png")).await.unwrap_err();
        assert!(matches!(err, ArchivistError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_binary_surfaces_as_extraction_error() {
        let engine = TesseractEngine::new(
            "archivist-no-such-tesseract",
            vec!["--psm 6".into(), "--psm 3".into()],
        );
        let err = engine.recognize(Path::new("page.png")).await.unwrap_err();
        assert!(matches!(err, ArchivistError::Extraction(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_engine_substitutes_image_path() {
        let engine = CommandEngine::new(vec!["echo".into(), "read:{image}".into()]);
        let text = engine.recognize(Path::new("/tmp/page-3.png")).await.unwrap();
        assert_eq!(text.trim(), "read:/tmp/page-3.png");
    }
}
