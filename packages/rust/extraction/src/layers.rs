//! Per-page text layers of a PDF.
//!
//! A [`PageSource`] exposes the four ways a page can yield text, cheapest
//! first. [`PdfDocument`] implements them with `lopdf` for the in-process
//! layers and Poppler's `pdftotext` / `pdftoppm` for the rest.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use tokio::process::Command;
use tracing::debug;

use archivist_shared::{ArchivistError, ExtractionConfig, Result};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An opened multi-page document. Pages are 0-based.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Primary text layer.
    async fn primary_text(&self, page: usize) -> Result<String>;

    /// Alternate text-layer decoder.
    async fn alternate_text(&self, page: usize) -> Result<String>;

    /// Text blocks in content-stream order.
    async fn text_blocks(&self, page: usize) -> Result<Vec<String>>;

    /// Rasterize the page at `72 * scale` DPI into `dir`, returning the image path.
    async fn render(&self, page: usize, scale: f32, dir: &Path) -> Result<PathBuf>;
}

/// Opens a file as a [`PageSource`].
#[async_trait]
pub trait DocumentOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn PageSource>>;
}

// ---------------------------------------------------------------------------
// PdfOpener / PdfDocument
// ---------------------------------------------------------------------------

/// Opens PDFs with `lopdf`, shelling out to Poppler for the external layers.
#[derive(Debug, Clone)]
pub struct PdfOpener {
    pdftotext: String,
    pdftoppm: String,
}

impl PdfOpener {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            pdftotext: config.pdftotext_cmd.clone(),
            pdftoppm: config.pdftoppm_cmd.clone(),
        }
    }
}

#[async_trait]
impl DocumentOpener for PdfOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn PageSource>> {
        let doc = Document::load(path)
            .map_err(|e| ArchivistError::Extraction(format!("{}: {e}", path.display())))?;
        let pages: Vec<(u32, lopdf::ObjectId)> = doc.get_pages().into_iter().collect();
        debug!(path = %path.display(), pages = pages.len(), "pdf opened");

        Ok(Box::new(PdfDocument {
            path: path.to_path_buf(),
            doc,
            pages,
            pdftotext: self.pdftotext.clone(),
            pdftoppm: self.pdftoppm.clone(),
        }))
    }
}

/// A loaded PDF.
pub struct PdfDocument {
    path: PathBuf,
    doc: Document,
    /// `(page number, object id)` in page order.
    pages: Vec<(u32, lopdf::ObjectId)>,
    pdftotext: String,
    pdftoppm: String,
}

impl PdfDocument {
    fn page(&self, page: usize) -> Result<(u32, lopdf::ObjectId)> {
        self.pages.get(page).copied().ok_or_else(|| {
            ArchivistError::Extraction(format!(
                "{}: page {} out of range ({} pages)",
                self.path.display(),
                page + 1,
                self.pages.len()
            ))
        })
    }
}

#[async_trait]
impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn primary_text(&self, page: usize) -> Result<String> {
        let (number, _) = self.page(page)?;
        self.doc
            .extract_text(&[number])
            .map_err(|e| ArchivistError::Extraction(format!("text layer: {e}")))
    }

    async fn alternate_text(&self, page: usize) -> Result<String> {
        let (number, _) = self.page(page)?;
        let n = number.to_string();
        let path = self.path.to_string_lossy().into_owned();
        let stdout = run_tool(
            &self.pdftotext,
            &["-q", "-layout", "-f", &n, "-l", &n, &path, "-"],
        )
        .await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn text_blocks(&self, page: usize) -> Result<Vec<String>> {
        let (_, id) = self.page(page)?;
        let raw = self
            .doc
            .get_page_content(id)
            .map_err(|e| ArchivistError::Extraction(format!("page content: {e}")))?;
        let content = Content::decode(&raw)
            .map_err(|e| ArchivistError::Extraction(format!("content stream: {e}")))?;
        Ok(blocks_from_operations(&content.operations))
    }

    async fn render(&self, page: usize, scale: f32, dir: &Path) -> Result<PathBuf> {
        let (number, _) = self.page(page)?;
        let n = number.to_string();
        let dpi = ((72.0 * scale).round() as u32).max(1).to_string();
        let prefix = dir.join(format!("page-{number}"));
        let prefix_arg = prefix.to_string_lossy().into_owned();
        let path = self.path.to_string_lossy().into_owned();

        run_tool(
            &self.pdftoppm,
            &[
                "-f", &n, "-l", &n, "-r", &dpi, "-png", "-singlefile", &path, &prefix_arg,
            ],
        )
        .await?;

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(ArchivistError::Extraction(format!(
                "{} produced no image for page {number}",
                self.pdftoppm
            )));
        }
        Ok(image)
    }
}

// ---------------------------------------------------------------------------
// Block reassembly
// ---------------------------------------------------------------------------

/// Kerning offsets wider than this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Reassemble `BT … ET` text objects into blocks, in stream order.
pub fn blocks_from_operations(operations: &[Operation]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for op in operations {
        match op.operator.as_str() {
            "BT" => current = Some(String::new()),
            "ET" => {
                if let Some(block) = current.take() {
                    let block = block.trim().to_string();
                    if !block.is_empty() {
                        blocks.push(block);
                    }
                }
            }
            _ => {
                if let Some(block) = current.as_mut() {
                    apply_text_op(block, op);
                }
            }
        }
    }
    blocks
}

fn apply_text_op(block: &mut String, op: &Operation) {
    match op.operator.as_str() {
        "Tj" => {
            if let Some(Object::String(bytes, _)) = op.operands.last() {
                block.push_str(&decode_pdf_string(bytes));
            }
        }
        "'" | "\"" => {
            line_break(block);
            if let Some(Object::String(bytes, _)) = op.operands.last() {
                block.push_str(&decode_pdf_string(bytes));
            }
        }
        "TJ" => {
            let Some(Object::Array(items)) = op.operands.first() else {
                return;
            };
            for item in items {
                match item {
                    Object::String(bytes, _) => block.push_str(&decode_pdf_string(bytes)),
                    Object::Integer(n) if -(*n as f32) > TJ_SPACE_THRESHOLD => push_space(block),
                    Object::Real(n) if -*n > TJ_SPACE_THRESHOLD => push_space(block),
                    _ => {}
                }
            }
        }
        "T*" => line_break(block),
        "Td" | "TD" => {
            let dy = op.operands.get(1).and_then(number).unwrap_or(0.0);
            if dy != 0.0 {
                line_break(block);
            } else {
                push_space(block);
            }
        }
        _ => {}
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(n) => Some(*n),
        _ => None,
    }
}

fn line_break(block: &mut String) {
    if !block.is_empty() && !block.ends_with('\n') {
        block.push('\n');
    }
}

fn push_space(block: &mut String) {
    if !block.is_empty() && !block.ends_with([' ', '\n']) {
        block.push(' ');
    }
}

/// PDF string bytes to text: UTF-16BE when BOM-prefixed, else Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// External tools
// ---------------------------------------------------------------------------

/// Run an external tool and return its stdout. Non-zero exit is an error.
pub(crate) async fn run_tool(program: &str, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ArchivistError::Extraction(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArchivistError::Extraction(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    #[test]
    fn blocks_follow_stream_order() {
        let ops = vec![
            op("BT", vec![]),
            op("Td", vec![72.into(), 700.into()]),
            op("Tj", vec![Object::string_literal("MEMORANDUM FOR")]),
            op("T*", vec![]),
            op("Tj", vec![Object::string_literal("THE DIRECTOR")]),
            op("ET", vec![]),
            op("Tj", vec![Object::string_literal("outside any block")]),
            op("BT", vec![]),
            op(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("SUB"),
                    Object::Integer(-20),
                    Object::string_literal("JECT:"),
                    Object::Integer(-400),
                    Object::string_literal("Cuba"),
                ])],
            ),
            op("ET", vec![]),
            op("BT", vec![]),
            op("ET", vec![]),
        ];

        assert_eq!(
            blocks_from_operations(&ops),
            vec!["MEMORANDUM FOR\nTHE DIRECTOR", "SUBJECT: Cuba"]
        );
    }

    #[test]
    fn quote_operators_start_new_lines() {
        let ops = vec![
            op("BT", vec![]),
            op("Tj", vec![Object::string_literal("first")]),
            op("'", vec![Object::string_literal("second")]),
            op(
                "\"",
                vec![0.into(), 0.into(), Object::string_literal("third")],
            ),
            op("Td", vec![10.into(), 0.into()]),
            op("Tj", vec![Object::string_literal("same line")]),
            op("ET", vec![]),
        ];
        assert_eq!(
            blocks_from_operations(&ops),
            vec!["first\nsecond\nthird same line"]
        );
    }

    #[test]
    fn decodes_utf16_and_latin1() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_pdf_string(b"caf\xe9"), "café");
    }

    fn write_sample_pdf(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("SECRET NOFORN")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[tokio::test]
    async fn opens_pdf_and_reads_blocks() {
        let dir = std::env::temp_dir().join(format!("archivist-pdf-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.pdf");
        write_sample_pdf(&path);

        let opener = PdfOpener::from_config(&ExtractionConfig::default());
        let source = opener.open(&path).await.unwrap();

        assert_eq!(source.page_count(), 1);
        assert_eq!(source.text_blocks(0).await.unwrap(), vec!["SECRET NOFORN"]);
        assert!(source.text_blocks(1).await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn garbage_file_is_an_extraction_error() {
        let dir = std::env::temp_dir().join(format!("archivist-badpdf-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.pdf");
        std::fs::write(&path, b"<html>not a pdf</html>").unwrap();

        let opener = PdfOpener::from_config(&ExtractionConfig::default());
        let err = match opener.open(&path).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, ArchivistError::Extraction(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
