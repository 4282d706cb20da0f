//! Text extraction for harvested attachments.
//!
//! Each page is tried against four layers, cheapest first: the PDF text
//! layer, Poppler's `pdftotext`, content-stream text blocks, and OCR over a
//! rasterized page. A page no layer recovers becomes a sentinel line instead
//! of an error. A document is accepted when enough pages or characters were
//! recovered; the result lands in the extraction ledger either way.

pub mod chain;
pub mod layers;
pub mod ocr;
pub mod pipeline;

pub use chain::{Acceptance, DocumentText, Layer, PageChain, PageText, is_sentinel, sentinel};
pub use layers::{DocumentOpener, PageSource, PdfDocument, PdfOpener};
pub use ocr::{CommandEngine, OcrEngine, TesseractEngine, engine_from_config};
pub use pipeline::{
    Comparison, ExtractOutcome, ExtractSummary, ExtractionTarget, Extractor, compare,
    strip_filename_header,
};
