//! Document Ingestion
//!
//! Format extractors, the OCR service, and the chunker. Every extractor
//! yields `(text, metadata, method)`; the knowledge service chains
//! extraction, chunking, embedding and vector writes.

pub mod chunker;
pub mod docx;
pub mod html;
pub mod image;
pub mod ocr;
pub mod pdf;
pub mod pptx;
pub mod xlsx;

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::models::{DocumentFormat, ProcessingMethod};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Office document extraction failed: {0}")]
    Office(String),

    #[error("Spreadsheet extraction failed: {0}")]
    Spreadsheet(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

// ============================================================================
// Extracted Content
// ============================================================================

/// Output of a format extractor.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub metadata: Map<String, Value>,
    pub method: ProcessingMethod,
}

// ============================================================================
// Text Extractor
// ============================================================================

/// Dispatches a file to the extractor for its format.
pub struct TextExtractor {
    ocr: Arc<ocr::OcrService>,
}

impl TextExtractor {
    pub fn new(ocr: Arc<ocr::OcrService>) -> Self {
        Self { ocr }
    }

    pub async fn extract(
        &self,
        path: &Path,
        format: DocumentFormat,
        force_ocr: bool,
    ) -> Result<ExtractedContent> {
        log::info!(
            "Extracting text from {:?} ({})",
            path.file_name().unwrap_or_default(),
            format.as_str()
        );

        match format {
            DocumentFormat::Pdf => pdf::PdfExtractor.process(path, &self.ocr, force_ocr).await,
            DocumentFormat::Docx => docx::DocxExtractor.process(path).await,
            DocumentFormat::Pptx => pptx::PptxExtractor.process(path).await,
            DocumentFormat::Xlsx => xlsx::XlsxExtractor.process(path).await,
            DocumentFormat::Html => html::HtmlExtractor.process(path).await,
            DocumentFormat::Jpg | DocumentFormat::Png | DocumentFormat::Svg => {
                image::ImageExtractor::new(format).process(path).await
            }
        }
    }
}
