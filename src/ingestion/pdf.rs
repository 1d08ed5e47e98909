//! PDF Extractor
//!
//! Baseline text extraction via lopdf with a smart OCR fallback: OCR runs
//! only when the baseline text fails a quality check (or when forced), and
//! an OCR failure quietly demotes back to the baseline text.

use std::path::Path;

use lopdf::Document;
use serde_json::{Map, Value};

use crate::core::models::ProcessingMethod;

use super::ocr::{is_ocr_needed, OcrService};
use super::{ExtractedContent, ExtractionError, Result};

pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract text and metadata, consulting the OCR decision rule after the
    /// baseline pass.
    pub async fn process(
        &self,
        path: &Path,
        ocr: &OcrService,
        force_ocr: bool,
    ) -> Result<ExtractedContent> {
        let doc = Document::load(path).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let baseline = Self::extract_text(&doc)?;
        let mut metadata = Self::extract_metadata(&doc);

        log::info!(
            "Extracted {} characters from PDF: {:?}",
            baseline.len(),
            path.file_name().unwrap_or_default()
        );

        if force_ocr || is_ocr_needed(&baseline) {
            log::info!(
                "Running OCR for {:?} (forced: {force_ocr})",
                path.file_name().unwrap_or_default()
            );
            match ocr.process_pdf_with_ocr(path).await {
                Ok(output) => {
                    metadata.insert("ocr_used".to_string(), Value::Bool(true));
                    metadata.insert(
                        "ocr_confidence".to_string(),
                        serde_json::json!(output.confidence),
                    );
                    return Ok(ExtractedContent {
                        text: output.text,
                        metadata,
                        method: ProcessingMethod::Ocr,
                    });
                }
                Err(e) => {
                    // Keep the baseline text rather than failing the document.
                    log::warn!("OCR failed, falling back to extracted text: {e}");
                    metadata.insert("ocr_failed".to_string(), Value::Bool(true));
                    metadata.insert("ocr_error".to_string(), Value::String(e.to_string()));
                }
            }
        }

        Ok(ExtractedContent {
            text: baseline,
            metadata,
            method: ProcessingMethod::TextExtraction,
        })
    }

    /// Per-page text joined with blank lines.
    fn extract_text(doc: &Document) -> Result<String> {
        let mut pages = Vec::new();
        for (page_num, _page_id) in doc.get_pages() {
            let content = doc
                .extract_text(&[page_num])
                .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
            if !content.trim().is_empty() {
                pages.push(content);
            }
        }
        Ok(pages.join("\n\n"))
    }

    /// Page count plus title/author/subject from the trailer Info dictionary.
    fn extract_metadata(doc: &Document) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("format".to_string(), Value::String("pdf".to_string()));
        metadata.insert(
            "page_count".to_string(),
            serde_json::json!(doc.get_pages().len()),
        );

        fn bytes_to_string(bytes: &[u8]) -> Option<String> {
            std::str::from_utf8(bytes).ok().map(|s| s.to_string())
        }

        if let Ok(info_ref) = doc.trailer.get(b"Info") {
            if let Ok(info_ref) = info_ref.as_reference() {
                if let Ok(info_dict) = doc.get_object(info_ref) {
                    if let Ok(dict) = info_dict.as_dict() {
                        for (key, field) in
                            [(b"Title".as_slice(), "title"), (b"Author".as_slice(), "author"), (b"Subject".as_slice(), "subject")]
                        {
                            if let Ok(value) = dict.get(key) {
                                if let Ok(s) = value.as_str() {
                                    if let Some(s) = bytes_to_string(s) {
                                        if !s.is_empty() {
                                            metadata.insert(
                                                field.to_string(),
                                                Value::String(s),
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        metadata
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a one-page PDF with the given text drawn in Helvetica.
    pub(crate) fn write_test_pdf(path: &Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        doc.save(path).unwrap();
    }

    #[tokio::test]
    async fn test_extract_text_from_generated_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("sample.pdf");
        write_test_pdf(
            &pdf_path,
            "The quick brown fox jumps over the lazy dog. \
             Pack my box with five dozen liquor jugs. \
             How vexingly quick daft zebras jump over the fence.",
        );

        let ocr = OcrService::new("eng", 0.6, 1);
        let extractor = PdfExtractor;
        let content = extractor.process(&pdf_path, &ocr, false).await.unwrap();

        assert!(content.text.contains("quick brown fox"));
        assert_eq!(content.metadata.get("page_count"), Some(&serde_json::json!(1)));
        assert_eq!(content.metadata.get("format"), Some(&serde_json::json!("pdf")));
    }

    #[tokio::test]
    async fn test_short_pdf_falls_back_when_ocr_unavailable() {
        // Text under the 100-char threshold triggers the OCR path; with no
        // tesseract/pdftoppm available (or a blank rasterization) the
        // extractor must demote to the baseline text instead of erroring.
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("short.pdf");
        write_test_pdf(&pdf_path, "Tiny.");

        let ocr = OcrService::new("eng", 0.6, 1);
        let extractor = PdfExtractor;
        let content = extractor.process(&pdf_path, &ocr, false).await.unwrap();

        match content.method {
            // OCR binaries present: the fallback ran and owns the result.
            ProcessingMethod::Ocr => {
                assert_eq!(content.metadata.get("ocr_used"), Some(&serde_json::json!(true)));
            }
            // OCR binaries absent: baseline text survives with the failure
            // recorded in metadata.
            ProcessingMethod::TextExtraction => {
                assert!(content.text.contains("Tiny"));
                assert_eq!(content.metadata.get("ocr_failed"), Some(&serde_json::json!(true)));
                assert!(content.metadata.contains_key("ocr_error"));
            }
            other => panic!("unexpected method: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires pdftoppm + tesseract; run with: cargo test -- --ignored
    async fn test_force_ocr_on_text_rich_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("rich.pdf");
        write_test_pdf(
            &pdf_path,
            "Semantic search maps documents and queries into a shared vector space.",
        );

        let ocr = OcrService::new("eng", 0.6, 2);
        let extractor = PdfExtractor;
        let content = extractor.process(&pdf_path, &ocr, true).await.unwrap();

        assert_eq!(content.method, ProcessingMethod::Ocr);
        let confidence = content.metadata.get("ocr_confidence").unwrap().as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert_eq!(content.metadata.get("ocr_used"), Some(&serde_json::json!(true)));
    }
}
