//! DOCX Extractor
//!
//! Reads `word/document.xml` out of the OOXML container and collects the
//! `w:t` text runs per paragraph. Core properties supply author/title/subject.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use zip::ZipArchive;

use crate::core::models::ProcessingMethod;

use super::{ExtractedContent, ExtractionError, Result};

pub struct DocxExtractor;

impl DocxExtractor {
    pub async fn process(&self, path: &Path) -> Result<ExtractedContent> {
        let document_xml = read_zip_entry(path, "word/document.xml")?;
        let (paragraphs, paragraph_count) = collect_paragraphs(&document_xml)?;
        let text = paragraphs.join("\n\n");

        let mut metadata = Map::new();
        metadata.insert("format".to_string(), Value::String("docx".to_string()));
        metadata.insert(
            "paragraph_count".to_string(),
            serde_json::json!(paragraph_count),
        );
        merge_core_properties(path, &mut metadata);

        log::info!(
            "Extracted {} characters from DOCX: {:?}",
            text.len(),
            path.file_name().unwrap_or_default()
        );

        Ok(ExtractedContent {
            text,
            metadata,
            method: ProcessingMethod::TextExtraction,
        })
    }
}

pub(super) fn read_zip_entry(path: &Path, entry: &str) -> Result<String> {
    let file = File::open(path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| ExtractionError::Office(e.to_string()))?;
    let mut entry = archive
        .by_name(entry)
        .map_err(|e| ExtractionError::Office(e.to_string()))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

pub(super) fn list_zip_entries(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let archive = ZipArchive::new(file).map_err(|e| ExtractionError::Office(e.to_string()))?;
    Ok(archive.file_names().map(|n| n.to_string()).collect())
}

/// Non-empty paragraph texts plus the total `w:p` count.
fn collect_paragraphs(xml: &str) -> Result<(Vec<String>, usize)> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut paragraph_count = 0;
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => {
                    paragraph_count += 1;
                    current.clear();
                }
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractionError::Office(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(current.trim().to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Office(e.to_string())),
            _ => {}
        }
    }

    Ok((paragraphs, paragraph_count))
}

/// Pull author/title/subject from `docProps/core.xml` when present.
/// Metadata failures never fail the extraction.
pub(super) fn merge_core_properties(path: &Path, metadata: &mut Map<String, Value>) {
    let core_xml = match read_zip_entry(path, "docProps/core.xml") {
        Ok(xml) => xml,
        Err(_) => return,
    };

    let mut reader = Reader::from_str(&core_xml);
    let mut current_field: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current_field = match e.name().as_ref() {
                    b"dc:creator" => Some("author"),
                    b"dc:title" => Some("title"),
                    b"dc:subject" => Some("subject"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let Some(field) = current_field {
                    if let Ok(text) = t.unescape() {
                        let text = text.trim();
                        if !text.is_empty() {
                            metadata
                                .insert(field.to_string(), Value::String(text.to_string()));
                        }
                    }
                }
            }
            Ok(Event::End(_)) => current_field = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Failed to parse core properties: {e}");
                break;
            }
            _ => {}
        }
    }
}
