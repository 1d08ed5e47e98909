//! PPTX Extractor
//!
//! Collects `a:t` text runs from each `ppt/slides/slideN.xml` in slide
//! order, one text block per `a:p` paragraph.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::core::models::ProcessingMethod;

use super::docx::{list_zip_entries, merge_core_properties, read_zip_entry};
use super::{ExtractedContent, ExtractionError, Result};

pub struct PptxExtractor;

impl PptxExtractor {
    pub async fn process(&self, path: &Path) -> Result<ExtractedContent> {
        let slides = slide_entries(path)?;
        let slide_count = slides.len();

        let mut parts = Vec::new();
        for (_, entry) in &slides {
            let xml = read_zip_entry(path, entry)?;
            parts.extend(collect_slide_paragraphs(&xml)?);
        }
        let text = parts.join("\n\n");

        let mut metadata = Map::new();
        metadata.insert("format".to_string(), Value::String("pptx".to_string()));
        metadata.insert("slide_count".to_string(), serde_json::json!(slide_count));
        merge_core_properties(path, &mut metadata);

        log::info!(
            "Extracted {} characters from PPTX: {:?} ({} slides)",
            text.len(),
            path.file_name().unwrap_or_default(),
            slide_count
        );

        Ok(ExtractedContent {
            text,
            metadata,
            method: ProcessingMethod::TextExtraction,
        })
    }
}

/// Slide XML entries sorted by their numeric index.
fn slide_entries(path: &Path) -> Result<Vec<(usize, String)>> {
    let mut slides = Vec::new();
    for name in list_zip_entries(path)? {
        let Some(stem) = name
            .strip_prefix("ppt/slides/slide")
            .and_then(|rest| rest.strip_suffix(".xml"))
        else {
            continue;
        };
        if let Ok(num) = stem.parse::<usize>() {
            slides.push((num, name));
        }
    }
    slides.sort_by_key(|s| s.0);
    Ok(slides)
}

/// Non-empty `a:p` paragraph texts, each the concatenation of its `a:t` runs.
fn collect_slide_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"a:p" => current.clear(),
                b"a:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractionError::Office(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => in_text_run = false,
                b"a:p" => {
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

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_test_pptx(path: &Path, slides: &[&[&str]]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);

        for (i, paragraphs) in slides.iter().enumerate() {
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<a:p><a:r><a:t>{p}</a:t></a:r></a:p>"))
                .collect();
            let slide = format!(
                "<?xml version=\"1.0\"?>\
                 <p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
                 xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">\
                 <p:cSld><p:spTree>{body}</p:spTree></p:cSld></p:sld>"
            );
            writer
                .start_file(
                    format!("ppt/slides/slide{}.xml", i + 1),
                    SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(slide.as_bytes()).unwrap();
        }

        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_extract_slides_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_test_pptx(
            &path,
            &[&["Title slide", "Subtitle"], &["Second slide content"]],
        );

        let content = PptxExtractor.process(&path).await.unwrap();
        assert_eq!(
            content.text,
            "Title slide\n\nSubtitle\n\nSecond slide content"
        );
        assert_eq!(
            content.metadata.get("slide_count"),
            Some(&serde_json::json!(2))
        );
        assert_eq!(content.method, ProcessingMethod::TextExtraction);
    }

    #[tokio::test]
    async fn test_slides_sorted_numerically_not_lexically() {
        // slide10 must come after slide2.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pptx");
        let slides: Vec<Vec<&str>> = (0..10).map(|i| match i {
            1 => vec!["slide two"],
            9 => vec!["slide ten"],
            _ => vec!["filler"],
        }).collect();
        let slide_refs: Vec<&[&str]> = slides.iter().map(|s| s.as_slice()).collect();
        write_test_pptx(&path, &slide_refs);

        let content = PptxExtractor.process(&path).await.unwrap();
        let two_pos = content.text.find("slide two").unwrap();
        let ten_pos = content.text.find("slide ten").unwrap();
        assert!(two_pos < ten_pos);
    }
}
