//! HTML Extractor
//!
//! Extracts visible text (script and style subtrees skipped) plus the page
//! title and author/description meta tags.

use std::path::Path;

use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::core::models::ProcessingMethod;

use super::{ExtractedContent, Result};

pub struct HtmlExtractor;

impl HtmlExtractor {
    pub async fn process(&self, path: &Path) -> Result<ExtractedContent> {
        let source = std::fs::read_to_string(path)?;
        let document = Html::parse_document(&source);

        let text = visible_text(&document);
        let metadata = extract_metadata(&document);

        log::info!(
            "Extracted {} characters from HTML: {:?}",
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

/// All text nodes outside `<script>`/`<style>`, newline separated.
fn visible_text(document: &Html) -> String {
    let mut parts = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let trimmed = text.text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join("\n")
}

fn extract_metadata(document: &Html) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("format".to_string(), Value::String("html".to_string()));

    if let Ok(title_selector) = Selector::parse("title") {
        if let Some(title) = document.select(&title_selector).next() {
            let title: String = title.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                metadata.insert("title".to_string(), Value::String(title));
            }
        }
    }

    if let Ok(meta_selector) = Selector::parse("meta") {
        for meta in document.select(&meta_selector) {
            let (Some(name), Some(content)) =
                (meta.value().attr("name"), meta.value().attr("content"))
            else {
                continue;
            };
            match name {
                "author" => {
                    metadata.insert("author".to_string(), Value::String(content.to_string()));
                }
                "description" => {
                    metadata.insert(
                        "description".to_string(),
                        Value::String(content.to_string()),
                    );
                }
                _ => {}
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn extract(html: &str) -> ExtractedContent {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, html).unwrap();
        HtmlExtractor.process(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_scripts_and_styles_are_stripped() {
        let content = extract(
            "<html><head><title>Doc</title><style>body { color: red; }</style></head>\
             <body><p>Visible text.</p><script>var hidden = 1;</script></body></html>",
        )
        .await;

        assert!(content.text.contains("Visible text."));
        assert!(!content.text.contains("color: red"));
        assert!(!content.text.contains("hidden"));
        assert_eq!(content.method, ProcessingMethod::TextExtraction);
    }

    #[tokio::test]
    async fn test_title_and_meta_tags() {
        let content = extract(
            "<html><head><title>My Page</title>\
             <meta name=\"author\" content=\"Grace Hopper\">\
             <meta name=\"description\" content=\"A test page\">\
             </head><body>Body</body></html>",
        )
        .await;

        assert_eq!(content.metadata.get("title"), Some(&serde_json::json!("My Page")));
        assert_eq!(
            content.metadata.get("author"),
            Some(&serde_json::json!("Grace Hopper"))
        );
        assert_eq!(
            content.metadata.get("description"),
            Some(&serde_json::json!("A test page"))
        );
    }

    #[tokio::test]
    async fn test_nested_elements_flattened_in_order() {
        let content =
            extract("<html><body><div><p>First.</p><p>Second <b>bold</b>.</p></div></body></html>")
                .await;

        let first = content.text.find("First.").unwrap();
        let second = content.text.find("Second").unwrap();
        let bold = content.text.find("bold").unwrap();
        assert!(first < second && second < bold);
    }
}
