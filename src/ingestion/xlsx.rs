//! XLSX Extractor
//!
//! Dumps every sheet as a `Sheet: <name>` header followed by tab-joined
//! rows, the layout the search index ingests best for tabular data.

use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use serde_json::{Map, Value};

use crate::core::models::ProcessingMethod;

use super::{ExtractedContent, ExtractionError, Result};

pub struct XlsxExtractor;

impl XlsxExtractor {
    pub async fn process(&self, path: &Path) -> Result<ExtractedContent> {
        let mut workbook = open_workbook::<Xlsx<_>, _>(path)
            .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;
        let sheet_names = workbook.sheet_names().to_vec();

        let mut parts = Vec::new();
        for name in &sheet_names {
            let range = workbook
                .worksheet_range(name)
                .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;

            parts.push(format!("Sheet: {name}"));
            for row in range.rows() {
                let row_text = row
                    .iter()
                    .map(cell_to_string)
                    .collect::<Vec<_>>()
                    .join("\t");
                if !row_text.trim().is_empty() {
                    parts.push(row_text);
                }
            }
            parts.push(String::new());
        }
        let text = parts.join("\n");

        let mut metadata = Map::new();
        metadata.insert("format".to_string(), Value::String("xlsx".to_string()));
        metadata.insert(
            "sheet_count".to_string(),
            serde_json::json!(sheet_names.len()),
        );
        metadata.insert("sheets".to_string(), serde_json::json!(sheet_names));

        log::info!(
            "Extracted {} characters from XLSX: {:?}",
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

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = XlsxExtractor
            .process(Path::new("/nonexistent/book.xlsx"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-workbook.xlsx");
        std::fs::write(&path, b"plain text, not a zip").unwrap();

        let result = XlsxExtractor.process(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("abc".to_string())), "abc");
        assert_eq!(cell_to_string(&Data::Int(42)), "42");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
    }
}
