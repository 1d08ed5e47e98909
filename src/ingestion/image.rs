//! Image Extractor
//!
//! Images carry no extractable text; they are registered with their
//! dimensions and color type so downstream marks them COMPLETED with zero
//! chunks. SVG files are not rasterized.

use std::path::Path;

use serde_json::{Map, Value};

use crate::core::models::{DocumentFormat, ProcessingMethod};

use super::{ExtractedContent, Result};

pub struct ImageExtractor {
    format: DocumentFormat,
}

impl ImageExtractor {
    pub fn new(format: DocumentFormat) -> Self {
        Self { format }
    }

    pub async fn process(&self, path: &Path) -> Result<ExtractedContent> {
        let mut metadata = Map::new();
        metadata.insert(
            "format".to_string(),
            Value::String(self.format.as_str().to_string()),
        );

        if self.format != DocumentFormat::Svg {
            match image::open(path) {
                Ok(img) => {
                    metadata.insert("width".to_string(), serde_json::json!(img.width()));
                    metadata.insert("height".to_string(), serde_json::json!(img.height()));
                    metadata.insert(
                        "color_type".to_string(),
                        Value::String(format!("{:?}", img.color())),
                    );
                }
                Err(e) => {
                    // Metadata failure never fails ingestion of the record.
                    log::warn!("Failed to read image metadata from {:?}: {e}", path);
                }
            }
        }

        Ok(ExtractedContent {
            text: String::new(),
            metadata,
            method: ProcessingMethod::ImageAnalysis,
        })
    }
}
