//! OCR Service
//!
//! Optical character recognition via external `pdftoppm` + `tesseract`
//! binaries. PDF pages are rasterized at 300 DPI into a scoped temp
//! directory, then recognized page by page. Concurrent recognitions are
//! bounded by a worker semaphore shared across documents.

use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Semaphore;

use super::{ExtractionError, Result};

/// Rasterization resolution for PDF OCR.
const OCR_DPI: &str = "300";

/// OCR is triggered below this many stripped characters.
const MIN_TEXT_LENGTH: usize = 100;

/// OCR is triggered below this alphanumeric-or-whitespace ratio.
const MIN_READABLE_RATIO: f64 = 0.7;

// ============================================================================
// OCR Decision
// ============================================================================

/// Decide whether extracted text warrants an OCR pass.
///
/// Triggers when the stripped text is shorter than 100 characters, or when
/// less than 70% of all characters are alphanumeric or whitespace.
pub fn is_ocr_needed(extracted_text: &str) -> bool {
    if extracted_text.trim().chars().count() < MIN_TEXT_LENGTH {
        return true;
    }

    let total = extracted_text.chars().count();
    let readable = extracted_text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();

    (readable as f64 / total as f64) < MIN_READABLE_RATIO
}

// ============================================================================
// OCR Service
// ============================================================================

/// Result of an OCR pass over one or more pages.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    /// Mean per-word confidence, normalized to [0, 1].
    pub confidence: f32,
    pub page_count: usize,
}

pub struct OcrService {
    language: String,
    confidence_threshold: f32,
    workers: Arc<Semaphore>,
}

impl OcrService {
    pub fn new(language: impl Into<String>, confidence_threshold: f32, workers: usize) -> Self {
        Self {
            language: language.into(),
            confidence_threshold,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run OCR over a single image, returning text and mean word confidence.
    pub async fn extract_text_from_image(&self, image_path: &Path) -> Result<(String, f32)> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ExtractionError::Ocr("OCR worker pool closed".to_string()))?;

        let text = self.run_tesseract(image_path, None).await?;
        let tsv = self.run_tesseract(image_path, Some("tsv")).await?;
        let confidence = mean_word_confidence(&tsv);

        if confidence < self.confidence_threshold {
            log::warn!(
                "OCR confidence {:.2} below threshold {:.2} for {:?}",
                confidence,
                self.confidence_threshold,
                image_path.file_name().unwrap_or_default()
            );
        }

        log::info!(
            "OCR extracted {} characters from {:?} (confidence: {:.2})",
            text.len(),
            image_path.file_name().unwrap_or_default(),
            confidence
        );

        Ok((text, confidence))
    }

    /// Rasterize a PDF at 300 DPI and OCR every page, concatenating page
    /// texts with blank-line separators.
    pub async fn process_pdf_with_ocr(&self, pdf_path: &Path) -> Result<OcrOutput> {
        let temp_dir = tempfile::Builder::new().prefix("ocr_").tempdir()?;
        let temp_path = temp_dir.path();
        let prefix = "page";

        log::info!("Running pdftoppm on {:?}", pdf_path);
        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(OCR_DPI)
            .arg(pdf_path)
            .arg(temp_path.join(prefix))
            .status()
            .await
            .map_err(|e| ExtractionError::Ocr(format!("pdftoppm failed to start: {e}")))?;

        if !status.success() {
            return Err(ExtractionError::Ocr("pdftoppm failed".to_string()));
        }

        // pdftoppm emits page-1.png, page-2.png, ... Discover the files it
        // actually produced rather than trusting a predicted page count.
        let mut image_files = Vec::new();
        let mut read_dir = tokio::fs::read_dir(temp_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(idx) = stem.rfind('-') {
                    if let Ok(num) = stem[idx + 1..].parse::<usize>() {
                        image_files.push((num, path));
                    }
                }
            }
        }
        image_files.sort_by_key(|k| k.0);

        if image_files.is_empty() {
            return Err(ExtractionError::Ocr(
                "No images generated by pdftoppm".to_string(),
            ));
        }

        log::info!("OCR processing {} pages...", image_files.len());

        let mut page_texts = Vec::new();
        let mut confidences = Vec::new();
        for (page_num, img_path) in image_files {
            match self.extract_text_from_image(&img_path).await {
                Ok((text, confidence)) => {
                    page_texts.push(text.replace('\x0c', ""));
                    confidences.push(confidence);
                }
                Err(e) => {
                    log::warn!("OCR failed for page {page_num}: {e}");
                }
            }
        }

        if page_texts.is_empty() {
            return Err(ExtractionError::Ocr(
                "OCR produced no text on any page".to_string(),
            ));
        }

        let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
        Ok(OcrOutput {
            text: page_texts.join("\n\n"),
            confidence,
            page_count: page_texts.len(),
        })
    }

    async fn run_tesseract(&self, image_path: &Path, config: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image_path).arg("stdout").arg("-l").arg(&self.language);
        if let Some(config) = config {
            cmd.arg(config);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ExtractionError::Ocr(format!("tesseract failed to start: {e}")))?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr(format!(
                "tesseract exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Mean confidence of word rows (level 5) in tesseract TSV output,
/// normalized from the 0-100 scale to [0, 1].
fn mean_word_confidence(tsv: &str) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0usize;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        if let Ok(conf) = fields[10].parse::<f32>() {
            if conf >= 0.0 {
                sum += conf;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        (sum / count as f32) / 100.0
    }
}
