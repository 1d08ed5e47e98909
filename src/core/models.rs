//! Core Data Models
//!
//! Documents, contexts, processing tasks and search results shared across
//! the ingestion pipeline, the vector store and the MCP surface.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid file size: {0}")]
    InvalidSize(String),

    #[error("Invalid context name: {0}")]
    InvalidContextName(String),

    #[error("Document must belong to at least one context")]
    EmptyContexts,
}

pub type Result<T> = std::result::Result<T, ModelError>;

// ============================================================================
// Enums
// ============================================================================

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Html,
    Jpg,
    Png,
    Svg,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 8] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Pptx,
        DocumentFormat::Xlsx,
        DocumentFormat::Html,
        DocumentFormat::Jpg,
        DocumentFormat::Png,
        DocumentFormat::Svg,
    ];

    /// Map a lowercase file extension (without dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            "html" | "htm" => Some(Self::Html),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Xlsx => "xlsx",
            Self::Html => "html",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    /// Extensions accepted by the ingestion pipeline.
    pub fn supported_extensions() -> &'static [&'static str] {
        &[
            "pdf", "docx", "pptx", "xlsx", "html", "htm", "jpg", "jpeg", "png", "svg",
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

/// How text was obtained from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    TextExtraction,
    Ocr,
    Hybrid,
    ImageAnalysis,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextExtraction => "text_extraction",
            Self::Ocr => "ocr",
            Self::Hybrid => "hybrid",
            Self::ImageAnalysis => "image_analysis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// An ingested document with provenance and multi-context membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    /// SHA-256 hex digest of the file bytes, used for deduplication.
    pub content_hash: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub processing_method: Option<ProcessingMethod>,
    pub chunk_count: usize,
    /// Contexts this document belongs to. Never empty.
    pub contexts: Vec<String>,
    pub metadata: Map<String, Value>,
    pub error_message: Option<String>,
}

impl Document {
    pub fn new(
        filename: impl Into<String>,
        file_path: impl Into<String>,
        content_hash: impl Into<String>,
        format: DocumentFormat,
        size_bytes: u64,
        contexts: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        if size_bytes == 0 {
            return Err(ModelError::InvalidSize(
                "File size must be greater than 0".to_string(),
            ));
        }
        if contexts.is_empty() {
            return Err(ModelError::EmptyContexts);
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            filename,
            file_path: file_path.into(),
            content_hash: content_hash.into(),
            format,
            size_bytes,
            date_added: now,
            date_modified: now,
            processing_status: ProcessingStatus::Pending,
            processing_method: None,
            chunk_count: 0,
            contexts,
            metadata,
            error_message: None,
        })
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(ModelError::InvalidFilename(
            "Filename cannot be empty".to_string(),
        ));
    }
    if filename.contains(['/', '\\', '\0']) {
        return Err(ModelError::InvalidFilename(format!(
            "Filename contains invalid characters: {filename}"
        )));
    }
    Ok(())
}

// ============================================================================
// Context
// ============================================================================

static CONTEXT_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static pattern"));

/// The always-present context that cannot be created or deleted via the API.
pub const RESERVED_CONTEXT: &str = "default";

/// A named document collection. One context maps to one vector-store
/// collection; documents may belong to several contexts at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_count: usize,
    pub metadata: Map<String, Value>,
}

impl Context {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        let name = name.into();
        let name = name.trim().to_string();
        if !CONTEXT_NAME_PATTERN.is_match(&name) {
            return Err(ModelError::InvalidContextName(
                "Context name must be alphanumeric with dashes/underscores only, \
                 and between 1-64 characters"
                    .to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            name,
            description,
            created_at: now,
            updated_at: now,
            document_count: 0,
            metadata,
        })
    }

    pub fn is_reserved(&self) -> bool {
        self.name == RESERVED_CONTEXT
    }
}

/// Check a context name against the naming rules without building a Context.
pub fn is_valid_context_name(name: &str) -> bool {
    CONTEXT_NAME_PATTERN.is_match(name)
}

// ============================================================================
// Processing Task
// ============================================================================

/// In-memory tracking record for an async ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub task_id: String,
    pub document_id: String,
    pub status: TaskStatus,
    /// Fraction of work completed, in [0.0, 1.0].
    pub progress: f32,
    pub current_step: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ProcessingTask {
    pub fn new(document_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            status: TaskStatus::Queued,
            progress: 0.0,
            current_step: String::new(),
            total_steps,
            completed_steps: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Record step progress, clamping to the declared step count.
    pub fn advance(&mut self, step: &str, completed_steps: usize) {
        self.current_step = step.to_string();
        self.completed_steps = completed_steps.min(self.total_steps);
        self.progress = if self.total_steps == 0 {
            0.0
        } else {
            self.completed_steps as f32 / self.total_steps as f32
        };
    }
}

// ============================================================================
// Search Result
// ============================================================================

/// A single relevance-ranked passage returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: Option<String>,
    pub filename: Option<String>,
    pub chunk_text: String,
    /// `1 - cosine_distance`, in [0.0, 1.0] for normalized vectors.
    pub relevance_score: f32,
    pub chunk_index: Option<u64>,
    pub format: Option<String>,
    pub context: Option<String>,
    pub processing_method: Option<String>,
}
