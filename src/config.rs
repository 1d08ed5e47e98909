//! Server Configuration
//!
//! Settings are loaded from `./config.yaml` when present, otherwise from
//! built-in defaults, then overridden by `KNOWLEDGE_`-prefixed environment
//! variables. Nested keys use `__` as delimiter, e.g. `KNOWLEDGE_MCP__PORT=3100`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ingestion::chunker::ChunkStrategy;

pub const ENV_PREFIX: &str = "KNOWLEDGE_";
pub const ENV_DELIMITER: &str = "__";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Setting Groups
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory reserved for raw ingested files.
    pub documents_path: PathBuf,
    /// Directory managed by the vector index.
    pub vector_db_path: PathBuf,
    /// Cache directory for embedding model weights.
    pub model_cache_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            documents_path: PathBuf::from("./data/documents"),
            vector_db_path: PathBuf::from("./data/vectors"),
            model_cache_path: PathBuf::from("./data/models"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_name: String,
    pub batch_size: usize,
    pub device: Device,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
            device: Device::Cpu,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: ChunkStrategy,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            strategy: ChunkStrategy::Sentence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub max_concurrent_tasks: usize,
    pub ocr_confidence_threshold: f32,
    pub max_file_size_mb: u64,
    /// Bound on concurrent tesseract invocations.
    pub ocr_workers: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            ocr_confidence_threshold: 0.6,
            max_file_size_mb: 100,
            ocr_workers: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Websocket,
    #[serde(rename = "http-streamable")]
    HttpStreamable,
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    /// Reject POSTs carrying an unknown `mcp-session-id` with 404 instead of
    /// creating the session on demand.
    pub strict_sessions: bool,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            transport: Transport::Http,
            strict_sessions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    pub force_ocr: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            force_ocr: false,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub processing: ProcessingSettings,
    pub mcp: McpSettings,
    pub ocr: OcrSettings,
}

impl Settings {
    /// Load settings from `./config.yaml` if it exists, otherwise defaults,
    /// then apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yaml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Self::from_yaml_str("{}")
        }
    }

    /// Load settings from an explicit YAML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    fn from_yaml_str(raw: &str) -> Result<Self> {
        let settings: Settings =
            serde_yaml_ng::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let settings = settings.apply_env_overrides(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `KNOWLEDGE_GROUP__KEY=value` overrides on top of the loaded tree.
    pub fn apply_env_overrides<I>(self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = serde_json::to_value(&self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Sorted for deterministic application order.
        let overrides: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();

        for (key, value) in overrides {
            let path: Vec<String> = key[ENV_PREFIX.len()..]
                .split(ENV_DELIMITER)
                .map(|s| s.to_lowercase())
                .collect();
            if path.iter().any(|s| s.is_empty()) {
                continue;
            }
            set_path(&mut tree, &path, coerce_scalar(&value));
        }

        serde_json::from_value(tree).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Range-check every setting the way the original service did.
    pub fn validate(&self) -> Result<()> {
        let e = &self.embedding;
        if !(1..=128).contains(&e.batch_size) {
            return Err(ConfigError::InvalidValue(format!(
                "embedding.batch_size must be in [1, 128], got {}",
                e.batch_size
            )));
        }

        let c = &self.chunking;
        if !(100..=2000).contains(&c.chunk_size) {
            return Err(ConfigError::InvalidValue(format!(
                "chunking.chunk_size must be in [100, 2000], got {}",
                c.chunk_size
            )));
        }
        if c.chunk_overlap > 500 {
            return Err(ConfigError::InvalidValue(format!(
                "chunking.chunk_overlap must be in [0, 500], got {}",
                c.chunk_overlap
            )));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(ConfigError::InvalidValue(
                "chunking.chunk_overlap must be less than chunk_size".to_string(),
            ));
        }

        let p = &self.processing;
        if !(1..=10).contains(&p.max_concurrent_tasks) {
            return Err(ConfigError::InvalidValue(format!(
                "processing.max_concurrent_tasks must be in [1, 10], got {}",
                p.max_concurrent_tasks
            )));
        }
        if !(0.0..=1.0).contains(&p.ocr_confidence_threshold) {
            return Err(ConfigError::InvalidValue(format!(
                "processing.ocr_confidence_threshold must be in [0, 1], got {}",
                p.ocr_confidence_threshold
            )));
        }
        if !(1..=1000).contains(&p.max_file_size_mb) {
            return Err(ConfigError::InvalidValue(format!(
                "processing.max_file_size_mb must be in [1, 1000], got {}",
                p.max_file_size_mb
            )));
        }
        if !(1..=8).contains(&p.ocr_workers) {
            return Err(ConfigError::InvalidValue(format!(
                "processing.ocr_workers must be in [1, 8], got {}",
                p.ocr_workers
            )));
        }

        if self.mcp.port < 1024 {
            return Err(ConfigError::InvalidValue(format!(
                "mcp.port must be in [1024, 65535], got {}",
                self.mcp.port
            )));
        }

        Ok(())
    }

    /// Expand the storage paths to absolute paths and create the directories.
    pub fn ensure_directories(&mut self) -> Result<()> {
        self.storage.documents_path = absolutize(&self.storage.documents_path)?;
        self.storage.vector_db_path = absolutize(&self.storage.vector_db_path)?;
        self.storage.model_cache_path = absolutize(&self.storage.model_cache_path)?;

        std::fs::create_dir_all(&self.storage.documents_path)?;
        std::fs::create_dir_all(&self.storage.vector_db_path)?;
        std::fs::create_dir_all(&self.storage.model_cache_path)?;
        Ok(())
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Numbers and booleans in env values become typed JSON scalars; everything
/// else stays a string.
fn coerce_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

fn set_path(tree: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Value::Object(map) = tree else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.clone(), value);
    } else {
        let entry = map
            .entry(head.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        set_path(entry, rest, value);
    }
}
