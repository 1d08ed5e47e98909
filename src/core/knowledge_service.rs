//! Knowledge Service
//!
//! Orchestrates the ingestion pipeline (validate, hash-dedup, extract,
//! chunk, embed, store) over the in-memory document and task registries,
//! and fronts search, removal and context management for the MCP surface.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use crate::config::Settings;
use crate::ingestion::chunker::chunk_text;
use crate::ingestion::ocr::OcrService;
use crate::ingestion::{ExtractionError, TextExtractor};

use super::contexts::{ContextError, ContextService};
use super::embedding::{EmbeddingError, TextEmbedder};
use super::models::{
    Context, Document, DocumentFormat, ModelError, ProcessingStatus, ProcessingTask,
    SearchResult, TaskStatus, RESERVED_CONTEXT,
};
use super::vector_store::{StoreError, VectorStore};

/// Documents yielding fewer non-whitespace characters than this are
/// completed with zero chunks.
const MIN_EXTRACTED_CHARS: usize = 10;

/// Ingestion pipeline stages tracked per task.
const PIPELINE_STEPS: usize = 4;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KnowledgeError {
    /// Stable error class name used in MCP error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Context(ContextError::NotFound(_)) => "ContextNotFound",
            Self::Context(ContextError::AlreadyExists(_)) => "ContextAlreadyExists",
            Self::Context(ContextError::Reserved(_)) => "ReservedContext",
            Self::Context(ContextError::InvalidName(_)) => "ValidationError",
            Self::Extraction(_) => "ExtractionError",
            Self::Embedding(_) => "EmbeddingError",
            Self::Store(_) => "StoreError",
            Self::Model(_) => "ValidationError",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

// ============================================================================
// Requests and Outcomes
// ============================================================================

/// Options for `add_document`.
#[derive(Debug, Clone)]
pub struct AddOptions {
    pub metadata: Map<String, Value>,
    pub async_processing: bool,
    pub force_ocr: bool,
    pub contexts: Vec<String>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            metadata: Map::new(),
            async_processing: true,
            force_ocr: false,
            contexts: vec![RESERVED_CONTEXT.to_string()],
        }
    }
}

/// What `add_document` actually did.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// Background task created; poll with `knowledge-task-status`.
    Queued { task_id: String, document_id: String },
    /// Synchronous processing finished.
    Completed { document_id: String },
    /// A document with identical content already exists.
    Duplicate { document_id: String },
}

/// Aggregate knowledge-base statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub document_count: usize,
    pub total_chunks: usize,
    pub total_size_mb: f64,
    pub average_chunks_per_document: f64,
    pub completed: usize,
    pub failed: usize,
    pub formats: HashMap<String, usize>,
}

// ============================================================================
// Knowledge Service
// ============================================================================

pub struct KnowledgeService {
    settings: Settings,
    contexts: ContextService,
    extractor: TextExtractor,
    embedder: Arc<dyn TextEmbedder>,
    store: VectorStore,
    documents: RwLock<HashMap<String, Document>>,
    tasks: RwLock<HashMap<String, ProcessingTask>>,
    task_slots: Arc<Semaphore>,
}

impl KnowledgeService {
    /// Construct the service, open the vector store, and rebuild the
    /// document registry from persisted embeddings.
    pub async fn new(settings: Settings, embedder: Arc<dyn TextEmbedder>) -> Result<Arc<Self>> {
        let ocr = Arc::new(OcrService::new(
            settings.ocr.language.clone(),
            settings.processing.ocr_confidence_threshold,
            settings.processing.ocr_workers,
        ));
        let store = VectorStore::open(&settings.storage.vector_db_path)?;
        let task_slots = Arc::new(Semaphore::new(settings.processing.max_concurrent_tasks));

        let service = Arc::new(Self {
            extractor: TextExtractor::new(ocr),
            contexts: ContextService::new(),
            embedder,
            store,
            documents: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            task_slots,
            settings,
        });

        service.recover_from_store().await;
        Ok(service)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Add a document to the knowledge base.
    pub async fn add_document(
        self: &Arc<Self>,
        file_path: &Path,
        options: AddOptions,
    ) -> Result<AddOutcome> {
        let contexts = if options.contexts.is_empty() {
            vec![RESERVED_CONTEXT.to_string()]
        } else {
            options.contexts.clone()
        };

        for context in &contexts {
            if !self.contexts.exists(context).await {
                return Err(KnowledgeError::Context(ContextError::NotFound(
                    context.clone(),
                )));
            }
        }

        let (format, size_bytes) = self.validate_file(file_path)?;
        let content_hash = hash_file(file_path.to_path_buf()).await?;

        // Dedup: identical bytes map to the existing document.
        {
            let documents = self.documents.read().await;
            if let Some(existing) = documents.values().find(|d| d.content_hash == content_hash)
            {
                log::info!(
                    "Duplicate document detected: {:?}",
                    file_path.file_name().unwrap_or_default()
                );
                return Ok(AddOutcome::Duplicate {
                    document_id: existing.id.clone(),
                });
            }
        }

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let document = Document::new(
            filename,
            file_path.to_string_lossy().to_string(),
            content_hash,
            format,
            size_bytes,
            contexts,
            options.metadata.clone(),
        )?;
        let document_id = document.id.clone();

        self.documents
            .write()
            .await
            .insert(document_id.clone(), document);

        if options.async_processing {
            let task = ProcessingTask::new(document_id.clone(), PIPELINE_STEPS);
            let task_id = task.task_id.clone();
            self.tasks.write().await.insert(task_id.clone(), task);

            let service = Arc::clone(self);
            let spawned_task_id = task_id.clone();
            let spawned_document_id = document_id.clone();
            let force_ocr = options.force_ocr;
            tokio::spawn(async move {
                let Ok(_permit) = service.task_slots.acquire().await else {
                    return;
                };
                // Failures are recorded on the task and document records.
                let _ = service
                    .run_processing(&spawned_document_id, force_ocr, Some(&spawned_task_id))
                    .await;
            });

            log::info!("Document queued for async processing: {document_id}");
            return Ok(AddOutcome::Queued {
                task_id,
                document_id,
            });
        }

        self.run_processing(&document_id, options.force_ocr, None)
            .await?;
        Ok(AddOutcome::Completed { document_id })
    }

    /// Run the pipeline, recording failure on the document and task records
    /// before handing the error back.
    async fn run_processing(
        &self,
        document_id: &str,
        force_ocr: bool,
        task_id: Option<&str>,
    ) -> Result<()> {
        if let Some(task_id) = task_id {
            self.update_task(task_id, |task| task.status = TaskStatus::Running)
                .await;
        }

        match self.process_document(document_id, force_ocr, task_id).await {
            Ok(()) => {
                if let Some(task_id) = task_id {
                    self.update_task(task_id, |task| {
                        task.status = TaskStatus::Completed;
                        task.advance("Done", PIPELINE_STEPS);
                        task.completed_at = Some(Utc::now());
                    })
                    .await;
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Document processing failed: {e}");
                let message = e.to_string();
                self.update_document(document_id, |doc| {
                    doc.processing_status = ProcessingStatus::Failed;
                    doc.error_message = Some(message.clone());
                    doc.date_modified = Utc::now();
                })
                .await;
                if let Some(task_id) = task_id {
                    self.update_task(task_id, |task| {
                        task.status = TaskStatus::Failed;
                        task.error = Some(message.clone());
                        task.completed_at = Some(Utc::now());
                    })
                    .await;
                }
                Err(e)
            }
        }
    }

    /// The shared sync/async processing path.
    async fn process_document(
        &self,
        document_id: &str,
        force_ocr: bool,
        task_id: Option<&str>,
    ) -> Result<()> {
        let (file_path, format, doc_contexts, filename) = {
            let mut documents = self.documents.write().await;
            let doc = documents
                .get_mut(document_id)
                .ok_or_else(|| KnowledgeError::NotFound(document_id.to_string()))?;
            doc.processing_status = ProcessingStatus::Processing;
            (
                PathBuf::from(&doc.file_path),
                doc.format,
                doc.contexts.clone(),
                doc.filename.clone(),
            )
        };

        if let Some(task_id) = task_id {
            self.update_task(task_id, |task| task.advance("Extracting text", 1))
                .await;
        }

        let force_ocr = force_ocr || self.settings.ocr.force_ocr;
        let extracted = self.extractor.extract(&file_path, format, force_ocr).await?;

        self.update_document(document_id, |doc| {
            doc.processing_method = Some(extracted.method);
            for (key, value) in &extracted.metadata {
                doc.metadata.insert(key.clone(), value.clone());
            }
        })
        .await;

        let non_whitespace = extracted
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .count();
        if non_whitespace < MIN_EXTRACTED_CHARS {
            log::warn!("No text extracted from {filename}");
            self.update_document(document_id, |doc| {
                doc.processing_status = ProcessingStatus::Completed;
                doc.date_modified = Utc::now();
            })
            .await;
            return Ok(());
        }

        if let Some(task_id) = task_id {
            self.update_task(task_id, |task| task.advance("Chunking text", 2))
                .await;
        }

        let chunking = &self.settings.chunking;
        let chunks = chunk_text(
            &extracted.text,
            chunking.strategy,
            chunking.chunk_size,
            chunking.chunk_overlap,
        );
        if chunks.is_empty() {
            log::warn!("No chunks created from {filename}");
            self.update_document(document_id, |doc| {
                doc.processing_status = ProcessingStatus::Completed;
                doc.date_modified = Utc::now();
            })
            .await;
            return Ok(());
        }

        if let Some(task_id) = task_id {
            self.update_task(task_id, |task| task.advance("Generating embeddings", 3))
                .await;
        }

        let embeddings = self
            .encode_blocking(chunks.clone(), self.settings.embedding.batch_size)
            .await?;
        let dimension = self.embedder.dimension();
        for vector in &embeddings {
            if vector.len() != dimension {
                return Err(KnowledgeError::Embedding(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                }));
            }
        }

        if let Some(task_id) = task_id {
            self.update_task(task_id, |task| task.advance("Storing vectors", 4))
                .await;
        }

        let provenance = {
            let documents = self.documents.read().await;
            let doc = documents
                .get(document_id)
                .ok_or_else(|| KnowledgeError::NotFound(document_id.to_string()))?;
            (
                doc.content_hash.clone(),
                doc.size_bytes,
                doc.processing_method,
            )
        };

        for context in &doc_contexts {
            let ids: Vec<String> = chunks
                .iter()
                .map(|_| format!("{context}_{}", Uuid::new_v4()))
                .collect();

            let metadatas: Vec<Map<String, Value>> = (0..chunks.len())
                .map(|chunk_index| {
                    let mut m = Map::new();
                    m.insert("document_id".into(), Value::from(document_id));
                    m.insert("filename".into(), Value::from(filename.as_str()));
                    m.insert(
                        "file_path".into(),
                        Value::from(file_path.to_string_lossy().to_string()),
                    );
                    m.insert("content_hash".into(), Value::from(provenance.0.as_str()));
                    m.insert("size_bytes".into(), Value::from(provenance.1));
                    m.insert("chunk_index".into(), Value::from(chunk_index as u64));
                    m.insert("format".into(), Value::from(format.as_str()));
                    m.insert("context".into(), Value::from(context.as_str()));
                    m.insert(
                        "processing_method".into(),
                        Value::from(
                            provenance
                                .2
                                .map(|m| m.as_str())
                                .unwrap_or("unknown"),
                        ),
                    );
                    m
                })
                .collect();

            self.store
                .add(
                    context,
                    ids,
                    embeddings.clone(),
                    chunks.clone(),
                    metadatas,
                )
                .await?;

            if let Err(e) = self.contexts.increment_document_count(context).await {
                log::warn!("Could not update document count for context '{context}': {e}");
            }
        }

        self.update_document(document_id, |doc| {
            doc.chunk_count = chunks.len();
            doc.processing_status = ProcessingStatus::Completed;
            doc.date_modified = Utc::now();
        })
        .await;

        log::info!(
            "Document processed: {filename} - {} chunks in contexts: {}",
            chunks.len(),
            doc_contexts.join(", ")
        );
        Ok(())
    }

    async fn encode_blocking(
        &self,
        texts: Vec<String>,
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed_batch(&texts, batch_size))
            .await
            .map_err(|e| KnowledgeError::Validation(format!("embedding task aborted: {e}")))?
            .map_err(KnowledgeError::from)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Natural-language search over one context or all of them.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_relevance: f32,
        filters: Option<&Map<String, Value>>,
        context: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(KnowledgeError::Validation(
                "Query cannot be empty".to_string(),
            ));
        }
        if let Some(context) = context {
            if !self.contexts.exists(context).await {
                return Err(KnowledgeError::Context(ContextError::NotFound(
                    context.to_string(),
                )));
            }
        }

        let embedder = Arc::clone(&self.embedder);
        let query_owned = query.to_string();
        let query_vector =
            tokio::task::spawn_blocking(move || embedder.embed_one(&query_owned))
                .await
                .map_err(|e| KnowledgeError::Validation(format!("embedding task aborted: {e}")))??;

        let hits = self
            .store
            .search(&query_vector, top_k, filters, context)
            .await?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|hit| {
                let relevance_score = 1.0 - hit.distance;
                if relevance_score < min_relevance {
                    return None;
                }
                let get = |key: &str| {
                    hit.metadata
                        .get(key)
                        .and_then(Value::as_str)
                        .map(|s| s.to_string())
                };
                Some(SearchResult {
                    chunk_id: hit.id,
                    document_id: get("document_id"),
                    filename: get("filename"),
                    chunk_text: hit.text,
                    relevance_score,
                    chunk_index: hit.metadata.get("chunk_index").and_then(Value::as_u64),
                    format: get("format"),
                    context: get("context"),
                    processing_method: get("processing_method"),
                })
            })
            .collect();

        let scope = context
            .map(|c| format!(" in context '{c}'"))
            .unwrap_or_else(|| " across all contexts".to_string());
        log::info!(
            "Search query '{}'{scope} returned {} results",
            query.chars().take(50).collect::<String>(),
            results.len()
        );
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Registry access
    // ------------------------------------------------------------------

    pub async fn get_document(&self, document_id: &str) -> Option<Document> {
        self.documents.read().await.get(document_id).cloned()
    }

    /// All documents, optionally restricted to one context, newest first.
    pub async fn list_documents(&self, context: Option<&str>) -> Vec<Document> {
        let documents = self.documents.read().await;
        let mut all: Vec<Document> = documents
            .values()
            .filter(|d| match context {
                Some(context) => d.contexts.iter().any(|c| c == context),
                None => true,
            })
            .cloned()
            .collect();
        all.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        all
    }

    pub async fn get_task(&self, task_id: &str) -> Option<ProcessingTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove a document and its embeddings from every context it belongs
    /// to. Returns false for unknown ids.
    pub async fn remove_document(&self, document_id: &str) -> bool {
        let document = match self.get_document(document_id).await {
            Some(doc) => doc,
            None => {
                log::warn!("Document not found: {document_id}");
                return false;
            }
        };

        for context in &document.contexts {
            let ids = self.store.ids_where(context, "document_id", document_id).await;
            if !ids.is_empty() {
                match self.store.delete(context, &ids).await {
                    Ok(removed) => log::info!(
                        "Removed {removed} embeddings for document {document_id} from context '{context}'"
                    ),
                    Err(e) => log::error!(
                        "Error removing embeddings for document {document_id} from context '{context}': {e}"
                    ),
                }
            }
            if let Err(e) = self.contexts.decrement_document_count(context).await {
                log::warn!("Could not update document count for context '{context}': {e}");
            }
        }

        self.documents.write().await.remove(document_id);
        log::info!("Removed document: {}", document.filename);
        true
    }

    /// Drop every document, task and vector. Returns the prior document
    /// count. Caller is responsible for confirmation.
    pub async fn clear(&self) -> Result<usize> {
        let count = self.documents.read().await.len();

        self.store.reset().await?;
        self.documents.write().await.clear();
        self.tasks.write().await.clear();
        self.contexts.reset_document_counts().await;

        log::info!("Cleared knowledge base: {count} documents removed");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Context management
    // ------------------------------------------------------------------

    pub async fn create_context(
        &self,
        name: &str,
        description: Option<String>,
        metadata: Map<String, Value>,
    ) -> Result<Context> {
        Ok(self.contexts.create(name, description, metadata).await?)
    }

    pub async fn list_contexts(&self) -> Vec<Context> {
        self.contexts.list().await
    }

    pub async fn get_context(&self, name: &str) -> Result<Context> {
        Ok(self.contexts.get(name).await?)
    }

    pub async fn delete_context(&self, name: &str) -> Result<()> {
        // Reserved/unknown checks run first so the collection is only
        // dropped for a deletable context.
        let context = self.contexts.get(name).await?;
        if context.is_reserved() {
            return Err(KnowledgeError::Context(ContextError::Reserved(
                name.to_string(),
            )));
        }

        if let Err(e) = self.store.delete_collection(name).await {
            log::warn!("Could not delete collection for context '{name}': {e}");
        }
        self.contexts.delete(name).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub async fn get_statistics(&self) -> Statistics {
        let documents = self.documents.read().await;

        let total_chunks: usize = documents.values().map(|d| d.chunk_count).sum();
        let total_size: u64 = documents.values().map(|d| d.size_bytes).sum();
        let completed = documents
            .values()
            .filter(|d| d.processing_status == ProcessingStatus::Completed)
            .count();
        let failed = documents
            .values()
            .filter(|d| d.processing_status == ProcessingStatus::Failed)
            .count();

        let formats = DocumentFormat::ALL
            .iter()
            .map(|format| {
                (
                    format.as_str().to_string(),
                    documents.values().filter(|d| d.format == *format).count(),
                )
            })
            .collect();

        Statistics {
            document_count: documents.len(),
            total_chunks,
            total_size_mb: total_size as f64 / (1024.0 * 1024.0),
            average_chunks_per_document: if documents.is_empty() {
                0.0
            } else {
                total_chunks as f64 / documents.len() as f64
            },
            completed,
            failed,
            formats,
        }
    }

    // ------------------------------------------------------------------
    // Startup recovery
    // ------------------------------------------------------------------

    /// Rebuild documents and contexts from the persisted embeddings. The
    /// registry itself is in-memory; the vector index is the durable state.
    async fn recover_from_store(&self) {
        for context in self.store.list_contexts().await {
            let records = self.store.get_all(Some(&context)).await;
            let mut distinct_docs: Vec<&str> = records
                .iter()
                .filter_map(|r| r.metadata.get("document_id").and_then(Value::as_str))
                .collect();
            distinct_docs.sort_unstable();
            distinct_docs.dedup();

            if let Err(e) = self.contexts.restore(&context, distinct_docs.len()).await {
                log::warn!("Could not restore context '{context}': {e}");
            }
        }

        let records = self.store.get_all(None).await;

        // Per (document, context) chunk counts; chunk_count is the
        // per-context count, identical across contexts for healthy data.
        let mut chunk_counts: HashMap<(String, String), usize> = HashMap::new();
        let mut samples: HashMap<String, Map<String, Value>> = HashMap::new();
        let mut doc_contexts: HashMap<String, Vec<String>> = HashMap::new();

        for record in &records {
            let Some(doc_id) = record.metadata.get("document_id").and_then(Value::as_str)
            else {
                continue;
            };
            let context = record
                .metadata
                .get("context")
                .and_then(Value::as_str)
                .unwrap_or(RESERVED_CONTEXT);

            *chunk_counts
                .entry((doc_id.to_string(), context.to_string()))
                .or_default() += 1;
            samples
                .entry(doc_id.to_string())
                .or_insert_with(|| record.metadata.clone());
            let contexts = doc_contexts.entry(doc_id.to_string()).or_default();
            if !contexts.iter().any(|c| c == context) {
                contexts.push(context.to_string());
            }
        }

        let mut documents = self.documents.write().await;
        for (doc_id, metadata) in samples {
            let contexts = doc_contexts.remove(&doc_id).unwrap_or_default();
            let chunk_count = contexts
                .iter()
                .filter_map(|c| chunk_counts.get(&(doc_id.clone(), c.clone())))
                .copied()
                .max()
                .unwrap_or(0);

            let get = |key: &str| {
                metadata
                    .get(key)
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            };
            let format = get("format")
                .and_then(|f| DocumentFormat::from_extension(&f))
                .unwrap_or(DocumentFormat::Pdf);
            // Legacy records may lack a size; 1 keeps the record valid.
            let size_bytes = metadata
                .get("size_bytes")
                .and_then(Value::as_u64)
                .filter(|s| *s > 0)
                .unwrap_or(1);

            let document = Document::new(
                get("filename").unwrap_or_else(|| "unknown".to_string()),
                get("file_path").unwrap_or_default(),
                get("content_hash").unwrap_or_default(),
                format,
                size_bytes,
                contexts,
                Map::new(),
            );
            match document {
                Ok(mut doc) => {
                    doc.id = doc_id.clone();
                    doc.processing_status = ProcessingStatus::Completed;
                    doc.chunk_count = chunk_count;
                    documents.insert(doc_id, doc);
                }
                Err(e) => log::warn!("Could not restore document {doc_id}: {e}"),
            }
        }

        if !documents.is_empty() {
            log::info!(
                "Loaded {} existing documents from vector store",
                documents.len()
            );
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn validate_file(&self, path: &Path) -> Result<(DocumentFormat, u64)> {
        if !path.exists() {
            return Err(KnowledgeError::Validation(format!(
                "File not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(KnowledgeError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let format = DocumentFormat::from_extension(&extension).ok_or_else(|| {
            KnowledgeError::Validation(format!(
                "Unsupported file format: .{extension}. Supported formats: {}",
                DocumentFormat::supported_extensions().join(", ")
            ))
        })?;

        let size_bytes = path.metadata()?.len();
        if size_bytes == 0 {
            return Err(KnowledgeError::Validation(format!(
                "File is empty: {}",
                path.display()
            )));
        }
        let max_bytes = self.settings.processing.max_file_size_mb * 1024 * 1024;
        if size_bytes > max_bytes {
            return Err(KnowledgeError::Validation(format!(
                "File size ({:.1} MB) exceeds maximum allowed size ({} MB)",
                size_bytes as f64 / (1024.0 * 1024.0),
                self.settings.processing.max_file_size_mb
            )));
        }

        Ok((format, size_bytes))
    }

    async fn update_document(&self, document_id: &str, f: impl FnOnce(&mut Document)) {
        let mut documents = self.documents.write().await;
        if let Some(doc) = documents.get_mut(document_id) {
            f(doc);
        }
    }

    async fn update_task(&self, task_id: &str, f: impl FnOnce(&mut ProcessingTask)) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(task_id) {
            f(task);
        }
    }
}

/// SHA-256 of the file content, read in 8 KiB blocks off the runtime.
async fn hash_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| KnowledgeError::Validation(format!("hash task aborted: {e}")))?
    .map_err(KnowledgeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"deterministic bytes").unwrap();

        let first = hash_file(path.clone()).await.unwrap();
        let second = hash_file(path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_hash_differs_for_different_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"content a").unwrap();
        std::fs::write(&b, b"content b").unwrap();

        assert_ne!(
            hash_file(a).await.unwrap(),
            hash_file(b).await.unwrap()
        );
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(
            KnowledgeError::Validation("x".to_string()).kind(),
            "ValidationError"
        );
        assert_eq!(
            KnowledgeError::NotFound("x".to_string()).kind(),
            "not_found"
        );
        assert_eq!(
            KnowledgeError::Context(ContextError::NotFound("x".to_string())).kind(),
            "ContextNotFound"
        );
    }
}
