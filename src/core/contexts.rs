//! Context Registry
//!
//! CRUD over named document collections. The `default` context always
//! exists and can be neither created nor deleted through the API.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::{Context, ModelError, RESERVED_CONTEXT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    NotFound(String),

    #[error("Context '{0}' already exists")]
    AlreadyExists(String),

    #[error("Context name '{0}' is reserved")]
    Reserved(String),

    #[error(transparent)]
    InvalidName(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, ContextError>;

// ============================================================================
// Context Service
// ============================================================================

pub struct ContextService {
    contexts: RwLock<HashMap<String, Context>>,
}

impl ContextService {
    pub fn new() -> Self {
        let mut contexts = HashMap::new();
        let default = Context::new(
            RESERVED_CONTEXT,
            Some("Default context for all documents".to_string()),
            Map::new(),
        )
        .expect("reserved context name is valid");
        contexts.insert(default.name.clone(), default);

        log::info!("Context registry initialized with default context");
        Self {
            contexts: RwLock::new(contexts),
        }
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<String>,
        metadata: Map<String, Value>,
    ) -> Result<Context> {
        let context = Context::new(name, description, metadata)?;
        if context.is_reserved() {
            return Err(ContextError::Reserved(context.name));
        }

        let mut contexts = self.contexts.write().await;
        if contexts.contains_key(&context.name) {
            return Err(ContextError::AlreadyExists(context.name));
        }

        log::info!("Created context: {}", context.name);
        contexts.insert(context.name.clone(), context.clone());
        Ok(context)
    }

    /// All contexts, `default` first, then alphabetical.
    pub async fn list(&self) -> Vec<Context> {
        let contexts = self.contexts.read().await;
        let mut all: Vec<Context> = contexts.values().cloned().collect();
        all.sort_by(|a, b| {
            let a_key = if a.name == RESERVED_CONTEXT { "" } else { &a.name };
            let b_key = if b.name == RESERVED_CONTEXT { "" } else { &b.name };
            a_key.cmp(b_key)
        });
        all
    }

    pub async fn get(&self, name: &str) -> Result<Context> {
        let contexts = self.contexts.read().await;
        contexts
            .get(name)
            .cloned()
            .ok_or_else(|| ContextError::NotFound(name.to_string()))
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.contexts.read().await.contains_key(name)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get(name)
            .ok_or_else(|| ContextError::NotFound(name.to_string()))?;
        if context.is_reserved() {
            return Err(ContextError::Reserved(name.to_string()));
        }

        contexts.remove(name);
        log::info!("Deleted context: {name}");
        Ok(())
    }

    /// Register a context discovered during startup recovery, overwriting
    /// the document count with the recovered value.
    pub async fn restore(&self, name: &str, document_count: usize) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        if !contexts.contains_key(name) {
            let context = Context::new(name, None, Map::new())?;
            contexts.insert(context.name.clone(), context);
        }
        if let Some(context) = contexts.get_mut(name) {
            context.document_count = document_count;
            context.updated_at = Utc::now();
        }
        Ok(())
    }

    pub async fn increment_document_count(&self, name: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(name)
            .ok_or_else(|| ContextError::NotFound(name.to_string()))?;
        context.document_count += 1;
        context.updated_at = Utc::now();
        Ok(())
    }

    pub async fn decrement_document_count(&self, name: &str) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .get_mut(name)
            .ok_or_else(|| ContextError::NotFound(name.to_string()))?;
        context.document_count = context.document_count.saturating_sub(1);
        context.updated_at = Utc::now();
        Ok(())
    }

    /// Zero every context's document count (used by knowledge-base clear).
    pub async fn reset_document_counts(&self) {
        let mut contexts = self.contexts.write().await;
        for context in contexts.values_mut() {
            context.document_count = 0;
            context.updated_at = Utc::now();
        }
    }
}

impl Default for ContextService {
    fn default() -> Self {
        Self::new()
    }
}
