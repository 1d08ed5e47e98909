//! Core services: data models, embeddings, the vector store, context
//! management, and the knowledge service that ties them together.

pub mod contexts;
pub mod embedding;
pub mod knowledge_service;
pub mod models;
pub mod vector_store;
