//! Self-hosted semantic knowledge server.
//!
//! Ingests heterogeneous documents (PDF, DOCX, PPTX, XLSX, HTML, images),
//! embeds them into a multi-context vector store, and answers natural-
//! language queries over the Model Context Protocol (STDIO and Streamable
//! HTTP transports).

pub mod config;
pub mod core;
pub mod ingestion;
pub mod mcp;
