//! JSON-RPC Dispatch
//!
//! Protocol-level message handling shared by the STDIO and HTTP transports:
//! `initialize`, `tools/list` and `tools/call`, plus the per-tool handlers
//! that translate knowledge-service results into response envelopes.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::core::knowledge_service::{AddOptions, AddOutcome, KnowledgeService};
use crate::core::models::RESERVED_CONTEXT;

use super::tools::{tools_list, ALL_TOOLS};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "knowledge-server";
pub const SERVER_VERSION: &str = "1.0.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;

// ============================================================================
// Response Builders
// ============================================================================

pub fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

pub fn parse_error_response() -> Value {
    rpc_error(Value::Null, PARSE_ERROR, "Parse error")
}

// ============================================================================
// MCP Server
// ============================================================================

/// JSON-RPC dispatcher bound to one knowledge service.
#[derive(Clone)]
pub struct McpServer {
    service: Arc<KnowledgeService>,
}

impl McpServer {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<KnowledgeService> {
        &self.service
    }

    /// Handle a request body: one message or a batch. Returns `None` when
    /// nothing needs to be sent back (notifications only).
    pub async fn handle_body(&self, body: &Value) -> Option<Value> {
        match body {
            Value::Array(messages) => {
                if messages.is_empty() {
                    return Some(rpc_error(Value::Null, INVALID_REQUEST, "Invalid Request"));
                }
                let mut responses = Vec::new();
                for message in messages {
                    if let Some(response) = self.handle_message(message).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Value::Array(responses))
                }
            }
            _ => self.handle_message(body).await,
        }
    }

    /// Handle a single JSON-RPC message. Notifications and client responses
    /// yield `None`.
    pub async fn handle_message(&self, message: &Value) -> Option<Value> {
        let Some(obj) = message.as_object() else {
            return Some(rpc_error(Value::Null, INVALID_REQUEST, "Invalid Request"));
        };

        let id = obj.get("id").cloned();
        let method = obj.get("method").and_then(Value::as_str);

        let Some(method) = method else {
            // A response from the client (has result/error) needs no reply;
            // anything else is malformed.
            if obj.contains_key("result") || obj.contains_key("error") {
                return None;
            }
            return Some(rpc_error(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Invalid Request",
            ));
        };

        // Requests carry an id; notifications do not and get no reply.
        let Some(id) = id else {
            log::debug!("Ignoring notification: {method}");
            return None;
        };

        let empty = Value::Object(Map::new());
        let params = obj.get("params").unwrap_or(&empty);

        match method {
            "initialize" => Some(rpc_result(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                }),
            )),
            "tools/list" => Some(rpc_result(id, tools_list())),
            "tools/call" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));

                match self.call_tool(name, &arguments).await {
                    Some(result) => {
                        let text = serde_json::to_string_pretty(&result)
                            .unwrap_or_else(|_| result.to_string());
                        Some(rpc_result(
                            id,
                            json!({
                                "content": [{ "type": "text", "text": text }],
                            }),
                        ))
                    }
                    None => Some(rpc_error(
                        id,
                        METHOD_NOT_FOUND,
                        format!("Unknown tool: {name}"),
                    )),
                }
            }
            other => Some(rpc_error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    /// Dispatch a tool call by name. `None` means the tool does not exist;
    /// handler failures are reported inside the result envelope.
    pub async fn call_tool(&self, name: &str, args: &Value) -> Option<Value> {
        if !ALL_TOOLS.iter().any(|t| t.name == name) {
            return None;
        }

        let result = match name {
            "knowledge-add" => self.handle_add(args).await,
            "knowledge-search" => self.handle_search(args).await,
            "knowledge-show" => self.handle_show(args).await,
            "knowledge-remove" => self.handle_remove(args).await,
            "knowledge-clear" => self.handle_clear(args).await,
            "knowledge-status" => self.handle_status().await,
            "knowledge-task-status" => self.handle_task_status(args).await,
            "knowledge-context-create" => self.handle_context_create(args).await,
            "knowledge-context-list" => self.handle_context_list().await,
            "knowledge-context-show" => self.handle_context_show(args).await,
            "knowledge-context-delete" => self.handle_context_delete(args).await,
            _ => unreachable!("registry checked above"),
        };
        Some(result)
    }

    // ------------------------------------------------------------------
    // Tool handlers
    // ------------------------------------------------------------------

    async fn handle_add(&self, args: &Value) -> Value {
        let Some(file_path) = args.get("file_path").and_then(Value::as_str) else {
            return missing_argument("file_path");
        };
        let metadata = args
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let async_processing = args.get("async").and_then(Value::as_bool).unwrap_or(true);
        let force_ocr = args.get("force_ocr").and_then(Value::as_bool).unwrap_or(false);
        let contexts: Vec<String> = args
            .get("contexts")
            .and_then(Value::as_str)
            .unwrap_or(RESERVED_CONTEXT)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let options = AddOptions {
            metadata,
            async_processing,
            force_ocr,
            contexts,
        };

        match self
            .service
            .add_document(&PathBuf::from(file_path), options)
            .await
        {
            Ok(AddOutcome::Queued { task_id, document_id }) => json!({
                "success": true,
                "task_id": task_id,
                "document_id": document_id,
                "message": "Document queued for processing",
                "force_ocr": force_ocr,
            }),
            Ok(AddOutcome::Completed { document_id })
            | Ok(AddOutcome::Duplicate { document_id }) => {
                let document = self.service.get_document(&document_id).await;
                json!({
                    "success": true,
                    "document_id": document_id,
                    "filename": document.as_ref().map(|d| d.filename.clone()),
                    "chunks_created": document.as_ref().map(|d| d.chunk_count).unwrap_or(0),
                    "processing_method": document
                        .as_ref()
                        .and_then(|d| d.processing_method)
                        .map(|m| m.as_str()),
                })
            }
            Err(e) => error_envelope(&e),
        }
    }

    async fn handle_search(&self, args: &Value) -> Value {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return missing_argument("query");
        };
        let top_k = args.get("top_k").and_then(Value::as_u64).unwrap_or(10) as usize;
        let min_relevance = args
            .get("min_relevance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as f32;
        let context = args.get("context").and_then(Value::as_str);

        match self
            .service
            .search(query, top_k, min_relevance, None, context)
            .await
        {
            Ok(results) => json!({
                "success": true,
                "query": query,
                "total_results": results.len(),
                "results": results,
            }),
            Err(e) => error_envelope(&e),
        }
    }

    async fn handle_show(&self, args: &Value) -> Value {
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
        let context = args.get("context").and_then(Value::as_str);

        let all = self.service.list_documents(context).await;
        let documents: Vec<Value> = all
            .iter()
            .take(limit)
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "filename": doc.filename,
                    "format": doc.format.as_str(),
                    "size_bytes": doc.size_bytes,
                    "chunk_count": doc.chunk_count,
                    "processing_status": doc.processing_status,
                    "processing_method": doc.processing_method.map(|m| m.as_str()),
                    "contexts": doc.contexts,
                    "date_added": doc.date_added.to_rfc3339(),
                    "ocr_used": doc.metadata.get("ocr_used").cloned().unwrap_or(json!(false)),
                    "ocr_confidence": doc.metadata.get("ocr_confidence").cloned(),
                })
            })
            .collect();

        json!({
            "success": true,
            "total_count": all.len(),
            "documents": documents,
        })
    }

    async fn handle_remove(&self, args: &Value) -> Value {
        if !confirmed(args) {
            return confirmation_required("Set confirm=true to remove document");
        }
        let Some(document_id) = args.get("document_id").and_then(Value::as_str) else {
            return missing_argument("document_id");
        };

        let Some(document) = self.service.get_document(document_id).await else {
            return json!({
                "success": false,
                "error": "not_found",
                "message": format!("Document not found: {document_id}"),
            });
        };

        self.service.remove_document(document_id).await;
        json!({
            "success": true,
            "message": format!("Removed document: {}", document.filename),
            "chunks_removed": document.chunk_count,
        })
    }

    async fn handle_clear(&self, args: &Value) -> Value {
        if !confirmed(args) {
            return confirmation_required("Set confirm=true to clear knowledge base");
        }

        match self.service.clear().await {
            Ok(count) => json!({
                "success": true,
                "message": format!("Cleared knowledge base: {count} documents removed"),
                "documents_removed": count,
            }),
            Err(e) => error_envelope(&e),
        }
    }

    async fn handle_status(&self) -> Value {
        let stats = self.service.get_statistics().await;
        json!({
            "success": true,
            "knowledge_base": {
                "name": "default",
                "document_count": stats.document_count,
                "total_chunks": stats.total_chunks,
                "total_size_mb": stats.total_size_mb,
                "average_chunks_per_document": stats.average_chunks_per_document,
                "completed": stats.completed,
                "failed": stats.failed,
                "formats": stats.formats,
            },
            "health": {
                "status": "healthy",
                "vector_db_connected": true,
                "embedding_model_loaded": true,
            },
        })
    }

    async fn handle_task_status(&self, args: &Value) -> Value {
        let Some(task_id) = args.get("task_id").and_then(Value::as_str) else {
            return missing_argument("task_id");
        };

        match self.service.get_task(task_id).await {
            Some(task) => json!({
                "success": true,
                "task_id": task.task_id,
                "document_id": task.document_id,
                "status": task.status.as_str(),
                "progress": task.progress,
                "current_step": task.current_step,
                "error": task.error,
            }),
            None => json!({
                "success": false,
                "error": "not_found",
                "message": format!("Task not found: {task_id}"),
            }),
        }
    }

    async fn handle_context_create(&self, args: &Value) -> Value {
        let Some(name) = args.get("name").and_then(Value::as_str) else {
            return missing_argument("name");
        };
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let metadata = args
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match self.service.create_context(name, description, metadata).await {
            Ok(context) => json!({
                "success": true,
                "context": context_json(&context),
            }),
            Err(e) => error_envelope(&e),
        }
    }

    async fn handle_context_list(&self) -> Value {
        let contexts = self.service.list_contexts().await;
        json!({
            "success": true,
            "total_count": contexts.len(),
            "contexts": contexts.iter().map(context_json).collect::<Vec<_>>(),
        })
    }

    async fn handle_context_show(&self, args: &Value) -> Value {
        let Some(name) = args.get("name").and_then(Value::as_str) else {
            return missing_argument("name");
        };

        match self.service.get_context(name).await {
            Ok(context) => {
                let documents: Vec<Value> = self
                    .service
                    .list_documents(Some(name))
                    .await
                    .iter()
                    .map(|doc| {
                        json!({
                            "id": doc.id,
                            "filename": doc.filename,
                            "chunk_count": doc.chunk_count,
                        })
                    })
                    .collect();
                json!({
                    "success": true,
                    "context": context_json(&context),
                    "documents": documents,
                })
            }
            Err(e) => error_envelope(&e),
        }
    }

    async fn handle_context_delete(&self, args: &Value) -> Value {
        if !confirmed(args) {
            return confirmation_required("Set confirm=true to delete context");
        }
        let Some(name) = args.get("name").and_then(Value::as_str) else {
            return missing_argument("name");
        };

        match self.service.delete_context(name).await {
            Ok(()) => json!({
                "success": true,
                "message": format!("Context '{name}' deleted successfully"),
            }),
            Err(e) => error_envelope(&e),
        }
    }
}

// ============================================================================
// Envelope Helpers
// ============================================================================

fn confirmed(args: &Value) -> bool {
    args.get("confirm").and_then(Value::as_bool).unwrap_or(false)
}

fn confirmation_required(message: &str) -> Value {
    json!({
        "success": false,
        "error": "confirmation_required",
        "message": message,
    })
}

fn missing_argument(name: &str) -> Value {
    json!({
        "success": false,
        "error": "invalid_arguments",
        "message": format!("Missing required argument: {name}"),
    })
}

fn error_envelope(error: &crate::core::knowledge_service::KnowledgeError) -> Value {
    json!({
        "success": false,
        "error": error.kind(),
        "message": error.to_string(),
    })
}

fn context_json(context: &crate::core::models::Context) -> Value {
    json!({
        "name": context.name,
        "description": context.description,
        "document_count": context.document_count,
        "created_at": context.created_at.to_rfc3339(),
        "updated_at": context.updated_at.to_rfc3339(),
        "metadata": context.metadata,
    })
}
