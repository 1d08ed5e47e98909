//! MCP Tool Registry
//!
//! Names, human descriptions and JSON-Schema input schemas for every tool
//! the server advertises through `tools/list`.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

/// One advertised tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub static ALL_TOOLS: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    vec![
        ToolDef {
            name: "knowledge-add",
            description: "Add a document or image to the knowledge base for semantic search",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the document or image file",
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Additional metadata (author, title, tags)",
                        "default": {},
                    },
                    "force_ocr": {
                        "type": "boolean",
                        "description": "Force OCR even if text extraction available",
                        "default": false,
                    },
                    "async": {
                        "type": "boolean",
                        "description": "Process asynchronously and return task ID",
                        "default": true,
                    },
                    "contexts": {
                        "type": "string",
                        "description": "Comma-separated context names to add the document to",
                        "default": "default",
                    },
                },
                "required": ["file_path"],
            }),
        },
        ToolDef {
            name: "knowledge-search",
            description: "Search the knowledge base using natural language query",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language search query",
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results to return",
                        "default": 10,
                        "minimum": 1,
                        "maximum": 50,
                    },
                    "min_relevance": {
                        "type": "number",
                        "description": "Minimum relevance score threshold (0.0 to 1.0)",
                        "default": 0.0,
                        "minimum": 0.0,
                        "maximum": 1.0,
                    },
                    "context": {
                        "type": "string",
                        "description": "Restrict the search to one context",
                    },
                },
                "required": ["query"],
            }),
        },
        ToolDef {
            name: "knowledge-show",
            description: "List all documents in the knowledge base",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of documents to return",
                        "default": 100,
                    },
                    "context": {
                        "type": "string",
                        "description": "Only list documents in this context",
                    },
                },
            }),
        },
        ToolDef {
            name: "knowledge-remove",
            description: "Remove a specific document from the knowledge base",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "ID of the document to remove",
                    },
                    "confirm": {
                        "type": "boolean",
                        "description": "Confirmation flag for destructive operation",
                        "default": false,
                    },
                },
                "required": ["document_id", "confirm"],
            }),
        },
        ToolDef {
            name: "knowledge-clear",
            description: "Clear all documents from the knowledge base",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "confirm": {
                        "type": "boolean",
                        "description": "Confirmation flag for destructive operation",
                        "default": false,
                    },
                },
                "required": ["confirm"],
            }),
        },
        ToolDef {
            name: "knowledge-status",
            description: "Get knowledge base statistics and status",
            input_schema: json!({
                "type": "object",
                "properties": {},
            }),
        },
        ToolDef {
            name: "knowledge-task-status",
            description: "Get status of an async processing task",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": {
                        "type": "string",
                        "description": "Task ID from async operation",
                    },
                },
                "required": ["task_id"],
            }),
        },
        ToolDef {
            name: "knowledge-context-create",
            description: "Create a new context (isolated document collection)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Context name (alphanumeric, dash, underscore; 1-64 chars)",
                    },
                    "description": {
                        "type": "string",
                        "description": "Optional human-readable description",
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Additional context metadata",
                        "default": {},
                    },
                },
                "required": ["name"],
            }),
        },
        ToolDef {
            name: "knowledge-context-list",
            description: "List all contexts",
            input_schema: json!({
                "type": "object",
                "properties": {},
            }),
        },
        ToolDef {
            name: "knowledge-context-show",
            description: "Show details of a context and its documents",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Context name",
                    },
                },
                "required": ["name"],
            }),
        },
        ToolDef {
            name: "knowledge-context-delete",
            description: "Delete a context and all its vectors",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Context name to delete",
                    },
                    "confirm": {
                        "type": "boolean",
                        "description": "Confirmation flag for destructive operation",
                        "default": false,
                    },
                },
                "required": ["name", "confirm"],
            }),
        },
    ]
});

/// The `tools/list` result payload.
pub fn tools_list() -> Value {
    let tools: Vec<Value> = ALL_TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}
