//! End-to-end knowledge workflows: ingest, search, dedup, multi-context
//! membership, confirmation gates, clearing, and startup recovery.

mod common;

use knowledge_server::core::knowledge_service::{AddOptions, AddOutcome};
use knowledge_server::core::models::{ProcessingStatus, TaskStatus};
use knowledge_server::mcp::protocol::McpServer;
use serde_json::json;

use common::{test_service, write_html};

fn sync_options(contexts: &[&str]) -> AddOptions {
    AddOptions {
        async_processing: false,
        contexts: contexts.iter().map(|s| s.to_string()).collect(),
        ..AddOptions::default()
    }
}

#[tokio::test]
async fn ingest_then_search_returns_relevant_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let path = write_html(
        dir.path(),
        "neural.html",
        "Neural networks are computational models inspired by biological neurons.",
    );

    let outcome = service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();
    let AddOutcome::Completed { document_id } = outcome else {
        panic!("expected sync completion, got {outcome:?}");
    };

    let document = service.get_document(&document_id).await.unwrap();
    assert_eq!(document.processing_status, ProcessingStatus::Completed);
    assert!(document.chunk_count >= 1);

    let results = service
        .search("neural networks", 5, 0.0, None, None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].chunk_text.to_lowercase().contains("neural"));
    assert!(results[0].relevance_score > 0.5);
}

#[tokio::test]
async fn exact_chunk_text_query_scores_near_one() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let body = "Vector indexes answer nearest neighbour queries over embeddings.";
    let path = write_html(dir.path(), "roundtrip.html", body);
    service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();

    let results = service.search(body, 5, 0.0, None, None).await.unwrap();
    assert!(!results.is_empty());
    assert!(
        results[0].relevance_score >= 0.99,
        "expected round-trip relevance >= 0.99, got {}",
        results[0].relevance_score
    );
}

#[tokio::test]
async fn duplicate_content_returns_same_document_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let path = write_html(dir.path(), "dup.html", "Same bytes both times, long enough.");

    let first = service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();
    let AddOutcome::Completed { document_id: first_id } = first else {
        panic!("expected completion");
    };

    let chunks_before = service.get_statistics().await.total_chunks;

    let second = service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();
    let AddOutcome::Duplicate { document_id: second_id } = second else {
        panic!("expected duplicate, got {second:?}");
    };

    assert_eq!(first_id, second_id);
    assert_eq!(service.list_documents(None).await.len(), 1);
    assert_eq!(service.get_statistics().await.total_chunks, chunks_before);
}

#[tokio::test]
async fn multi_context_document_is_searchable_per_context_and_merged() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    service
        .create_context("aws", None, Default::default())
        .await
        .unwrap();
    service
        .create_context("healthcare", None, Default::default())
        .await
        .unwrap();

    let path = write_html(
        dir.path(),
        "shared.html",
        "Compliance rules for cloud storage of patient records.",
    );
    let outcome = service
        .add_document(&path, sync_options(&["aws", "healthcare"]))
        .await
        .unwrap();
    let AddOutcome::Completed { document_id } = outcome else {
        panic!("expected completion");
    };
    let document = service.get_document(&document_id).await.unwrap();

    let aws_hits = service
        .search("patient records", 10, 0.0, None, Some("aws"))
        .await
        .unwrap();
    assert!(!aws_hits.is_empty());
    assert_eq!(aws_hits[0].context.as_deref(), Some("aws"));

    let health_hits = service
        .search("patient records", 10, 0.0, None, Some("healthcare"))
        .await
        .unwrap();
    assert!(!health_hits.is_empty());
    assert_eq!(health_hits[0].context.as_deref(), Some("healthcare"));

    // Per-context embedding count equals chunk_count for every context the
    // document belongs to.
    for context in ["aws", "healthcare"] {
        let hits = service
            .search("patient records", 100, 0.0, None, Some(context))
            .await
            .unwrap();
        let for_doc = hits
            .iter()
            .filter(|h| h.document_id.as_deref() == Some(document_id.as_str()))
            .count();
        assert_eq!(for_doc, document.chunk_count);
    }

    // The cross-context merge keeps one hit per containing context.
    let merged = service
        .search("patient records", 20, 0.0, None, None)
        .await
        .unwrap();
    let texts: Vec<&str> = merged
        .iter()
        .filter(|h| h.document_id.as_deref() == Some(document_id.as_str()))
        .map(|h| h.chunk_text.as_str())
        .collect();
    assert_eq!(texts.len(), 2 * document.chunk_count);

    let contexts: Vec<&str> = merged
        .iter()
        .filter_map(|h| h.context.as_deref())
        .collect();
    assert!(contexts.contains(&"aws"));
    assert!(contexts.contains(&"healthcare"));
}

#[tokio::test]
async fn unknown_context_rejected_for_add_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let path = write_html(dir.path(), "orphan.html", "Document body for the test.");
    let err = service
        .add_document(&path, sync_options(&["missing"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ContextNotFound");

    let err = service
        .search("anything", 5, 0.0, None, Some("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ContextNotFound");
}

#[tokio::test]
async fn empty_query_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let err = service.search("   ", 5, 0.0, None, None).await.unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[tokio::test]
async fn tiny_extracted_text_completes_with_zero_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    // Nine non-whitespace characters: under the 10-character floor.
    let path = write_html(dir.path(), "tiny.html", "ab cd ef g hi");
    let outcome = service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();
    let AddOutcome::Completed { document_id } = outcome else {
        panic!("expected completion");
    };

    let document = service.get_document(&document_id).await.unwrap();
    assert_eq!(document.processing_status, ProcessingStatus::Completed);
    assert_eq!(document.chunk_count, 0);

    // And nothing was written to the index.
    let results = service.search("ab", 10, 0.0, None, None).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn async_add_reports_task_progress() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;

    let path = write_html(
        dir.path(),
        "async.html",
        "Background ingestion processes documents without blocking the caller.",
    );
    let outcome = service
        .add_document(
            &path,
            AddOptions {
                async_processing: true,
                ..AddOptions::default()
            },
        )
        .await
        .unwrap();
    let AddOutcome::Queued { task_id, document_id } = outcome else {
        panic!("expected queued outcome, got {outcome:?}");
    };

    // Poll until the background pipeline finishes.
    let mut task = None;
    for _ in 0..200 {
        let snapshot = service.get_task(&task_id).await.unwrap();
        if matches!(snapshot.status, TaskStatus::Completed | TaskStatus::Failed) {
            task = Some(snapshot);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let task = task.expect("task did not finish in time");

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 1.0);
    assert_eq!(task.completed_steps, task.total_steps);
    assert!(task.completed_at.is_some());

    let document = service.get_document(&document_id).await.unwrap();
    assert_eq!(document.processing_status, ProcessingStatus::Completed);
    assert!(document.chunk_count >= 1);
}

#[tokio::test]
async fn remove_tool_enforces_confirmation_and_reports_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;
    let server = McpServer::new(service.clone());

    // No confirm flag: gate closes regardless of the id.
    let result = server
        .call_tool("knowledge-remove", &json!({"document_id": "X"}))
        .await
        .unwrap();
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["error"], json!("confirmation_required"));

    // Confirmed but unknown id.
    let result = server
        .call_tool(
            "knowledge-remove",
            &json!({"document_id": "X", "confirm": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["error"], json!("not_found"));

    // Confirmed on a real document.
    let path = write_html(dir.path(), "removable.html", "Chunks that will be removed soon.");
    let outcome = service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();
    let AddOutcome::Completed { document_id } = outcome else {
        panic!("expected completion");
    };
    let chunk_count = service
        .get_document(&document_id)
        .await
        .unwrap()
        .chunk_count;

    let result = server
        .call_tool(
            "knowledge-remove",
            &json!({"document_id": document_id, "confirm": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["chunks_removed"], json!(chunk_count));
    assert!(service.get_document(&document_id).await.is_none());

    // Embeddings are gone from the index too.
    let results = service.search("removed", 10, 0.0, None, None).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn clear_requires_confirmation_and_zeroes_counts() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;
    let server = McpServer::new(service.clone());

    service
        .create_context("workspace", None, Default::default())
        .await
        .unwrap();
    let path = write_html(dir.path(), "doomed.html", "Everything here will be cleared.");
    service
        .add_document(&path, sync_options(&["workspace"]))
        .await
        .unwrap();

    let result = server.call_tool("knowledge-clear", &json!({})).await.unwrap();
    assert_eq!(result["error"], json!("confirmation_required"));
    assert_eq!(service.list_documents(None).await.len(), 1);

    let result = server
        .call_tool("knowledge-clear", &json!({"confirm": true}))
        .await
        .unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["documents_removed"], json!(1));

    assert!(service.list_documents(None).await.is_empty());
    for context in service.list_contexts().await {
        assert_eq!(context.document_count, 0);
    }
}

#[tokio::test]
async fn context_tools_cover_crud_and_reserved_names() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;
    let server = McpServer::new(service.clone());

    let result = server
        .call_tool("knowledge-context-create", &json!({"name": "projects"}))
        .await
        .unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["context"]["name"], json!("projects"));

    // Reserved and duplicate names are rejected.
    let result = server
        .call_tool("knowledge-context-create", &json!({"name": "default"}))
        .await
        .unwrap();
    assert_eq!(result["success"], json!(false));
    let result = server
        .call_tool("knowledge-context-create", &json!({"name": "projects"}))
        .await
        .unwrap();
    assert_eq!(result["error"], json!("ContextAlreadyExists"));

    // default sorts first in the listing.
    let result = server.call_tool("knowledge-context-list", &json!({})).await.unwrap();
    let contexts = result["contexts"].as_array().unwrap();
    assert_eq!(contexts[0]["name"], json!("default"));

    // Delete needs confirmation, refuses the reserved name, then works.
    let result = server
        .call_tool("knowledge-context-delete", &json!({"name": "projects"}))
        .await
        .unwrap();
    assert_eq!(result["error"], json!("confirmation_required"));

    let result = server
        .call_tool(
            "knowledge-context-delete",
            &json!({"name": "default", "confirm": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["error"], json!("ReservedContext"));

    let result = server
        .call_tool(
            "knowledge-context-delete",
            &json!({"name": "projects", "confirm": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["success"], json!(true));
    assert!(service.get_context("projects").await.is_err());
}

#[tokio::test]
async fn registry_recovers_from_vector_store_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (document_id, chunk_count) = {
        let service = test_service(dir.path()).await;
        service
            .create_context("archive", None, Default::default())
            .await
            .unwrap();
        let path = write_html(
            dir.path(),
            "durable.html",
            "Documents survive a restart through the persisted vector index.",
        );
        let outcome = service
            .add_document(&path, sync_options(&["archive"]))
            .await
            .unwrap();
        let AddOutcome::Completed { document_id } = outcome else {
            panic!("expected completion");
        };
        let chunk_count = service
            .get_document(&document_id)
            .await
            .unwrap()
            .chunk_count;
        (document_id, chunk_count)
    };

    // Fresh service over the same storage: documents and contexts come back.
    let restarted = test_service(dir.path()).await;
    let recovered = restarted
        .get_document(&document_id)
        .await
        .expect("document recovered from store");
    assert_eq!(recovered.processing_status, ProcessingStatus::Completed);
    assert_eq!(recovered.chunk_count, chunk_count);
    assert_eq!(recovered.contexts, vec!["archive".to_string()]);

    let archive = restarted.get_context("archive").await.unwrap();
    assert_eq!(archive.document_count, 1);

    // And the recovered corpus is still searchable.
    let results = restarted
        .search("restart", 5, 0.0, None, Some("archive"))
        .await
        .unwrap();
    assert!(!results.is_empty());
}

#[tokio::test]
async fn status_tool_reports_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path()).await;
    let server = McpServer::new(service.clone());

    let path = write_html(dir.path(), "counted.html", "A document that shows up in statistics.");
    service
        .add_document(&path, sync_options(&["default"]))
        .await
        .unwrap();

    let result = server.call_tool("knowledge-status", &json!({})).await.unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["knowledge_base"]["document_count"], json!(1));
    assert_eq!(result["knowledge_base"]["formats"]["html"], json!(1));
    assert!(result["knowledge_base"]["total_chunks"].as_u64().unwrap() >= 1);
    assert_eq!(result["health"]["status"], json!("healthy"));
}

#[tokio::test]
async fn oversize_and_unsupported_files_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = common::test_settings(dir.path());
    settings.processing.max_file_size_mb = 1;
    let service = knowledge_server::core::knowledge_service::KnowledgeService::new(
        settings,
        std::sync::Arc::new(common::HashEmbedder::new()),
    )
    .await
    .unwrap();

    // Unsupported extension.
    let exe = dir.path().join("binary.exe");
    std::fs::write(&exe, b"MZ").unwrap();
    let err = service
        .add_document(&exe, sync_options(&["default"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");

    // Empty file.
    let empty = dir.path().join("empty.html");
    std::fs::write(&empty, b"").unwrap();
    let err = service
        .add_document(&empty, sync_options(&["default"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");

    // Exactly at the limit passes validation; one byte over fails.
    let limit = 1024 * 1024;
    let at_limit = dir.path().join("at-limit.html");
    std::fs::write(&at_limit, vec![b'x'; limit]).unwrap();
    assert!(service
        .add_document(&at_limit, sync_options(&["default"]))
        .await
        .is_ok());

    let over = dir.path().join("over.html");
    std::fs::write(&over, vec![b'x'; limit + 1]).unwrap();
    let err = service
        .add_document(&over, sync_options(&["default"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}
