use std::sync::Arc;

use knowledge_server::config::{Settings, Transport};
use knowledge_server::core::embedding::FastEmbedder;
use knowledge_server::core::knowledge_service::KnowledgeService;
use knowledge_server::mcp::http::create_router;
use knowledge_server::mcp::protocol::McpServer;
use knowledge_server::mcp::stdio;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("Fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load()?;
    settings.ensure_directories()?;

    log::info!("Starting MCP Knowledge Server...");

    // Model load is CPU and IO heavy; keep it off the async runtime.
    let model_name = settings.embedding.model_name.clone();
    let cache_dir = settings.storage.model_cache_path.clone();
    let embedder =
        tokio::task::spawn_blocking(move || FastEmbedder::load(&model_name, &cache_dir))
            .await??;

    let transport = settings.mcp.transport;
    let host = settings.mcp.host.clone();
    let port = settings.mcp.port;
    let strict_sessions = settings.mcp.strict_sessions;

    let service = KnowledgeService::new(settings, Arc::new(embedder)).await?;
    let server = McpServer::new(service);

    match transport {
        Transport::Stdio => {
            stdio::run(server).await?;
        }
        Transport::Http | Transport::HttpStreamable => {
            let router = create_router(server, strict_sessions);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            log::info!("MCP endpoint: http://{addr}/mcp");
            axum::serve(listener, router).await?;
        }
        Transport::Websocket => {
            return Err("mcp.transport = \"websocket\" is not supported; \
                        use stdio, http or http-streamable"
                .into());
        }
    }

    Ok(())
}
