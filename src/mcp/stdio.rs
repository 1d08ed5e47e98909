//! STDIO Transport
//!
//! Newline-delimited JSON-RPC over stdin/stdout for a single, ordered
//! client. Notifications produce no output line; EOF ends the loop.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::protocol::{parse_error_response, McpServer};

pub async fn run(server: McpServer) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    log::info!("MCP server listening on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(body) => server.handle_body(&body).await,
            Err(e) => {
                log::error!("Invalid JSON on stdin: {e}");
                Some(parse_error_response())
            }
        };

        if let Some(response) = response {
            let serialized = serde_json::to_string(&response)
                .unwrap_or_else(|_| parse_error_response().to_string());
            stdout.write_all(serialized.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    log::info!("stdin closed, shutting down");
    Ok(())
}
