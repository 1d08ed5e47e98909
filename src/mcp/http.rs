//! Streamable HTTP Transport
//!
//! A single `/mcp` endpoint implementing the MCP Streamable HTTP contract:
//!
//! - `POST /mcp`: JSON-RPC message or batch. Localhost-only Origin check,
//!   202 for notification-only bodies, session mint on `initialize`, and
//!   SSE responses when the client accepts `text/event-stream`.
//! - `GET /mcp`: server-initiated SSE stream with a 30 s `ping` keep-alive.
//! - `DELETE /mcp`: session termination.
//!
//! By default a POST carrying an unknown session id creates the session on
//! demand; `mcp.strict_sessions` switches that to a 404.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::protocol::{rpc_error, McpServer, PARSE_ERROR};

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Interval between `ping` events on the server-initiated stream.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone)]
pub struct Session {
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_activity: now,
        }
    }
}

/// 32 random bytes, URL-safe base64 (43 chars, 256 bits of entropy).
fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ============================================================================
// Router
// ============================================================================

#[derive(Clone)]
struct AppState {
    mcp: McpServer,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    strict_sessions: bool,
}

pub fn create_router(mcp: McpServer, strict_sessions: bool) -> Router {
    let state = AppState {
        mcp,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        strict_sessions,
    };
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(response) = reject_bad_origin(&headers) {
        return response;
    }

    let body: Value = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(e) => {
            log::error!("Invalid JSON: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(rpc_error(Value::Null, PARSE_ERROR, "Parse error")),
            )
                .into_response();
        }
    };

    let mut session_id = header_value(&headers, SESSION_HEADER);

    // A supplied but unknown session is created on demand unless strict
    // session handling is configured.
    if let Some(sid) = &session_id {
        let mut sessions = state.sessions.write().await;
        if !sessions.contains_key(sid) {
            if state.strict_sessions {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "Session not found" })),
                )
                    .into_response();
            }
            sessions.insert(sid.clone(), Session::new());
            log::info!("Created session on demand: {sid}");
        }
    }

    let is_init = is_initialize(&body);
    if is_init && session_id.is_none() {
        let sid = new_session_id();
        state
            .sessions
            .write()
            .await
            .insert(sid.clone(), Session::new());
        log::info!("Created new session: {sid}");
        session_id = Some(sid);
    }

    if let Some(sid) = &session_id {
        if let Some(session) = state.sessions.write().await.get_mut(sid) {
            session.last_activity = Utc::now();
        }
    }

    if !has_requests(&body) {
        // Only notifications/responses: accepted, nothing to send back.
        return StatusCode::ACCEPTED.into_response();
    }

    let accepts_sse = header_value(&headers, header::ACCEPT.as_str())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);

    if accepts_sse {
        let response = state.mcp.handle_body(&body).await.unwrap_or(Value::Null);
        let payload =
            serde_json::to_string(&response).unwrap_or_else(|_| Value::Null.to_string());
        let stream = async_stream::stream! {
            yield Ok::<Event, Infallible>(Event::default().event("message").data(payload));
        };
        let mut response = Sse::new(stream).into_response();
        attach_session_header(&mut response, session_id.as_deref());
        return response;
    }

    let response_body = state.mcp.handle_body(&body).await.unwrap_or(Value::Null);
    let mut response = Json(response_body).into_response();
    if is_init {
        attach_session_header(&mut response, session_id.as_deref());
    }
    response
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(response) = reject_bad_origin(&headers) {
        return response;
    }

    let accepts_sse = header_value(&headers, header::ACCEPT.as_str())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);
    if !accepts_sse {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let known = match header_value(&headers, SESSION_HEADER) {
        Some(sid) => state.sessions.read().await.contains_key(&sid),
        None => false,
    };
    if !known {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Session not found" })),
        )
            .into_response();
    }

    // Server-initiated stream: currently keep-alive pings only. The stream
    // ends when the client disconnects.
    let stream = async_stream::stream! {
        loop {
            tokio::time::sleep(KEEP_ALIVE_INTERVAL).await;
            yield Ok::<Event, Infallible>(Event::default().event("ping").data(""));
        }
    };
    Sse::new(stream).into_response()
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_value(&headers, SESSION_HEADER) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if state.sessions.write().await.remove(&session_id).is_some() {
        log::info!("Terminated session: {session_id}");
        StatusCode::OK.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Session not found" })),
        )
            .into_response()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// DNS-rebinding protection: when an Origin header is present it must name a
/// localhost origin.
fn is_valid_origin(origin: &str) -> bool {
    ["localhost", "127.0.0.1", "[::1]"]
        .iter()
        .any(|host| origin.contains(host))
}

fn reject_bad_origin(headers: &HeaderMap) -> Option<Response> {
    let origin = header_value(headers, header::ORIGIN.as_str())?;
    if is_valid_origin(&origin) {
        return None;
    }
    Some(
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid origin" })),
        )
            .into_response(),
    )
}

fn attach_session_header(response: &mut Response, session_id: Option<&str>) {
    if let Some(sid) = session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
}

fn is_initialize(body: &Value) -> bool {
    match body {
        Value::Object(obj) => obj.get("method").and_then(Value::as_str) == Some("initialize"),
        Value::Array(messages) => messages.iter().any(is_initialize),
        _ => false,
    }
}

/// Whether the body contains at least one request (method + id), as opposed
/// to only notifications/responses.
fn has_requests(body: &Value) -> bool {
    match body {
        Value::Object(obj) => obj.get("method").is_some() && obj.contains_key("id"),
        Value::Array(messages) => messages.iter().any(has_requests),
        _ => false,
    }
}
