//! HTTP endpoint for chat turns.
//!
//! ## Endpoints
//!
//! - `POST /api/chat`: run one turn; streams `text/event-stream`
//! - `GET /health`: liveness probe
//!
//! Request body (camelCase):
//!
//! ```json
//! {"messages": [{"role": "user", "content": "hi"}], "systemPrompt": "...", "modelId": "Qwen/Qwen3-8B", "useTools": true}
//! ```
//!
//! Failures detected before streaming starts are answered with a non-2xx
//! status and a `{"error": ..., "details": ...}` body.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{RelayConfig, ServerConfig};
use crate::error::{RelayError, Result};
use crate::llm::client::{OpenAiCompatClient, OpenAiCompatConfig};
use crate::relay::multiplexer::{ChatTurnRequest, MultiplexerSettings, StreamMultiplexer};
use crate::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short, stable description.
    pub error: String,
    /// Underlying cause (validation message or upstream body).
    pub details: String,
}

fn error_response(status: StatusCode, error: &str, details: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: error.to_owned(),
        details: details.into(),
    };
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    /// `None` when no upstream API key is configured.
    multiplexer: Option<Arc<StreamMultiplexer>>,
}

/// Build the multiplexer described by `config`.
///
/// Returns `None` when no upstream API key is configured; the server then
/// answers every chat request with a 500.
pub fn multiplexer_from_config(config: &RelayConfig) -> Option<StreamMultiplexer> {
    let api_key = config.upstream_api_key()?;
    let client = OpenAiCompatClient::new(
        OpenAiCompatConfig::new(api_key, &config.upstream.base_url)
            .with_connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs)),
    );
    let tools = ToolRegistry::from_config(&config.tools);
    Some(StreamMultiplexer::new(
        Arc::new(client),
        Arc::new(tools),
        MultiplexerSettings {
            default_model: config.upstream.default_model.clone(),
            context: config.context.clone(),
        },
    ))
}

/// A running relay HTTP server.
pub struct RelayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RelayServer {
    /// Start the server.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and serves on a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(
        config: &ServerConfig,
        multiplexer: Option<StreamMultiplexer>,
    ) -> Result<Self> {
        if multiplexer.is_none() {
            warn!("no upstream API key configured; chat requests will fail");
        }
        let state = AppState {
            multiplexer: multiplexer.map(Arc::new),
        };

        let app = Router::new()
            .route("/api/chat", post(handle_chat))
            .route("/health", get(handle_health))
            .with_state(state);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RelayError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::Server(format!("failed to get local addr: {e}")))?;

        info!("relay server listening on {addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("relay server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("http://{}/api/chat", self.addr)
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health`.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/chat`.
async fn handle_chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Response {
    let turn = match body {
        Ok(Json(turn)) => turn,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                rejection.body_text(),
            );
        }
    };

    if turn.messages.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Messages are required",
            "the messages array is empty",
        );
    }

    let Some(multiplexer) = state.multiplexer else {
        error!("chat request rejected: upstream API key is not configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API configuration is missing on the server.",
            "no upstream API key configured",
        );
    };

    let events = match multiplexer.open(&turn).await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "upstream rejected the first request");
            let status =
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
            return error_response(status, "Upstream API error", e.message());
        }
    };

    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_bytes())));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
