//! HTTP transport from the client to the relay endpoint.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::relay::multiplexer::ChatTurnRequest;
use crate::server::ErrorBody;

/// Raw response body of one turn.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens one turn against the relay.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and return the streamed response body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the endpoint is unreachable or
    /// answers with a non-2xx status.
    async fn open(&self, request: &ChatTurnRequest) -> Result<ResponseStream>;
}

/// [`ChatTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    /// The endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Readable description of a non-2xx reply.
fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if err.details.is_empty() => format!("{} ({status})", err.error),
        Ok(err) => format!("{}: {} ({status})", err.error, err.details),
        Err(_) if body.trim().is_empty() => format!("endpoint returned {status}"),
        Err(_) => format!("endpoint returned {status}: {}", body.trim()),
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatTurnRequest) -> Result<ResponseStream> {
        debug!(endpoint = %self.endpoint, messages = request.messages.len(), "opening turn");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Transport(describe_failure(status, &body)));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::Transport(format!("stream read failed: {e}"))));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Role;
    use crate::relay::history::HistoryMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn turn() -> ChatTurnRequest {
        ChatTurnRequest {
            messages: vec![HistoryMessage::new(Role::User, "hi")],
            model_id: "m".into(),
            use_tools: true,
            ..ChatTurnRequest::default()
        }
    }

    async fn collect(mut stream: ResponseStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(Ok(chunk)) = stream.next().await {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn posts_camel_case_and_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "modelId": "m",
                "useTools": true,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: [DONE]\n\n"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(format!("{}/api/chat", server.uri()));
        let Ok(stream) = transport.open(&turn()).await else {
            unreachable!("mock accepts the request");
        };
        assert_eq!(collect(stream).await, b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn error_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "API configuration is missing on the server.",
                "details": "no upstream API key configured"
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri());
        let err = transport.open(&turn()).await.err();
        assert!(matches!(
            err,
            Some(RelayError::Transport(m)) if m.starts_with("API configuration is missing") && m.contains("500")
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1/api/chat");
        assert!(matches!(
            transport.open(&turn()).await.err(),
            Some(RelayError::Transport(_))
        ));
    }

    #[test]
    fn plain_text_failure_is_described() {
        let msg = describe_failure(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(msg, "endpoint returned 502 Bad Gateway: upstream down");
    }
}
