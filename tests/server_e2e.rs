//! HTTP endpoint end to end: real server, mocked upstream.

use chat_relay::client::StreamDecoder;
use chat_relay::config::RelayConfig;
use chat_relay::relay::OutboundEvent;
use chat_relay::server::{ErrorBody, RelayServer, multiplexer_from_config};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start(upstream: &MockServer) -> RelayServer {
    let mut config = RelayConfig::default();
    config.server.port = 0;
    config.upstream.base_url = format!("{}/v1", upstream.uri());
    config.upstream.api_key = Some("sk-test".into());
    config.tools.serper_url = format!("{}/search", upstream.uri());
    config.tools.serper_api_key = Some("serper-key".into());

    let server = RelayServer::start(&config.server, multiplexer_from_config(&config)).await;
    let Ok(server) = server else {
        unreachable!("server should bind to an ephemeral port");
    };
    server
}

async fn post(server: &RelayServer, body: serde_json::Value) -> reqwest::Response {
    let resp = reqwest::Client::new()
        .post(server.chat_url())
        .json(&body)
        .send()
        .await;
    let Ok(resp) = resp else {
        unreachable!("request should reach the relay");
    };
    resp
}

fn decode(body: &[u8]) -> Vec<OutboundEvent> {
    let mut decoder = StreamDecoder::new();
    let mut events = decoder.feed(body);
    events.extend(decoder.finish());
    events
}

#[tokio::test]
async fn streams_tool_turn_as_event_stream() {
    let upstream = MockServer::start().await;
    let tool_call = json!({"choices": [{"delta": {"tool_calls": [{
        "index": 0, "id": "call_1", "type": "function",
        "function": {"name": "search", "arguments": "{\"query\":\"Paris weather\"}"}
    }]}}]});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("data: {tool_call}\n\ndata: [DONE]\n\n")),
        )
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    let answer = json!({"choices": [{"delta": {"content": "Sunny."}}]});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("data: {answer}\n\ndata: [DONE]\n\n")),
        )
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"organic": [{"snippet": "sunny"}]})),
        )
        .mount(&upstream)
        .await;

    let server = start(&upstream).await;
    let resp = post(
        &server,
        json!({
            "messages": [{"id": "m1", "role": "user", "content": "weather in Paris?"}],
            "modelId": "test-model",
            "useSearch": true
        }),
    )
    .await;

    assert_eq!(resp.status().as_u16(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    assert_eq!(content_type.as_deref(), Some("text/event-stream"));
    let cache = resp
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    assert_eq!(cache.as_deref(), Some("no-cache"));

    let body = resp.bytes().await.unwrap_or_default();
    assert!(body.starts_with(b"event: searching: Paris weather\n\n"));
    assert_eq!(
        decode(&body),
        vec![
            OutboundEvent::status("searching: Paris weather"),
            OutboundEvent::content("Sunny."),
            OutboundEvent::Done,
        ]
    );
}

#[tokio::test]
async fn upstream_status_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&upstream)
        .await;

    let server = start(&upstream).await;
    let resp = post(
        &server,
        json!({"messages": [{"role": "user", "content": "hi"}], "modelId": "m"}),
    )
    .await;

    assert_eq!(resp.status().as_u16(), 401);
    let body: Option<ErrorBody> = resp.json().await.ok();
    assert_eq!(
        body,
        Some(ErrorBody {
            error: "Upstream API error".into(),
            details: "invalid api key".into(),
        })
    );
}

#[tokio::test]
async fn upstream_forbidden_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("key revoked"))
        .mount(&upstream)
        .await;

    let server = start(&upstream).await;
    let resp = post(
        &server,
        json!({"messages": [{"role": "user", "content": "hi"}], "modelId": "m"}),
    )
    .await;

    assert_eq!(resp.status().as_u16(), 403);
    let body: Option<ErrorBody> = resp.json().await.ok();
    assert_eq!(
        body,
        Some(ErrorBody {
            error: "Upstream API error".into(),
            details: "key revoked".into(),
        })
    );
}

#[tokio::test]
async fn in_band_provider_error_ends_stream_cleanly() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: {\"error\":{\"message\":\"quota exceeded\"}}\n\n",
        ))
        .mount(&upstream)
        .await;

    let server = start(&upstream).await;
    let resp = post(
        &server,
        json!({"messages": [{"role": "user", "content": "hi"}], "modelId": "m"}),
    )
    .await;
    let events = decode(&resp.bytes().await.unwrap_or_default());

    assert_eq!(events.first(), Some(&OutboundEvent::content("Hi")));
    assert!(matches!(&events[1], OutboundEvent::Error { message } if message.contains("quota exceeded")));
    assert_eq!(events.last(), Some(&OutboundEvent::Done));
    assert_eq!(events.len(), 3);
}
