//! Speech synthesis collaborator.
//!
//! The queue only needs "text in, playable audio out"; [`HttpSpeechClient`]
//! implements that against a two-step HTTP service: a JSON lookup that
//! returns an `audio_url`, then a download of that URL.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::config::SpeechConfig;
use crate::error::{RelayError, Result};

/// Turns a text span into playable audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Speech`] when no audio could be produced.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    code: i64,
    #[serde(default)]
    data: Option<SpeechData>,
}

#[derive(Debug, Deserialize)]
struct SpeechData {
    #[serde(default)]
    audio_url: Option<String>,
}

/// HTTP speech service client.
#[derive(Debug, Clone)]
pub struct HttpSpeechClient {
    base_url: String,
    voice: String,
    client: reqwest::Client,
}

impl HttpSpeechClient {
    /// Create a client for `base_url` speaking with `voice`.
    pub fn new(base_url: impl Into<String>, voice: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            voice: voice.into(),
            client,
        }
    }

    /// Create a client from the `[speech]` config section.
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.voice,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn lookup_audio_url(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("module", "audio"), ("text", text), ("voice", &self.voice)])
            .send()
            .await
            .map_err(|e| RelayError::Speech(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Speech(format!("speech service returned {status}")));
        }

        let body: SpeechResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Speech(format!("invalid response: {e}")))?;
        if body.code != 200 {
            return Err(RelayError::Speech(format!(
                "speech service answered code {}",
                body.code
            )));
        }
        body.data
            .and_then(|d| d.audio_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RelayError::Speech("response has no audio_url".into()))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let audio_url = self.lookup_audio_url(text).await?;
        debug!(%audio_url, "downloading synthesized audio");

        let response = self
            .client
            .get(&audio_url)
            .send()
            .await
            .map_err(|e| RelayError::Speech(format!("audio download failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Speech(format!("audio download returned {status}")));
        }
        let audio = response
            .bytes()
            .await
            .map_err(|e| RelayError::Speech(format!("audio download failed: {e}")))?;
        if audio.is_empty() {
            return Err(RelayError::Speech("audio download was empty".into()));
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpSpeechClient {
        HttpSpeechClient::new(
            format!("{}/speech/", server.uri()),
            "narrator",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn looks_up_then_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speech/"))
            .and(query_param("module", "audio"))
            .and(query_param("text", "你好。"))
            .and(query_param("voice", "narrator"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "data": {"audio_url": format!("{}/audio/1.mp3", server.uri())}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/audio/1.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .mount(&server)
            .await;

        let audio = client(&server).synthesize("你好。").await;
        assert!(audio.is_ok_and(|a| a.as_ref() == b"ID3audio"));
    }

    #[tokio::test]
    async fn non_200_code_is_speech_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speech/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 500, "msg": "busy"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).synthesize("hi").await;
        assert!(matches!(err, Err(RelayError::Speech(m)) if m.contains("500")));
    }

    #[tokio::test]
    async fn missing_audio_url_is_speech_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speech/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 200, "data": {}})),
            )
            .mount(&server)
            .await;

        let err = client(&server).synthesize("hi").await;
        assert!(matches!(err, Err(RelayError::Speech(m)) if m.contains("audio_url")));
    }

    #[tokio::test]
    async fn http_failure_is_speech_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).synthesize("hi").await;
        assert!(matches!(err, Err(RelayError::Speech(_))));
    }
}
