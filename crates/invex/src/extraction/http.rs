//! HTTP implementation of [`ExtractionClient`].
//!
//! Sends the document as base64 JSON to the configured endpoint. The
//! batch variant expects a single `{data, usage}` body; the streaming
//! variant reads newline-delimited JSON events.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::StreamExt;
use log::{debug, info};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::usage::{PricingTable, TokenCounts};
use super::{Extraction, ExtractionClient, ExtractionError};
use crate::document::InputFile;

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the extraction API.
#[derive(Debug)]
pub struct HttpExtractionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: SecretString,
    pub request_timeout: Duration,
}

/// Extraction client talking to the remote API over HTTPS.
pub struct HttpExtractionClient {
    client: Client,
    config: HttpExtractionConfig,
    pricing: PricingTable,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    model: &'a str,
    stream: bool,
    file: FilePayload<'a>,
}

#[derive(Serialize)]
struct FilePayload<'a> {
    name: &'a str,
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    data: serde_json::Value,
    #[serde(default)]
    usage: TokenCounts,
}

/// One line of a streaming response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    Text {
        text: String,
    },
    Done {
        data: serde_json::Value,
        #[serde(default)]
        usage: TokenCounts,
    },
    Error {
        message: String,
    },
}

/// Creates an HTTP client with appropriate timeouts.
fn create_http_client(request_timeout: Duration) -> Result<Client, ExtractionError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ExtractionError::Other(format!("Failed to create HTTP client: {}", e)))
}

impl HttpExtractionClient {
    pub fn new(config: HttpExtractionConfig) -> Result<Self, ExtractionError> {
        Self::with_pricing(config, PricingTable::default())
    }

    pub fn with_pricing(
        config: HttpExtractionConfig,
        pricing: PricingTable,
    ) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: create_http_client(config.request_timeout)?,
            config,
            pricing,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(
        &self,
        file: &InputFile,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<Response, ExtractionError> {
        let body = ExtractRequest {
            model: &self.config.model,
            stream,
            file: FilePayload {
                name: &file.name,
                mime_type: file
                    .mime_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
                data: STANDARD.encode(file.bytes()),
            },
        };

        debug!(
            "Sending '{}' ({} bytes) to {} (stream: {})",
            file.name, file.size, self.config.endpoint, stream
        );

        let request = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
            response = request => response?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status,
                message: api_error_message(&body),
            });
        }

        Ok(response)
    }

    fn finish(&self, data: serde_json::Value, counts: &TokenCounts, started: Instant) -> Extraction {
        let usage = self.pricing.usage(
            &self.config.model,
            counts,
            started.elapsed().as_millis() as u64,
        );
        Extraction { data, usage }
    }
}

#[async_trait]
impl ExtractionClient for HttpExtractionClient {
    async fn extract(
        &self,
        file: &InputFile,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ExtractionError> {
        let started = Instant::now();
        let response = self.send(file, false, cancel).await?;

        let body: ExtractResponse = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
            body = response.json::<ExtractResponse>() => body?,
        };

        let extraction = self.finish(body.data, &body.usage, started);
        info!(
            "Extracted '{}' in {}ms ({} tokens)",
            file.name, extraction.usage.duration_ms, extraction.usage.total_tokens
        );
        Ok(extraction)
    }

    async fn extract_streaming(
        &self,
        file: &InputFile,
        cancel: &CancellationToken,
        on_text: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<Extraction, ExtractionError> {
        let started = Instant::now();
        let response = self.send(file, true, cancel).await?;
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            buffer.extend_from_slice(&chunk?);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some((data, counts)) = handle_stream_line(&line, on_text)? {
                    return Ok(self.finish(data, &counts, started));
                }
            }
        }

        if let Some((data, counts)) = handle_stream_line(&buffer, on_text)? {
            return Ok(self.finish(data, &counts, started));
        }

        Err(ExtractionError::InvalidResponse(
            "stream ended without a final result".to_string(),
        ))
    }
}

/// Applies one stream line. Returns the final payload once the `done`
/// event arrives.
fn handle_stream_line(
    line: &[u8],
    on_text: &(dyn for<'a> Fn(&'a str) + Send + Sync),
) -> Result<Option<(serde_json::Value, TokenCounts)>, ExtractionError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let event: StreamEvent = serde_json::from_str(line)
        .map_err(|e| ExtractionError::InvalidResponse(format!("bad stream event: {}", e)))?;

    match event {
        StreamEvent::Text { text } => {
            on_text(&text);
            Ok(None)
        }
        StreamEvent::Done { data, usage } => Ok(Some((data, usage))),
        StreamEvent::Error { message } => Err(ExtractionError::Other(message)),
    }
}

/// Pulls a readable message out of an API error body.
fn api_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
    });

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn config(endpoint: &str) -> HttpExtractionConfig {
        HttpExtractionConfig {
            endpoint: endpoint.to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: SecretString::from("test-key"),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_stream_text_events_are_forwarded() {
        let seen = Mutex::new(String::new());
        let on_text = |text: &str| seen.lock().unwrap().push_str(text);

        assert!(handle_stream_line(br#"{"type":"text","text":"Inv"}"#, &on_text)
            .unwrap()
            .is_none());
        assert!(handle_stream_line(b"{\"type\":\"text\",\"text\":\"oice\"}\n", &on_text)
            .unwrap()
            .is_none());
        assert!(handle_stream_line(b"   \n", &on_text).unwrap().is_none());

        assert_eq!(*seen.lock().unwrap(), "Invoice");
    }

    #[test]
    fn test_stream_done_event_returns_payload() {
        let line = br#"{"type":"done","data":{"total":3},"usage":{"input_tokens":10,"output_tokens":4}}"#;
        let (data, usage) = handle_stream_line(line, &|_: &str| {}).unwrap().unwrap();
        assert_eq!(data["total"], 3);
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 4);
    }

    #[test]
    fn test_stream_error_event_fails() {
        let line = br#"{"type":"error","message":"quota exceeded"}"#;
        match handle_stream_line(line, &|_: &str| {}) {
            Err(ExtractionError::Other(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("Expected Other error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stream_garbage_is_invalid_response() {
        let result = handle_stream_line(b"not json", &|_: &str| {});
        assert!(matches!(result, Err(ExtractionError::InvalidResponse(_))));
    }

    #[test]
    fn test_api_error_message_shapes() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(api_error_message(r#"{"message":"slow down"}"#), "slow down");
        assert_eq!(api_error_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(api_error_message("plain text failure"), "plain text failure");
        assert_eq!(api_error_message(""), "empty response body");
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits_request() {
        let client = HttpExtractionClient::new(config("http://127.0.0.1:9/extract")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let file = InputFile::new("a.pdf", b"%PDF".to_vec());
        let result = client.extract(&file, &cancel).await;
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }

    #[test]
    fn test_model_accessor() {
        let client = HttpExtractionClient::new(config("https://example.com")).unwrap();
        assert_eq!(client.model(), "gemini-2.5-flash");
    }
}
