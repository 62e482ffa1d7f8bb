//! Streaming `chat/completions` client for OpenAI-compatible endpoints.
//!
//! Reasoning models served through these endpoints emit their trace in
//! `delta.reasoning_content` next to `delta.content`, so the body is parsed
//! directly rather than through a higher-level client.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::retry::is_retryable_status;
use super::sse::SseParser;
use super::{DeltaStream, ModelDelta, PromptMessage, RetryPolicy};
use crate::{Error, Result, TRACING_TARGET_PROVIDER};

const STREAM_BUFFER_SIZE: usize = 64;
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Body of a streaming chat completion request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionBody {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Everything needed to open one stream.
pub(crate) struct StreamRequest<'a> {
    pub http: &'a reqwest::Client,
    pub url: &'a str,
    pub api_key: &'a str,
    pub provider: &'a str,
    pub retry: RetryPolicy,
    pub body: ChatCompletionBody,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
}

struct AttemptFailure {
    retryable: bool,
    message: String,
}

/// Opens a token stream, retrying transport failures, 429 and 5xx responses.
///
/// Once the response headers are received the body is pumped by a background
/// task; dropping the returned stream stops the task at its next send.
pub(crate) async fn open_stream(request: StreamRequest<'_>) -> Result<DeltaStream> {
    let mut attempt = 1_u32;
    let response = loop {
        match send_once(&request).await {
            Ok(response) => break response,
            Err(failure) => {
                if !failure.retryable || !request.retry.should_retry(attempt) {
                    return Err(Error::provider(request.provider, failure.message));
                }

                let delay = request.retry.delay_for_attempt(attempt);
                tracing::warn!(
                    target: TRACING_TARGET_PROVIDER,
                    provider = request.provider,
                    attempt,
                    max_attempts = request.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure.message,
                    "Retrying chat stream after transient failure"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    };

    let (sender, receiver) = mpsc::channel(STREAM_BUFFER_SIZE);
    let provider = request.provider.to_owned();
    tokio::spawn(pump_body(response, sender, provider));

    Ok(ReceiverStream::new(receiver).boxed())
}

async fn send_once(request: &StreamRequest<'_>) -> Result<reqwest::Response, AttemptFailure> {
    let response = request
        .http
        .post(request.url)
        .bearer_auth(request.api_key)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(&request.body)
        .send()
        .await
        .map_err(|error| AttemptFailure {
            retryable: true,
            message: error.to_string(),
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) => text,
        Err(error) => format!("unable to read error body: {error}"),
    };
    Err(AttemptFailure {
        retryable: is_retryable_status(status.as_u16()),
        message: format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
    })
}

async fn pump_body(
    mut response: reqwest::Response,
    sender: mpsc::Sender<Result<ModelDelta>>,
    provider: String,
) {
    let mut parser = SseParser::default();

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(error) => {
                let error = Error::provider(&provider, format!("stream interrupted: {error}"));
                let _ = sender.send(Err(error)).await;
                return;
            }
        };

        let payloads = match parser.push(&chunk) {
            Ok(payloads) => payloads,
            Err(message) => {
                let _ = sender.send(Err(Error::provider(&provider, message))).await;
                return;
            }
        };

        if forward_payloads(payloads, &sender, &provider).await {
            return;
        }
    }

    match parser.finish() {
        Ok(payloads) => {
            if !forward_payloads(payloads, &sender, &provider).await {
                tracing::debug!(
                    target: TRACING_TARGET_PROVIDER,
                    provider = %provider,
                    "Chat stream ended without [DONE] sentinel"
                );
            }
        }
        Err(message) => {
            let _ = sender.send(Err(Error::provider(&provider, message))).await;
        }
    }
}

/// Sends the deltas of each payload. Returns `true` when the stream is over.
async fn forward_payloads(
    payloads: Vec<String>,
    sender: &mpsc::Sender<Result<ModelDelta>>,
    provider: &str,
) -> bool {
    for payload in payloads {
        match parse_payload(&payload, provider) {
            Ok(Some(deltas)) => {
                for delta in deltas {
                    if sender.send(Ok(delta)).await.is_err() {
                        return true;
                    }
                }
            }
            Ok(None) => return true,
            Err(error) => {
                let _ = sender.send(Err(error)).await;
                return true;
            }
        }
    }
    false
}

/// Parses one event payload.
///
/// Returns `None` for the `[DONE]` sentinel. Content precedes reasoning when a
/// single chunk carries both; empty strings are dropped.
pub(crate) fn parse_payload(payload: &str, provider: &str) -> Result<Option<Vec<ModelDelta>>> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(Some(Vec::new()));
    }
    if payload == "[DONE]" {
        return Ok(None);
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|error| Error::provider(provider, format!("malformed stream chunk: {error}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::provider(provider, error_message(&error.to_string())));
    }

    let mut deltas = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            deltas.push(ModelDelta::Content(content));
        }
        if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
            deltas.push(ModelDelta::Reasoning(reasoning));
        }
    }
    Ok(Some(deltas))
}

/// Extracts a readable message from an error body.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.pointer("/message"))
            .and_then(|m| m.as_str())
    });

    match message {
        Some(message) => message.to_owned(),
        None => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_and_reasoning_deltas() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi","reasoning_content":"think"}}]}"#;
        let deltas = parse_payload(payload, "test").unwrap().unwrap();
        assert_eq!(
            deltas,
            vec![
                ModelDelta::Content("Hi".into()),
                ModelDelta::Reasoning("think".into()),
            ]
        );
    }

    #[test]
    fn reasoning_alias_and_empty_content() {
        let payload = r#"{"choices":[{"delta":{"content":"","reasoning":"step"}}]}"#;
        let deltas = parse_payload(payload, "test").unwrap().unwrap();
        assert_eq!(deltas, vec![ModelDelta::Reasoning("step".into())]);
    }

    #[test]
    fn done_sentinel_ends_stream() {
        assert!(parse_payload("[DONE]", "test").unwrap().is_none());
        assert_eq!(parse_payload("  ", "test").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn chunk_without_delta_is_ignored() {
        let payload = r#"{"choices":[{"finish_reason":"stop"}],"usage":{"total_tokens":3}}"#;
        assert_eq!(parse_payload(payload, "test").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn inline_error_and_malformed_json() {
        let payload = r#"{"error":{"message":"quota exceeded"}}"#;
        let error = parse_payload(payload, "ark").unwrap_err();
        assert!(error.to_string().contains("quota exceeded"));

        assert!(parse_payload("{not json", "ark").is_err());
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_message("plain failure"), "plain failure");
    }
}
