//! Chat completion backends
//!
//! [`ChatBackend`] is the seam the conversation model talks through.
//! [`OpenAiClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint, blocking or streamed.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, StatusCode};
use secrecy::ExposeSecret;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::stream::{parse_sse_line, SseEvent};
use super::types::*;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Stream of deltas produced by a streamed completion
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta>> + Send>>;

/// A chat completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Request one complete response
    async fn complete(&self, request: &ChatRequest) -> Result<ModelResponse>;

    /// Request a response as a stream of deltas
    async fn complete_stream(&self, request: &ChatRequest) -> Result<DeltaStream>;
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct OpenAiClient {
    /// HTTP client
    client: Client,
    /// Base URL without the trailing slash
    base_url: String,
    /// Retries after the first attempt for transient failures
    max_retries: u32,
    /// First backoff interval
    retry_interval: Duration,
}

impl OpenAiClient {
    /// Create a new client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        // Local OpenAI-compatible servers often run without a key
        let key = config.api_key.expose_secret();
        if !key.is_empty() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(OpenAiClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_interval: Duration::from_millis(500),
        })
    }

    /// Override the first backoff interval
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.retry_interval,
            current_interval: self.retry_interval,
            max_interval: Duration::from_secs(30),
            // Attempts are bounded by `max_retries` instead
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// POST the request, retrying 429, 5xx and transport errors
    async fn post(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let attempts = AtomicU32::new(0);
        let max_retries = self.max_retries;

        debug!("Sending request to {}: model={}", url, body.model);

        let operation = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let request = self.client.post(&url).json(body);
            async move {
                let classify = |err: Error| {
                    if err.is_retryable() && attempt < max_retries {
                        warn!("Backend request failed (attempt {}), retrying: {}", attempt + 1, err);
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                };

                let response = request.send().await.map_err(|e| classify(Error::Http(e)))?;

                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let error_text = response.text().await.unwrap_or_default();
                let err = match status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        Error::Backend(format!("Unauthorized ({}): {}", status, error_text))
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        Error::Unavailable(format!("Rate limited ({}): {}", status, error_text))
                    }
                    _ if status.is_server_error() => {
                        Error::Unavailable(format!("API error ({}): {}", status, error_text))
                    }
                    _ => Error::Backend(format!("API error ({}): {}", status, error_text)),
                };
                Err(classify(err))
            }
        };

        backoff::future::retry(self.backoff_policy(), operation)
            .await
            .map_err(|e| match e {
                Error::Backend(_) => e,
                other => Error::Backend(other.to_string()),
            })
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ModelResponse> {
        let body = ChatCompletionRequest::from_request(request, false);
        let response = self.post(&body).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid completion response: {}", e)))?;

        if let Some(ref usage) = parsed.usage {
            info!(
                "Completion: model={}, tokens={}",
                parsed.model, usage.total_tokens
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("Completion response has no choices".to_string()))?;

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCallRequest::from)
                .collect(),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let body = ChatCompletionRequest::from_request(request, true);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel::<Result<ChatDelta>>(64);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::Backend(format!("Stream interrupted: {}", e))))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        Ok(Some(SseEvent::Delta(delta))) => {
                            if tx.send(Ok(delta)).await.is_err() {
                                return;
                            }
                        }
                        Ok(Some(SseEvent::Done)) => return,
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Final line without a trailing newline
            match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                Ok(Some(SseEvent::Delta(delta))) => {
                    let _ = tx.send(Ok(delta)).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
                _ => {}
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}
