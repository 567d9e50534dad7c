//! HTTP-backed generator and notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::retry::{RetryPolicy, delay_for_attempt, is_recoverable, parse_retry_after};
use super::{OutboundNotifier, ResponseGenerator};
use crate::aggregation::{ConversationId, DispatchToken};
use crate::{Error, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    conversation_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    reply: String,
}

/// Asks a remote completion service for a reply
///
/// Posts `{"conversation_id", "text"}` and expects `{"reply"}` back. The
/// service owns any long-term conversation history.
#[derive(Debug, Clone)]
pub struct HttpResponseGenerator {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpResponseGenerator {
    /// Create a generator posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ResponseGenerator for HttpResponseGenerator {
    async fn generate(&self, conversation_id: &ConversationId, text: &str) -> Result<String> {
        let mut request = self.client.post(&self.url).json(&GenerateRequest {
            conversation_id: conversation_id.as_str(),
            text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Generator(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generator(format!("{status} - {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generator(format!("invalid response: {e}")))?;

        if parsed.reply.trim().is_empty() {
            return Err(Error::Generator("empty reply".to_string()));
        }

        tracing::debug!(conversation_id = %conversation_id, reply_len = parsed.reply.len(), "reply generated");
        Ok(parsed.reply)
    }
}

#[derive(Serialize)]
struct NotifyRequest<'a> {
    dispatch_token: &'a str,
    text: &'a str,
}

/// Posts replies to a callback URL, retrying transient failures
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            retry,
        }
    }
}

#[async_trait]
impl OutboundNotifier for WebhookNotifier {
    async fn send(&self, token: &DispatchToken, reply: &str) -> Result<()> {
        let body = NotifyRequest {
            dispatch_token: token.as_str(),
            text: reply,
        };

        let mut attempt = 0;
        loop {
            let (retry_after, failure) = match self.client.post(&self.url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(dispatch_token = %token, attempt, "reply delivered");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let text = response.text().await.unwrap_or_default();
                    let failure = format!("{status} - {text}");
                    if !is_recoverable(status) {
                        return Err(Error::Notifier(failure));
                    }
                    (retry_after, failure)
                }
                Err(e) if e.is_timeout() || e.is_connect() => (None, e.to_string()),
                Err(e) => return Err(Error::Notifier(e.to_string())),
            };

            if attempt >= self.retry.max_retries {
                return Err(Error::Notifier(format!(
                    "giving up after {} attempts: {failure}",
                    attempt + 1
                )));
            }

            let delay = delay_for_attempt(&self.retry, attempt, retry_after);
            tracing::warn!(
                dispatch_token = %token,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "reply delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
