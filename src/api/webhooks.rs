//! Webhook ingress
//!
//! Accepts a normalised chat event envelope, classifies it as a text or
//! file fragment, and hands it to the ingest gateway. Responds immediately;
//! the reply is produced later when the conversation goes quiet.

use std::sync::{Arc, PoisonError};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::Error;
use crate::aggregation::{ConversationId, DelayClass, DispatchToken, Fragment};

/// Header carrying the shared webhook secret
pub const SECRET_HEADER: &str = "x-coalesce-webhook-secret";

/// Normalised inbound chat event
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundEvent {
    /// Platform event id, used to drop redeliveries
    #[serde(default)]
    pub event_id: Option<String>,

    /// Preferred conversation key
    #[serde(default)]
    pub session_key: Option<String>,

    /// Fallback conversation key when no session key is present
    #[serde(default)]
    pub chat_id: Option<String>,

    /// Routing value for the eventual reply
    pub dispatch_token: String,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub file: Option<FileInfo>,
}

/// File attached to an inbound event
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub mime_type: Option<String>,
}

impl InboundEvent {
    /// Conversation identity scoped by channel: session key, else chat id
    #[must_use]
    pub fn conversation_id(&self, channel: &str) -> ConversationId {
        let key = self
            .session_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .or(self.chat_id.as_deref())
            .unwrap_or_default();

        if key.trim().is_empty() {
            ConversationId::new("")
        } else {
            ConversationId::new(format!("{channel}:{key}"))
        }
    }
}

/// Turn an event into a fragment: any attached file makes it a file notice
#[must_use]
pub fn classify(event: &InboundEvent) -> Fragment {
    match &event.file {
        Some(file) => Fragment::file_notice(
            file.name
                .clone()
                .or_else(|| file.mime_type.clone())
                .unwrap_or_else(|| "file".to_string()),
        ),
        None => Fragment::text(event.text.clone().unwrap_or_default()),
    }
}

/// Webhook response
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffered: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    const fn ok() -> Self {
        Self {
            ok: true,
            duplicate: false,
            buffered: None,
            delay: None,
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::ok()
        }
    }
}

/// Handle one inbound event for `channel`
async fn handle_event(
    State(state): State<Arc<ApiState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(event): Json<InboundEvent>,
) -> (StatusCode, Json<WebhookResponse>) {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!(channel = %channel, "webhook secret mismatch");
            return (StatusCode::FORBIDDEN, Json(WebhookResponse::rejected("forbidden")));
        }
    }

    // Released again below if the event is not buffered
    let dedup_key = event.event_id.as_deref().map(|event_id| format!("{channel}:{event_id}"));
    if let Some(key) = dedup_key.as_deref() {
        let mut dedup = state.dedup.lock().unwrap_or_else(PoisonError::into_inner);
        if dedup.is_duplicate(key) {
            tracing::debug!(channel = %channel, key, "duplicate webhook event, skipping");
            return (
                StatusCode::OK,
                Json(WebhookResponse {
                    duplicate: true,
                    ..WebhookResponse::ok()
                }),
            );
        }
    }

    let id = event.conversation_id(&channel);
    let fragment = classify(&event);
    let kind = fragment.kind;

    let result = state
        .gateway
        .ingest(&id, fragment, DispatchToken::new(event.dispatch_token));

    if let (Err(_), Some(key)) = (&result, dedup_key.as_deref()) {
        state
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forget(key);
    }

    match result {
        Ok(receipt) => {
            tracing::info!(
                conversation_id = %receipt.conversation_id,
                kind = ?kind,
                buffered = receipt.buffered,
                delay_secs = receipt.delay_secs,
                "fragment buffered"
            );
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    buffered: Some(receipt.buffered),
                    delay: Some(receipt.delay),
                    ..WebhookResponse::ok()
                }),
            )
        }
        Err(Error::InvalidFragment(reason)) => {
            tracing::debug!(channel = %channel, reason = %reason, "rejected webhook event");
            (StatusCode::BAD_REQUEST, Json(WebhookResponse::rejected(reason)))
        }
        Err(e) => {
            tracing::error!(channel = %channel, error = %e, "failed to ingest webhook event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::rejected("internal error")),
            )
        }
    }
}

/// Build webhooks router
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{channel}", post(handle_event))
        .with_state(state)
}
