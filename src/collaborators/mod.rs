//! External collaborators invoked when a conversation is flushed
//!
//! The flush path only sees these two traits. Implementations decide how a
//! reply is produced and where it is delivered.

mod http;
pub mod retry;

use async_trait::async_trait;

pub use http::{HttpResponseGenerator, WebhookNotifier};
pub use retry::RetryPolicy;

use crate::Result;
use crate::aggregation::{ConversationId, DispatchToken};

/// Produces a reply for the combined text of a flushed conversation
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply.
    ///
    /// # Errors
    ///
    /// Returns error when no usable reply could be produced; the caller
    /// substitutes its fallback reply.
    async fn generate(&self, conversation_id: &ConversationId, text: &str) -> Result<String>;
}

/// Delivers a reply to the external chat channel
#[async_trait]
pub trait OutboundNotifier: Send + Sync {
    /// Send `reply` to the destination identified by `token`.
    ///
    /// # Errors
    ///
    /// Returns error when delivery failed; the caller logs it and moves on.
    async fn send(&self, token: &DispatchToken, reply: &str) -> Result<()>;
}

/// Replies with the combined text itself (used when no generator is configured)
#[derive(Debug, Default, Clone)]
pub struct EchoGenerator;

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(&self, _conversation_id: &ConversationId, text: &str) -> Result<String> {
        Ok(format!("Received:\n{text}"))
    }
}

/// Logs replies instead of delivering them (used when no notifier is configured)
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl OutboundNotifier for LogNotifier {
    async fn send(&self, token: &DispatchToken, reply: &str) -> Result<()> {
        tracing::info!(dispatch_token = %token, reply_len = reply.len(), "reply ready (no notifier configured)");
        Ok(())
    }
}
