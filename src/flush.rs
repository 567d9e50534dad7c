//! Flush path: drain a conversation and dispatch its combined text

use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregation::{AggregationBuffer, ConversationId, DrainedConversation, FlushTicket};
use crate::collaborators::{OutboundNotifier, ResponseGenerator};
use crate::scheduler::FlushHandler;

/// Combined text used when every buffered fragment was blank
pub const EMPTY_MESSAGE: &str = "(empty message)";

/// Reply sent when the generator could not produce one
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, something went wrong while preparing a reply. Please try again in a moment.";

/// Build the single downstream text for a drained conversation.
///
/// A file-count line comes first when any file was seen, then every text
/// fragment on its own line in arrival order.
#[must_use]
pub fn compose_text(drained: &DrainedConversation) -> String {
    let mut lines = Vec::with_capacity(drained.fragments.len() + 1);

    let files = drained.file_count();
    if files > 0 {
        lines.push(format!("[Files received: {files}]"));
    }

    lines.extend(
        drained
            .fragments
            .iter()
            .filter(|f| !f.is_file())
            .map(|f| f.content.clone()),
    );

    let text = lines.join("\n");
    if text.trim().is_empty() {
        EMPTY_MESSAGE.to_string()
    } else {
        text
    }
}

/// Runs when a conversation's debounce window closes
pub struct FlushExecutor {
    buffer: Arc<AggregationBuffer>,
    generator: Arc<dyn ResponseGenerator>,
    notifier: Arc<dyn OutboundNotifier>,
    fallback_reply: String,
}

impl FlushExecutor {
    #[must_use]
    pub fn new(
        buffer: Arc<AggregationBuffer>,
        generator: Arc<dyn ResponseGenerator>,
        notifier: Arc<dyn OutboundNotifier>,
    ) -> Self {
        Self {
            buffer,
            generator,
            notifier,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    #[must_use]
    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    /// Flush `id` right away regardless of its timer.
    ///
    /// Returns `false` when nothing was buffered.
    pub async fn flush(&self, id: &ConversationId) -> bool {
        match self.buffer.drain(id) {
            Some(drained) => {
                self.dispatch(drained).await;
                true
            }
            None => false,
        }
    }

    /// Flush every live conversation concurrently, returning how many were flushed
    pub async fn flush_pending(&self) -> usize {
        let drained: Vec<DrainedConversation> = self
            .buffer
            .pending_ids()
            .iter()
            .filter_map(|id| self.buffer.drain(id))
            .collect();
        let count = drained.len();

        futures::future::join_all(drained.into_iter().map(|d| self.dispatch(d))).await;
        count
    }

    async fn dispatch(&self, drained: DrainedConversation) {
        let text = compose_text(&drained);

        tracing::info!(
            conversation_id = %drained.id,
            fragments = drained.fragments.len(),
            files = drained.file_count(),
            buffered_ms = u64::try_from(drained.buffered_for.as_millis()).unwrap_or(u64::MAX),
            "flushing conversation"
        );

        let reply = match self.generator.generate(&drained.id, &text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(conversation_id = %drained.id, error = %e, "generator failed, sending fallback reply");
                self.fallback_reply.clone()
            }
        };

        if let Err(e) = self.notifier.send(&drained.dispatch_token, &reply).await {
            tracing::error!(conversation_id = %drained.id, error = %e, "failed to deliver reply");
        }
    }
}

#[async_trait]
impl FlushHandler for FlushExecutor {
    async fn on_fire(&self, ticket: FlushTicket) {
        let Some(drained) = self.buffer.drain_ticket(&ticket) else {
            tracing::debug!(
                conversation_id = %ticket.id,
                generation = ticket.generation,
                "stale flush, buffer already drained or extended"
            );
            return;
        };
        self.dispatch(drained).await;
    }
}
