//! Entry point for inbound fragments

use std::sync::Arc;

use serde::Serialize;

use crate::aggregation::{AggregationBuffer, ConversationId, DelayClass, DispatchToken, Fragment};
use crate::collaborators::{OutboundNotifier, ResponseGenerator};
use crate::flush::FlushExecutor;
use crate::scheduler::{DebouncePolicy, FlushScheduler};
use crate::{Error, Result};

/// What happened to an ingested fragment
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub conversation_id: ConversationId,
    /// Fragments now buffered for the conversation
    pub buffered: usize,
    pub delay: DelayClass,
    pub delay_secs: u64,
}

/// Buffers fragments and (re)schedules their conversation's flush
pub struct IngestGateway {
    buffer: Arc<AggregationBuffer>,
    scheduler: FlushScheduler,
    executor: Arc<FlushExecutor>,
}

impl IngestGateway {
    #[must_use]
    pub fn new(
        buffer: Arc<AggregationBuffer>,
        scheduler: FlushScheduler,
        executor: Arc<FlushExecutor>,
    ) -> Self {
        Self {
            buffer,
            scheduler,
            executor,
        }
    }

    /// Wire a fresh buffer, scheduler and executor on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn on_current_runtime(
        policy: DebouncePolicy,
        generator: Arc<dyn ResponseGenerator>,
        notifier: Arc<dyn OutboundNotifier>,
        fallback_reply: Option<String>,
    ) -> Self {
        let buffer = Arc::new(AggregationBuffer::new());
        let mut executor = FlushExecutor::new(buffer.clone(), generator, notifier);
        if let Some(reply) = fallback_reply {
            executor = executor.with_fallback_reply(reply);
        }
        let scheduler = FlushScheduler::on_current_runtime(policy);
        Self::new(buffer, scheduler, Arc::new(executor))
    }

    /// Buffer `fragment` and restart the conversation's quiet period.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFragment` for a blank conversation identity;
    /// nothing is buffered in that case.
    pub fn ingest(
        &self,
        id: &ConversationId,
        fragment: Fragment,
        dispatch_token: DispatchToken,
    ) -> Result<IngestReceipt> {
        if id.is_blank() {
            return Err(Error::InvalidFragment("conversation identity is empty".to_string()));
        }

        let appended = self.buffer.append(id, fragment, dispatch_token);
        let delay = self.scheduler.policy().delay_for(appended.delay);
        self.scheduler
            .arm(appended.ticket, appended.delay, self.executor.clone());

        if appended.created {
            tracing::debug!(conversation_id = %id, "opened conversation buffer");
        }

        Ok(IngestReceipt {
            conversation_id: id.clone(),
            buffered: appended.buffered,
            delay: appended.delay,
            delay_secs: delay.as_secs(),
        })
    }

    /// Cancel all timers, flush whatever is still buffered and wait for
    /// flushes that timers had already started.
    ///
    /// Returns the number of conversations flushed by this call.
    pub async fn shutdown(&self) -> usize {
        let cancelled = self.scheduler.cancel_all();
        let in_flight = self.scheduler.in_flight_count();
        let flushed = self.executor.flush_pending().await;
        self.scheduler.wait_in_flight().await;
        tracing::info!(cancelled, flushed, in_flight, "flushed pending conversations");
        flushed
    }

    #[must_use]
    pub fn pending_conversations(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn armed_timers(&self) -> usize {
        self.scheduler.armed_count()
    }

    #[must_use]
    pub const fn scheduler(&self) -> &FlushScheduler {
        &self.scheduler
    }
}
