//! Debounce timers, one per conversation

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;

use crate::aggregation::{ConversationId, DelayClass, FlushTicket};

/// Default quiet period for text-only conversations
pub const DEFAULT_TEXT_DELAY: Duration = Duration::from_secs(30);

/// Default quiet period once a file has been seen
pub const DEFAULT_FILE_DELAY: Duration = Duration::from_secs(120);

/// Called when a conversation's quiet period elapses
#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn on_fire(&self, ticket: FlushTicket);
}

/// The two fixed debounce windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    pub text_delay: Duration,
    pub file_delay: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            text_delay: DEFAULT_TEXT_DELAY,
            file_delay: DEFAULT_FILE_DELAY,
        }
    }
}

impl DebouncePolicy {
    #[must_use]
    pub const fn delay_for(&self, class: DelayClass) -> Duration {
        match class {
            DelayClass::Text => self.text_delay,
            DelayClass::File => self.file_delay,
        }
    }
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

type TimerTable = Arc<Mutex<HashMap<ConversationId, ArmedTimer>>>;

fn lock(timers: &TimerTable) -> MutexGuard<'_, HashMap<ConversationId, ArmedTimer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Arms, re-arms and cancels the delayed flush for each conversation
///
/// Timers run on the runtime captured at construction, so [`arm`](Self::arm)
/// can be called from any thread and never blocks. Flushes started by a
/// fired timer are tracked until they finish; see
/// [`wait_in_flight`](Self::wait_in_flight).
#[derive(Debug, Clone)]
pub struct FlushScheduler {
    policy: DebouncePolicy,
    runtime: Handle,
    timers: TimerTable,
    in_flight: TaskTracker,
}

impl FlushScheduler {
    #[must_use]
    pub fn new(policy: DebouncePolicy, runtime: Handle) -> Self {
        Self {
            policy,
            runtime,
            timers: Arc::new(Mutex::new(HashMap::new())),
            in_flight: TaskTracker::new(),
        }
    }

    /// Create a scheduler on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn on_current_runtime(policy: DebouncePolicy) -> Self {
        Self::new(policy, Handle::current())
    }

    #[must_use]
    pub const fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    /// Schedule `handler.on_fire(ticket)` after the window for `class`.
    ///
    /// Replaces (and aborts) whatever timer was armed for the conversation.
    /// Returns `false` without arming when a newer ticket is already armed,
    /// which happens when two ingests for one conversation race between
    /// append and arm.
    pub fn arm(
        &self,
        ticket: FlushTicket,
        class: DelayClass,
        handler: Arc<dyn FlushHandler>,
    ) -> bool {
        let delay = self.policy.delay_for(class);
        let mut timers = lock(&self.timers);

        if let Some(existing) = timers.get(&ticket.id) {
            if existing.generation > ticket.generation {
                tracing::debug!(
                    conversation_id = %ticket.id,
                    generation = ticket.generation,
                    armed = existing.generation,
                    "newer flush already armed, skipping"
                );
                return false;
            }
            // Only interrupts the sleep; a timer past its deadline has already
            // handed off to a tracked flush task.
            existing.handle.abort();
        }

        let id = ticket.id.clone();
        let generation = ticket.generation;
        let table = Arc::clone(&self.timers);
        let runtime = self.runtime.clone();
        let in_flight = self.in_flight.clone();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut timers = lock(&table);
                if timers.get(&ticket.id).is_some_and(|t| t.generation == ticket.generation) {
                    timers.remove(&ticket.id);
                }
            }

            in_flight.spawn_on(async move { handler.on_fire(ticket).await }, &runtime);
        });

        timers.insert(
            id.clone(),
            ArmedTimer {
                generation,
                handle: task.abort_handle(),
            },
        );
        drop(timers);

        tracing::debug!(
            conversation_id = %id,
            generation,
            delay_secs = delay.as_secs_f64(),
            "flush armed"
        );
        true
    }

    /// Cancel the armed timer for `id`, if any
    pub fn cancel(&self, id: &ConversationId) -> bool {
        let removed = lock(&self.timers).remove(id);
        removed.is_some_and(|timer| {
            timer.handle.abort();
            true
        })
    }

    /// Cancel every armed timer, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ArmedTimer> = lock(&self.timers).drain().map(|(_, t)| t).collect();
        for timer in &drained {
            timer.handle.abort();
        }
        drained.len()
    }

    /// Number of timers currently waiting to fire
    #[must_use]
    pub fn armed_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Number of fired flushes still running
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait until every flush started by a fired timer has finished.
    ///
    /// Timers that fire afterwards are still tracked, so calling this again
    /// waits for those too.
    pub async fn wait_in_flight(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }
}
