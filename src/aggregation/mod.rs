//! Per-conversation aggregation buffer
//!
//! Holds the table of live conversations. All access goes through
//! [`AggregationBuffer::append`] and the drain methods, each of which is a
//! single short critical section over the table.

mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use state::{
    ConversationId, ConversationState, DelayClass, DispatchToken, DrainedConversation, Fragment,
    FragmentKind, FlushTicket,
};

/// Result of appending a fragment
#[derive(Debug, Clone)]
pub struct Appended {
    /// Ticket for the timer that should flush this conversation next
    pub ticket: FlushTicket,
    /// Debounce window to use from now on
    pub delay: DelayClass,
    /// Fragments buffered for the conversation, including this one
    pub buffered: usize,
    /// Whether this append opened a new buffer
    pub created: bool,
}

/// Table of live conversation buffers
#[derive(Debug, Default)]
pub struct AggregationBuffer {
    table: Mutex<HashMap<ConversationId, ConversationState>>,
    /// Shared across all identities so a tag is never reused after a drain
    generations: AtomicU64,
}

impl AggregationBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ConversationId, ConversationState>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a fragment to a conversation, creating its buffer if absent.
    ///
    /// The latest dispatch token replaces any earlier one. Every append
    /// issues a fresh generation tag, which invalidates timers armed for
    /// earlier appends.
    pub fn append(
        &self,
        id: &ConversationId,
        fragment: Fragment,
        dispatch_token: DispatchToken,
    ) -> Appended {
        let mut table = self.table();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;

        let mut created = false;
        let state = table.entry(id.clone()).or_insert_with(|| {
            created = true;
            ConversationState::new(dispatch_token.clone(), generation)
        });

        state.push(fragment);
        state.dispatch_token = dispatch_token;
        state.generation = generation;

        Appended {
            ticket: FlushTicket {
                id: id.clone(),
                generation,
            },
            delay: state.delay_class(),
            buffered: state.fragments.len(),
            created,
        }
    }

    /// Remove and return the buffer for `id`, or `None` if nothing is buffered
    pub fn drain(&self, id: &ConversationId) -> Option<DrainedConversation> {
        let state = self.table().remove(id)?;
        Some(DrainedConversation::from_state(id.clone(), state))
    }

    /// Remove and return the buffer only if `ticket` is still its current tag.
    ///
    /// A timer whose conversation has since received more fragments (or was
    /// already flushed) gets `None`.
    pub fn drain_ticket(&self, ticket: &FlushTicket) -> Option<DrainedConversation> {
        let mut table = self.table();
        if table.get(&ticket.id)?.generation != ticket.generation {
            return None;
        }
        let state = table.remove(&ticket.id)?;
        drop(table);
        Some(DrainedConversation::from_state(ticket.id.clone(), state))
    }

    /// Whether a buffer exists for `id`
    #[must_use]
    pub fn contains(&self, id: &ConversationId) -> bool {
        self.table().contains_key(id)
    }

    /// Number of live buffers
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Snapshot of identities currently buffering
    #[must_use]
    pub fn pending_ids(&self) -> Vec<ConversationId> {
        self.table().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> DispatchToken {
        DispatchToken::new(s)
    }

    #[test]
    fn first_append_creates_buffer() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");

        let first = buffer.append(&id, Fragment::text("Hi"), token("t1"));
        let second = buffer.append(&id, Fragment::text("there"), token("t1"));

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.buffered, 2);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn file_escalates_delay_and_stays() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");

        assert_eq!(buffer.append(&id, Fragment::text("a"), token("t")).delay, DelayClass::Text);
        assert_eq!(
            buffer.append(&id, Fragment::file_notice("f.pdf"), token("t")).delay,
            DelayClass::File
        );
        assert_eq!(buffer.append(&id, Fragment::text("b"), token("t")).delay, DelayClass::File);
    }

    #[test]
    fn last_dispatch_token_wins() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");
        buffer.append(&id, Fragment::text("a"), token("first"));
        buffer.append(&id, Fragment::text("b"), token("second"));

        let drained = buffer.drain(&id).unwrap();
        assert_eq!(drained.dispatch_token, token("second"));
    }

    #[test]
    fn drain_is_idempotent() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");
        buffer.append(&id, Fragment::text("a"), token("t"));

        assert!(buffer.drain(&id).is_some());
        assert!(buffer.drain(&id).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn stale_ticket_does_not_drain() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");

        let stale = buffer.append(&id, Fragment::text("a"), token("t")).ticket;
        let current = buffer.append(&id, Fragment::text("b"), token("t")).ticket;

        assert!(buffer.drain_ticket(&stale).is_none());
        assert!(buffer.contains(&id));

        let drained = buffer.drain_ticket(&current).unwrap();
        assert_eq!(drained.fragments.len(), 2);
        assert!(buffer.drain_ticket(&current).is_none());
    }

    #[test]
    fn append_after_drain_starts_fresh() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");
        buffer.append(&id, Fragment::file_notice("f"), token("t"));
        let old = buffer.drain(&id).unwrap();
        assert!(old.has_file);

        let fresh = buffer.append(&id, Fragment::text("new"), token("t"));
        assert!(fresh.created);
        assert_eq!(fresh.delay, DelayClass::Text);
        assert_eq!(fresh.buffered, 1);
    }

    #[test]
    fn tags_are_never_reused_across_buffers() {
        let buffer = AggregationBuffer::new();
        let id = ConversationId::new("chat-1");
        let old = buffer.append(&id, Fragment::text("a"), token("t")).ticket;
        buffer.drain(&id);

        let new = buffer.append(&id, Fragment::text("b"), token("t")).ticket;
        assert!(new.generation > old.generation);
        assert!(buffer.drain_ticket(&old).is_none());
    }
}
