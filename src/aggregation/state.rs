//! Per-conversation buffering types

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Opaque conversation identity
///
/// Derived by the ingress layer from a session key or a fallback token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identity is empty or whitespace only
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque value needed to route a reply back to its originating channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchToken(String);

impl DispatchToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of buffered fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Free text
    Text,
    /// Notice that a file arrived
    FileNotice,
}

/// One unit of buffered input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub content: String,
}

impl Fragment {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Text,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn file_notice(content: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::FileNotice,
            content: content.into(),
        }
    }

    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, FragmentKind::FileNotice)
    }
}

/// Which debounce window applies to a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayClass {
    /// Short window for text-only traffic
    Text,
    /// Long window once any file has been seen
    File,
}

/// Identifies the one armed timer allowed to flush a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushTicket {
    pub id: ConversationId,
    pub generation: u64,
}

/// Mutable buffering record for one live conversation
#[derive(Debug)]
pub struct ConversationState {
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) has_file: bool,
    pub(crate) dispatch_token: DispatchToken,
    /// Tag of the most recently armed flush
    pub(crate) generation: u64,
    pub(crate) opened_at: Instant,
}

impl ConversationState {
    pub(crate) fn new(dispatch_token: DispatchToken, generation: u64) -> Self {
        Self {
            fragments: Vec::new(),
            has_file: false,
            dispatch_token,
            generation,
            opened_at: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, fragment: Fragment) {
        if fragment.is_file() {
            self.has_file = true;
        }
        self.fragments.push(fragment);
    }

    pub(crate) const fn delay_class(&self) -> DelayClass {
        if self.has_file {
            DelayClass::File
        } else {
            DelayClass::Text
        }
    }
}

/// Everything removed from the buffer when a conversation is flushed
#[derive(Debug, Clone)]
pub struct DrainedConversation {
    pub id: ConversationId,
    pub fragments: Vec<Fragment>,
    pub has_file: bool,
    pub dispatch_token: DispatchToken,
    /// Time between the first buffered fragment and the drain
    pub buffered_for: std::time::Duration,
}

impl DrainedConversation {
    pub(crate) fn from_state(id: ConversationId, state: ConversationState) -> Self {
        Self {
            id,
            buffered_for: state.opened_at.elapsed(),
            fragments: state.fragments,
            has_file: state.has_file,
            dispatch_token: state.dispatch_token,
        }
    }

    /// Number of file notices in the drained buffer
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_file()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_detected() {
        assert!(ConversationId::new("").is_blank());
        assert!(ConversationId::new("  \t").is_blank());
        assert!(!ConversationId::new("chat-1").is_blank());
    }

    #[test]
    fn file_fragment_makes_state_sticky() {
        let mut state = ConversationState::new(DispatchToken::new("t"), 1);
        assert_eq!(state.delay_class(), DelayClass::Text);

        state.push(Fragment::file_notice("report.pdf"));
        state.push(Fragment::text("see attached"));
        state.push(Fragment::text("thanks"));

        assert!(state.has_file);
        assert_eq!(state.delay_class(), DelayClass::File);
    }

    #[test]
    fn drained_counts_files() {
        let mut state = ConversationState::new(DispatchToken::new("t"), 1);
        state.push(Fragment::file_notice("a.png"));
        state.push(Fragment::text("hi"));
        state.push(Fragment::file_notice("b.png"));

        let drained = DrainedConversation::from_state(ConversationId::new("c"), state);
        assert_eq!(drained.file_count(), 2);
        assert_eq!(drained.fragments.len(), 3);
    }
}
