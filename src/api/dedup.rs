//! Redelivered webhook event suppression

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long an event id is remembered (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum remembered event ids
const DEDUP_MAX_ENTRIES: usize = 2000;

/// TTL cache of recently seen webhook event ids
///
/// Chat platforms retry deliveries they consider unacknowledged; buffering
/// the same event twice would duplicate text in the combined message.
#[derive(Debug)]
pub struct EventDedup {
    seen: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for EventDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl EventDedup {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Record `key`, returning `true` if it was already seen within the TTL
    pub fn is_duplicate(&mut self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(ts) = self.seen.get(key) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }

        if self.seen.len() >= self.max_entries {
            self.seen.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        if self.seen.len() >= self.max_entries {
            if let Some(oldest) = self
                .seen
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(k, _)| k.clone())
            {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(key.to_string(), now);
        false
    }

    /// Drop `key` so a later delivery of the same event is accepted
    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
