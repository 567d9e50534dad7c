//! Coalesce Gateway - message aggregation for chat webhooks
//!
//! Chat users often send several short messages (and file uploads) in quick
//! succession. This crate buffers them per conversation and, once the
//! conversation has been quiet for a debounce window, sends the combined text
//! downstream as a single request.
//!
//! # Architecture
//!
//! ```text
//! webhook ──► IngestGateway ──► AggregationBuffer.append
//!                   │
//!                   └──► FlushScheduler.arm ──(quiet period)──► FlushExecutor
//!                                                                  │
//!                                   ResponseGenerator ◄────────────┤
//!                                   OutboundNotifier  ◄────────────┘
//! ```
//!
//! Draining the buffer is the only thing that decides whether a flush
//! happens; a timer firing is not enough on its own.

pub mod aggregation;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod flush;
pub mod ingest;
pub mod scheduler;

pub use aggregation::{
    AggregationBuffer, ConversationId, DelayClass, DispatchToken, DrainedConversation, Fragment,
    FragmentKind,
};
pub use collaborators::{
    EchoGenerator, HttpResponseGenerator, LogNotifier, OutboundNotifier, ResponseGenerator,
    WebhookNotifier,
};
pub use config::Config;
pub use error::{Error, Result};
pub use flush::{EMPTY_MESSAGE, FlushExecutor, compose_text};
pub use ingest::{IngestGateway, IngestReceipt};
pub use scheduler::{DebouncePolicy, FlushScheduler};
