//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coalesce_gateway::{
    ConversationId, DebouncePolicy, DispatchToken, Error, IngestGateway, OutboundNotifier,
    ResponseGenerator,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Text delay used by the timing scenarios
pub const TEXT_DELAY: Duration = Duration::from_secs(30);

/// File delay used by the timing scenarios
pub const FILE_DELAY: Duration = Duration::from_secs(120);

/// Mock generator recording every combined text it is asked about
#[derive(Default)]
pub struct MockGenerator {
    pub calls: Mutex<Vec<(ConversationId, String, Instant)>>,
    pub fail: bool,
    /// Simulated model latency
    pub latency: Option<Duration>,
}

impl MockGenerator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub async fn texts(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(_, t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl ResponseGenerator for MockGenerator {
    async fn generate(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> coalesce_gateway::Result<String> {
        self.calls
            .lock()
            .await
            .push((conversation_id.clone(), text.to_string(), Instant::now()));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail {
            return Err(Error::Generator("model unavailable".to_string()));
        }
        Ok(format!("reply to {conversation_id}"))
    }
}

/// Mock notifier recording every delivered reply
#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<(DispatchToken, String)>>,
}

impl MockNotifier {
    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl OutboundNotifier for MockNotifier {
    async fn send(&self, token: &DispatchToken, reply: &str) -> coalesce_gateway::Result<()> {
        self.sent.lock().await.push((token.clone(), reply.to_string()));
        Ok(())
    }
}

/// Gateway wired to fresh mocks on the current runtime
pub fn gateway_with(
    policy: DebouncePolicy,
    generator: Arc<MockGenerator>,
) -> (IngestGateway, Arc<MockGenerator>, Arc<MockNotifier>) {
    let notifier = Arc::new(MockNotifier::default());
    let gateway = IngestGateway::on_current_runtime(
        policy,
        generator.clone(),
        notifier.clone(),
        Some("fallback reply".to_string()),
    );
    (gateway, generator, notifier)
}

/// Gateway with the scenario delays (30s text, 120s file)
pub fn scenario_gateway() -> (IngestGateway, Arc<MockGenerator>, Arc<MockNotifier>) {
    gateway_with(
        DebouncePolicy {
            text_delay: TEXT_DELAY,
            file_delay: FILE_DELAY,
        },
        Arc::new(MockGenerator::default()),
    )
}

pub fn id(s: &str) -> ConversationId {
    ConversationId::new(s)
}

pub fn token(s: &str) -> DispatchToken {
    DispatchToken::new(s)
}

pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
