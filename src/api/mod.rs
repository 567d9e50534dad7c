//! HTTP API server for the coalesce gateway

pub mod dedup;
pub mod health;
pub mod webhooks;

use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use dedup::EventDedup;

use crate::Result;
use crate::ingest::IngestGateway;

/// Shared state for API handlers
pub struct ApiState {
    pub gateway: Arc<IngestGateway>,
    /// Shared secret required on webhook requests
    pub webhook_secret: Option<String>,
    pub dedup: Mutex<EventDedup>,
}

impl ApiState {
    #[must_use]
    pub fn new(gateway: Arc<IngestGateway>, webhook_secret: Option<String>) -> Self {
        Self {
            gateway,
            webhook_secret,
            dedup: Mutex::new(EventDedup::default()),
        }
    }
}

/// Build the router with all routes
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .nest("/api/webhooks", webhooks::router(state.clone()))
        .merge(health::router())
        .merge(health::status_router(state))
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
