//! Development server: the full API surface over the scripted browser
//! backend and an unconfigured text generator.
//!
//! Production deployments embed `webpilot-api` as a library and inject
//! real adapters; this binary exists so the Director loop and UI can be
//! developed against a hermetic engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use webpilot_ai::{AiError, GenerateRequest, TextGenerator};
use webpilot_api::{ApiConfig, DriverFactory, WorkflowService, http};
use webpilot_browser::{BrowserDriver, ScriptedDriver};
use webpilot_store::MemoryStore;
use webpilot_telemetry::EventBus;

/// Placeholder generator: cognition nodes fail with a clear message
/// until a real provider is injected.
struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Value, AiError> {
        Err(AiError::InvalidRequest {
            reason: "no text generator configured on the dev server".into(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WEBPILOT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env()?;
    let events = Arc::new(EventBus::new(config.event_capacity));
    let driver_factory: DriverFactory =
        Arc::new(|| Arc::new(ScriptedDriver::new()) as Arc<dyn BrowserDriver>);
    let service = Arc::new(WorkflowService::new(
        Arc::new(MemoryStore::new()),
        driver_factory,
        Arc::new(UnconfiguredGenerator),
        events,
    ));

    let router = http::router(service, &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "webpilot dev server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
