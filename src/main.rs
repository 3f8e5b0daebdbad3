//! helpdesk-realtime probe entry point.
//!
//! Connects to the realtime backend with the credential from the
//! environment, joins the configured topics and logs traffic until
//! Ctrl-C or until the session becomes unrecoverable.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use helpdesk_realtime::auth::{CredentialStore, MemoryCredentialStore};
use helpdesk_realtime::config::RealtimeConfig;
use helpdesk_realtime::domain::READY_EVENT;
use helpdesk_realtime::registry::{NotifyReload, ReloadTrigger};
use helpdesk_realtime::ws::WsTransportFactory;
use helpdesk_realtime::{Connection, ConnectionRegistry, EventHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RealtimeConfig::from_env().context("loading realtime configuration")?;
    tracing::info!(url = %config.url, "starting realtime probe");

    // Credential store seeded from the environment
    let credentials = Arc::new(MemoryCredentialStore::new());
    if let Some(token) = &config.token {
        credentials.set_token(token.as_str());
    }
    if let Some(scope) = config.scope() {
        credentials.set_scope(scope);
    }

    // Build registry
    let reload = Arc::new(NotifyReload::new());
    let reload_trigger: Arc<dyn ReloadTrigger> = Arc::<NotifyReload>::clone(&reload);
    let store: Arc<dyn CredentialStore> = Arc::<MemoryCredentialStore>::clone(&credentials);
    let registry = ConnectionRegistry::new(
        Arc::new(WsTransportFactory::new(&config)),
        store,
        reload_trigger,
        &config,
    );

    let mut conn = registry.acquire_current();
    if conn.is_null() {
        tracing::warn!("no usable session; set REALTIME_TOKEN, REALTIME_TENANT_ID and REALTIME_USER_ID");
    }

    conn.on(
        READY_EVENT,
        EventHandler::new(|_| tracing::info!("server handshake ready")),
    );
    for topic in &config.topics {
        conn.subscribe(topic, json!({}));
        tracing::info!(%topic, "joined topic");
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            tracing::info!("shutting down");
        }
        () = reload.requested() => {
            tracing::warn!("session expired; re-authenticate and restart");
        }
    }

    conn.dispose();
    registry.shutdown();

    Ok(())
}
