//! # hirelink-server
//!
//! Realtime chat server for the Hirelink job board.
//!
//! This binary provides:
//! - **WebSocket delivery** of chat, presence, and occupancy events
//! - **REST API** (axum) for chat requests, rooms, messages, scheduled
//!   messages, and attachment upload/download
//! - **Scheduled-message dispatcher** that promotes due entries into
//!   live messages on a fixed interval
//! - **Email notification** for offline participants (optional, SMTP)

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hirelink_chat::{
    scheduler, ChatService, ClientRegistry, Fanout, HttpPreviewResolver, NoopNotifier, Notifier,
    PresenceRegistry, RoomTracker, SmtpNotifier,
};
use hirelink_store::Database;

use crate::api::AppState;
use crate::blob_store::AttachmentStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hirelink_server=debug")),
        )
        .init();

    info!("Starting Hirelink chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // SQLite store (runs migrations on open)
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Database opened");
    }
    let store = Arc::new(Mutex::new(database));

    // Attachment store (creates directory if missing)
    let attachments = Arc::new(
        AttachmentStore::new(config.upload_path.clone(), config.max_attachment_size)
            .await
            .map_err(|e| anyhow::anyhow!("attachment store: {e}"))?,
    );

    // Runtime chat state: presence, occupancy, fan-out
    let presence = Arc::new(PresenceRegistry::new());
    let rooms = Arc::new(RoomTracker::new());
    let registry = Arc::new(ClientRegistry::new());
    let fanout = Arc::new(Fanout::new(registry.clone(), rooms.clone()));

    // Link-preview resolver
    let preview = Arc::new(
        HttpPreviewResolver::new().map_err(|e| anyhow::anyhow!("preview resolver: {e}"))?,
    );

    // Email notifier (noop unless SMTP is fully configured)
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            info!(relay = %smtp.relay, "Email notification enabled");
            Arc::new(
                SmtpNotifier::new(
                    &smtp.relay,
                    smtp.username.clone(),
                    smtp.password.clone(),
                    &smtp.from,
                )
                .map_err(|e| anyhow::anyhow!("smtp notifier: {e}"))?,
            )
        }
        None => {
            info!("No SMTP configuration, email notification disabled");
            Arc::new(NoopNotifier)
        }
    };

    let service = Arc::new(ChatService::new(
        store.clone(),
        rooms,
        presence,
        fanout,
        preview,
        notifier,
    ));

    let app_state = AppState {
        service: service.clone(),
        store,
        registry,
        attachments,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn the scheduled-message dispatcher
    // -----------------------------------------------------------------------
    let interval = std::time::Duration::from_secs(config.scheduler_interval_secs);
    tokio::spawn(scheduler::run(service, interval));

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
