//! Background dispatcher for scheduled messages.
//!
//! Polls the store on a fixed interval and promotes every due entry
//! through the normal ingestion path, so scheduled sends produce the
//! same events and emails a live send would.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::pipeline::ChatService;

/// Run the dispatch loop forever. Spawned as a background task at
/// startup.
pub async fn run(service: Arc<ChatService>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "scheduled-message dispatcher started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        tick(&service).await;
    }
}

/// One dispatch pass. Separated from the loop so tests can drive it
/// directly.
pub async fn tick(service: &ChatService) {
    match service.promote_due(Utc::now()).await {
        Ok(0) => debug!("no scheduled messages due"),
        Ok(promoted) => info!(promoted, "dispatched scheduled messages"),
        Err(e) => error!(error = %e, "scheduled dispatch pass failed"),
    }
}
