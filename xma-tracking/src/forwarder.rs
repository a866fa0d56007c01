//! EventBus → analytics sink forwarding

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use xma_common::events::EventBus;

use crate::sink::AnalyticsSink;

/// Subscribe to the bus and deliver every event to `sink`
///
/// Delivery failures are logged and dropped; nothing is retried. The task ends
/// when every bus handle is gone.
pub fn spawn_forwarder(bus: &EventBus, sink: Arc<dyn AnalyticsSink>) -> JoinHandle<()> {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        info!("Analytics forwarder started");
        while let Some(event) = subscription.recv().await {
            if let Err(e) = sink.capture(&event).await {
                warn!(event = event.name(), "Analytics delivery failed: {}", e);
            }
        }
        info!("Analytics forwarder stopped");
    })
}
