//! Analytics sinks
//!
//! A sink delivers [`AnalyticsEvent`]s to an analytics backend and keeps the
//! super-properties registered for each identity. Producers resolve those
//! properties through [`AnalyticsSink::super_properties`] and attach them to
//! an event before it is emitted; delivery sends what the event carries.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use xma_common::events::AnalyticsEvent;

pub use xma_common::events::SuperProperties;

/// Identities tracked before the least recently used are evicted
pub const DEFAULT_MAX_IDENTITIES: u64 = 100_000;

/// Idle time after which an identity's registrations are dropped
pub const DEFAULT_IDENTITY_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Analytics delivery errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),
}

/// Destination for analytics events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Register properties attached to all later events, overwriting earlier values
    async fn register(&self, distinct_id: &str, properties: Map<String, Value>);

    /// Register properties only where no value is registered yet
    async fn register_once(&self, distinct_id: &str, properties: Map<String, Value>);

    /// Properties currently registered for an identity
    async fn super_properties(&self, distinct_id: &str) -> SuperProperties;

    /// Deliver one event
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Per-identity super-property store shared by sink implementations
///
/// Bounded: identities idle for longer than the configured time, or beyond
/// the capacity, are evicted and start over from nothing. The tracker
/// restores them from durable attribution on the next navigation.
#[derive(Clone)]
pub struct SuperPropertyRegistry {
    identities: Cache<String, Arc<RwLock<SuperProperties>>>,
}

impl Default for SuperPropertyRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_IDENTITIES, DEFAULT_IDENTITY_IDLE)
    }
}

impl SuperPropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_identities: u64, time_to_idle: Duration) -> Self {
        Self {
            identities: Cache::builder()
                .max_capacity(max_identities)
                .time_to_idle(time_to_idle)
                .build(),
        }
    }

    async fn entry(&self, distinct_id: &str) -> Arc<RwLock<SuperProperties>> {
        self.identities
            .get_with(distinct_id.to_string(), async {
                Arc::new(RwLock::new(SuperProperties::default()))
            })
            .await
    }

    pub async fn register(&self, distinct_id: &str, properties: Map<String, Value>) {
        let entry = self.entry(distinct_id).await;
        entry.write().await.current.extend(properties);
    }

    pub async fn register_once(&self, distinct_id: &str, properties: Map<String, Value>) {
        let entry = self.entry(distinct_id).await;
        let mut registered = entry.write().await;
        for (key, value) in properties {
            registered.once.entry(key).or_insert(value);
        }
    }

    pub async fn get(&self, distinct_id: &str) -> SuperProperties {
        match self.identities.get(distinct_id).await {
            Some(entry) => entry.read().await.clone(),
            None => SuperProperties::default(),
        }
    }
}

/// Sink used when no analytics backend is configured
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn register(&self, _distinct_id: &str, _properties: Map<String, Value>) {}

    async fn register_once(&self, _distinct_id: &str, _properties: Map<String, Value>) {}

    async fn super_properties(&self, _distinct_id: &str) -> SuperProperties {
        SuperProperties::default()
    }

    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        tracing::trace!(event = event.name(), "Analytics disabled, event discarded");
        Ok(())
    }
}

/// Test double that keeps everything in memory
///
/// Captured events are stored with the property map an HTTP sink would send.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Default)]
pub struct RecordingSink {
    registry: SuperPropertyRegistry,
    captured: Arc<RwLock<Vec<(AnalyticsEvent, Map<String, Value>)>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events captured so far with the full property map that was attached
    pub async fn captured(&self) -> Vec<(AnalyticsEvent, Map<String, Value>)> {
        self.captured.read().await.clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn register(&self, distinct_id: &str, properties: Map<String, Value>) {
        self.registry.register(distinct_id, properties).await;
    }

    async fn register_once(&self, distinct_id: &str, properties: Map<String, Value>) {
        self.registry.register_once(distinct_id, properties).await;
    }

    async fn super_properties(&self, distinct_id: &str) -> SuperProperties {
        self.registry.get(distinct_id).await
    }

    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        self.captured
            .write()
            .await
            .push((event.clone(), event.properties()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn captured_event(super_properties: SuperProperties) -> AnalyticsEvent {
        AnalyticsEvent::AttributionCaptured {
            distinct_id: "v".into(),
            landing_page: "/".into(),
            traffic_source: "newsletter".into(),
            attribution: Default::default(),
            timestamp: chrono::Utc::now(),
            super_properties,
        }
    }

    #[tokio::test]
    async fn test_register_once_never_replaces() {
        let registry = SuperPropertyRegistry::new();
        registry
            .register_once("v", props(json!({"initial_utm_source": "google"})))
            .await;
        registry
            .register_once(
                "v",
                props(json!({"initial_utm_source": "bing", "initial_referrer": "r"})),
            )
            .await;

        let registered = registry.get("v").await;
        assert_eq!(registered.once["initial_utm_source"], "google");
        assert_eq!(registered.once["initial_referrer"], "r");
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = SuperPropertyRegistry::new();
        registry
            .register("v", props(json!({"current_utm_source": "google"})))
            .await;
        registry
            .register("v", props(json!({"current_utm_source": "bing"})))
            .await;
        assert_eq!(registry.get("v").await.current["current_utm_source"], "bing");
        assert_eq!(registry.get("other").await, SuperProperties::default());
    }

    #[tokio::test]
    async fn test_idle_identities_are_evicted() {
        let registry = SuperPropertyRegistry::with_limits(100, Duration::from_millis(50));
        registry
            .register("v", props(json!({"current_utm_source": "google"})))
            .await;
        assert!(!registry.get("v").await.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.get("v").await.is_empty());
    }

    #[tokio::test]
    async fn test_recording_sink_sends_snapshot_taken_at_emit() {
        let sink = RecordingSink::new();
        sink.register("v", props(json!({"current_utm_source": "newsletter"})))
            .await;
        let event = captured_event(sink.super_properties("v").await);

        // a later registration must not change the queued event
        sink.register("v", props(json!({"current_utm_source": "ads"})))
            .await;
        sink.capture(&event).await.unwrap();

        let captured = sink.captured().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].1["current_utm_source"], "newsletter");
        assert_eq!(captured[0].1["landing_page"], "/");
    }

    #[tokio::test]
    async fn test_noop_sink_has_no_super_properties() {
        let sink = NoopSink;
        sink.register("v", props(json!({"current_utm_source": "x"})))
            .await;
        assert!(sink.super_properties("v").await.is_empty());
        sink.capture(&captured_event(SuperProperties::default()))
            .await
            .unwrap();
    }
}
