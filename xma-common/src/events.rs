//! Analytics event types and EventBus
//!
//! Every event destined for the analytics backend is an [`AnalyticsEvent`].
//! Producers (navigation tracking, Web Vitals ingestion) publish onto the
//! [`EventBus`]; consumers hold a [`Subscription`] and stop receiving as soon
//! as it is dropped or explicitly unsubscribed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// UTM tags plus referrer information attached to attribution events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_domain: Option<String>,
}

impl AttributionFields {
    /// True if at least one UTM tag is set
    pub fn has_utm(&self) -> bool {
        [
            &self.utm_source,
            &self.utm_medium,
            &self.utm_campaign,
            &self.utm_term,
            &self.utm_content,
        ]
        .iter()
        .any(|v| v.is_some())
    }
}

/// Core Web Vitals metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebVitalName {
    Cls,
    Fcp,
    Fid,
    Inp,
    Lcp,
    Ttfb,
}

/// Rating bucket reported alongside a Web Vitals value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebVitalRating {
    Good,
    NeedsImprovement,
    Poor,
}

/// One Web Vitals measurement for a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebVitalMetric {
    pub name: WebVitalName,
    pub value: f64,
    pub rating: WebVitalRating,
    /// Metric instance id assigned by the browser library
    pub id: String,
    pub path: String,
}

/// Super-properties attached to an event for one identity
///
/// Resolved when the event is produced, so later registrations never leak
/// into events already on the bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuperProperties {
    /// Written once, never replaced (`initial_*`)
    #[serde(default)]
    pub once: Map<String, Value>,
    /// Replaced on every registration (`current_*`)
    #[serde(default)]
    pub current: Map<String, Value>,
}

impl SuperProperties {
    /// All properties, `current` values winning on key collisions
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self.once.clone();
        merged.extend(self.current.clone());
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.once.is_empty() && self.current.is_empty()
    }
}

/// Events forwarded to the analytics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalyticsEvent {
    /// First page viewed in a new analytics session
    LandingPageView {
        distinct_id: String,
        landing_page: String,
        traffic_source: String,
        attribution: AttributionFields,
        /// True iff no first-touch attribution existed before this navigation
        is_first_session: bool,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "SuperProperties::is_empty")]
        super_properties: SuperProperties,
    },

    /// A navigation carried campaign (UTM) tags
    AttributionCaptured {
        distinct_id: String,
        landing_page: String,
        traffic_source: String,
        attribution: AttributionFields,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "SuperProperties::is_empty")]
        super_properties: SuperProperties,
    },

    /// Web Vitals measurement reported by the browser
    WebVital {
        distinct_id: String,
        metric: WebVitalMetric,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "SuperProperties::is_empty")]
        super_properties: SuperProperties,
    },
}

impl AnalyticsEvent {
    /// Event name as sent to the analytics backend
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::LandingPageView { .. } => "landing_page_view",
            AnalyticsEvent::AttributionCaptured { .. } => "attribution_captured",
            AnalyticsEvent::WebVital { .. } => "web_vital",
        }
    }

    pub fn distinct_id(&self) -> &str {
        match self {
            AnalyticsEvent::LandingPageView { distinct_id, .. }
            | AnalyticsEvent::AttributionCaptured { distinct_id, .. }
            | AnalyticsEvent::WebVital { distinct_id, .. } => distinct_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AnalyticsEvent::LandingPageView { timestamp, .. }
            | AnalyticsEvent::AttributionCaptured { timestamp, .. }
            | AnalyticsEvent::WebVital { timestamp, .. } => *timestamp,
        }
    }

    /// Super-properties captured when the event was produced
    pub fn super_properties(&self) -> &SuperProperties {
        match self {
            AnalyticsEvent::LandingPageView {
                super_properties, ..
            }
            | AnalyticsEvent::AttributionCaptured {
                super_properties, ..
            }
            | AnalyticsEvent::WebVital {
                super_properties, ..
            } => super_properties,
        }
    }

    /// Flat property map for the analytics backend
    ///
    /// Super-properties come first and event fields override them. Unset
    /// attribution fields are omitted rather than sent as null.
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = self.super_properties().merged();
        match self {
            AnalyticsEvent::LandingPageView {
                landing_page,
                traffic_source,
                attribution,
                is_first_session,
                ..
            } => {
                insert_attribution(&mut props, landing_page, traffic_source, attribution);
                props.insert("is_first_session".into(), Value::Bool(*is_first_session));
            }
            AnalyticsEvent::AttributionCaptured {
                landing_page,
                traffic_source,
                attribution,
                ..
            } => {
                insert_attribution(&mut props, landing_page, traffic_source, attribution);
            }
            AnalyticsEvent::WebVital { metric, .. } => {
                if let Ok(Value::Object(map)) = serde_json::to_value(metric) {
                    for (k, v) in map {
                        props.insert(format!("metric_{}", k), v);
                    }
                }
            }
        }
        props
    }
}

fn insert_attribution(
    props: &mut Map<String, Value>,
    landing_page: &str,
    traffic_source: &str,
    attribution: &AttributionFields,
) {
    props.insert("landing_page".into(), Value::String(landing_page.to_string()));
    props.insert(
        "traffic_source".into(),
        Value::String(traffic_source.to_string()),
    );
    if let Ok(Value::Object(map)) = serde_json::to_value(attribution) {
        props.extend(map);
    }
}

/// Broadcast bus for analytics events
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalyticsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for a slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received. Delivery stops
    /// when the returned handle is dropped or [`Subscription::unsubscribe`]
    /// is called.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnalyticsEvent,
    ) -> Result<usize, broadcast::error::SendError<AnalyticsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnalyticsEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Analytics event dropped: no subscribers");
        }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Handle for a live EventBus subscription
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<AnalyticsEvent>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the bus is gone. Events missed because this
    /// subscriber fell behind are skipped with a warning.
    pub async fn recv(&mut self) -> Option<AnalyticsEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Analytics subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, `None` if nothing is pending
    pub fn try_recv(&mut self) -> Option<AnalyticsEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Analytics subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {}
}
