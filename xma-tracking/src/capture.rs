//! Attribution capture
//!
//! Builds a candidate snapshot from a navigation and persists it: the first
//! qualifying snapshot for a profile becomes the immutable first touch, every
//! qualifying snapshot replaces the last touch. Storage problems never
//! surface to the caller; tracking is best effort.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;
use xma_common::time::to_rfc3339_millis;
use xma_common::KeyValueStore;

use crate::context::NavigationContext;
use crate::sink::{AnalyticsSink, SuperProperties};
use crate::snapshot::{AttributionSnapshot, TouchKind, FIRST_TOUCH_KEY, LAST_TOUCH_KEY};

/// Build a snapshot for this navigation, if it carries anything worth recording
///
/// Qualifies when any UTM tag is present or the referrer points at another
/// host. Internal navigation and bare direct visits produce nothing.
pub fn build_candidate(ctx: &NavigationContext, now: DateTime<Utc>) -> Option<AttributionSnapshot> {
    let attribution = ctx.attribution_fields();
    if !attribution.has_utm() && !ctx.is_external_referrer() {
        return None;
    }
    Some(AttributionSnapshot {
        attribution,
        landing_page: ctx.path.clone(),
        captured_at: now,
        kind: TouchKind::LastTouch,
    })
}

/// Result of recording a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// True if this call wrote the first-touch slot
    pub first_touch_written: bool,
    /// First touch in effect after the call, `None` if the stored value is unreadable
    pub first_touch: Option<AttributionSnapshot>,
    /// True if the candidate became the last touch (a newer one may already be stored)
    pub last_touch_written: bool,
    /// Last touch in effect after the call
    pub last_touch: AttributionSnapshot,
}

/// Reads and writes attribution snapshots in a profile's durable store
///
/// Navigations for one profile may be processed concurrently and complete out
/// of order. The first touch is created with an insert-if-absent, so exactly
/// one navigation wins it; the last touch is versioned by `captured_at`, so an
/// earlier navigation finishing late never replaces a later one.
pub struct AttributionStore<'a> {
    store: &'a dyn KeyValueStore,
}

/// Stored first-touch slot
enum FirstTouchSlot {
    Empty,
    Present(AttributionSnapshot),
    /// Something is stored but cannot be decoded; never overwritten
    Unreadable,
}

impl<'a> AttributionStore<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// True if a first-touch entry exists, readable or not
    ///
    /// A failing store reads as "no entry".
    pub async fn has_first_touch(&self) -> bool {
        !matches!(self.first_touch_slot().await, FirstTouchSlot::Empty)
    }

    pub async fn first_touch(&self) -> Option<AttributionSnapshot> {
        match self.first_touch_slot().await {
            FirstTouchSlot::Present(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub async fn last_touch(&self) -> Option<AttributionSnapshot> {
        self.read(LAST_TOUCH_KEY).await.and_then(|json| {
            AttributionSnapshot::from_json(&json)
                .map_err(|e| debug!("Discarding unreadable last-touch attribution: {}", e))
                .ok()
        })
    }

    /// Persist a candidate as last touch, and as first touch if none exists
    pub async fn record(&self, candidate: &AttributionSnapshot) -> CaptureOutcome {
        let (first_touch_written, first_touch) = match self.first_touch_slot().await {
            FirstTouchSlot::Empty => {
                let first = candidate.with_kind(TouchKind::FirstTouch);
                if self.create_first_touch(&first).await {
                    (true, Some(first))
                } else {
                    // lost the race, or the store failed; report what is stored
                    (false, self.first_touch().await)
                }
            }
            FirstTouchSlot::Present(existing) => (false, Some(existing)),
            FirstTouchSlot::Unreadable => (false, None),
        };

        let candidate_last = candidate.with_kind(TouchKind::LastTouch);
        let last_touch_written = self.update_last_touch(&candidate_last).await;
        let last_touch = if last_touch_written {
            candidate_last
        } else {
            self.last_touch().await.unwrap_or(candidate_last)
        };

        CaptureOutcome {
            first_touch_written,
            first_touch,
            last_touch_written,
            last_touch,
        }
    }

    async fn first_touch_slot(&self) -> FirstTouchSlot {
        match self.read(FIRST_TOUCH_KEY).await {
            None => FirstTouchSlot::Empty,
            Some(json) => match AttributionSnapshot::from_json(&json) {
                Ok(snapshot) => FirstTouchSlot::Present(snapshot),
                Err(e) => {
                    debug!("Stored first-touch attribution is unreadable: {}", e);
                    FirstTouchSlot::Unreadable
                }
            },
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(key, "Attribution storage read failed: {}", e);
                None
            }
        }
    }

    async fn create_first_touch(&self, snapshot: &AttributionSnapshot) -> bool {
        let Some(json) = encode(FIRST_TOUCH_KEY, snapshot) else {
            return false;
        };
        match self.store.set_if_absent(FIRST_TOUCH_KEY, &json).await {
            Ok(written) => {
                if !written {
                    debug!("First touch already recorded by a concurrent navigation");
                }
                written
            }
            Err(e) => {
                debug!(key = FIRST_TOUCH_KEY, "Attribution storage write failed: {}", e);
                false
            }
        }
    }

    async fn update_last_touch(&self, snapshot: &AttributionSnapshot) -> bool {
        let Some(json) = encode(LAST_TOUCH_KEY, snapshot) else {
            return false;
        };
        let version = to_rfc3339_millis(snapshot.captured_at);
        match self.store.set_if_newer(LAST_TOUCH_KEY, &json, &version).await {
            Ok(written) => {
                if !written {
                    debug!(%version, "Newer last touch already stored, keeping it");
                }
                written
            }
            Err(e) => {
                debug!(key = LAST_TOUCH_KEY, "Attribution storage write failed: {}", e);
                false
            }
        }
    }
}

fn encode(key: &str, snapshot: &AttributionSnapshot) -> Option<String> {
    snapshot
        .to_json()
        .map_err(|e| debug!(key, "Attribution snapshot encoding failed: {}", e))
        .ok()
}

/// Properties describing a snapshot, keys prefixed (`initial_`, `current_`)
pub fn prefixed_properties(prefix: &str, snapshot: &AttributionSnapshot) -> Map<String, Value> {
    let mut props = Map::new();
    let mut put = |name: &str, value: Option<&str>| {
        if let Some(value) = value {
            props.insert(format!("{}{}", prefix, name), Value::String(value.to_string()));
        }
    };
    let fields = &snapshot.attribution;
    put("utm_source", fields.utm_source.as_deref());
    put("utm_medium", fields.utm_medium.as_deref());
    put("utm_campaign", fields.utm_campaign.as_deref());
    put("utm_term", fields.utm_term.as_deref());
    put("utm_content", fields.utm_content.as_deref());
    put("referrer", fields.referrer.as_deref());
    put("referrer_domain", fields.referrer_domain.as_deref());
    put("landing_page", Some(snapshot.landing_page.as_str()));
    put("traffic_source", Some(snapshot.traffic_source().as_str()));
    props
}

/// Super-properties for a first touch (`initial_*`) and a current touch (`current_*`)
pub fn attribution_super_properties(
    first_touch: Option<&AttributionSnapshot>,
    current_touch: Option<&AttributionSnapshot>,
) -> SuperProperties {
    SuperProperties {
        once: first_touch
            .map(|snapshot| prefixed_properties("initial_", snapshot))
            .unwrap_or_default(),
        current: current_touch
            .map(|snapshot| prefixed_properties("current_", snapshot))
            .unwrap_or_default(),
    }
}

/// Register `initial_*` as write-once and `current_*` as overwriting
pub async fn register_super_properties(
    sink: &dyn AnalyticsSink,
    distinct_id: &str,
    properties: SuperProperties,
) {
    if !properties.once.is_empty() {
        sink.register_once(distinct_id, properties.once).await;
    }
    if !properties.current.is_empty() {
        sink.register(distinct_id, properties.current).await;
    }
}
