//! Attribution snapshot and storage keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xma_common::events::AttributionFields;

use crate::traffic::{classify_traffic_source, TrafficSource};

/// Durable key holding the first-touch snapshot (written once per profile)
pub const FIRST_TOUCH_KEY: &str = "xma_first_touch_attribution";
/// Durable key holding the most recent qualifying snapshot
pub const LAST_TOUCH_KEY: &str = "xma_attribution";
/// Ephemeral (per tab/session) key holding the last seen analytics session id
pub const SESSION_KEY: &str = "xma_session_id";

/// Which attribution slot a snapshot occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchKind {
    FirstTouch,
    LastTouch,
}

/// Attribution data captured from one navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    #[serde(flatten)]
    pub attribution: AttributionFields,
    pub landing_page: String,
    pub captured_at: DateTime<Utc>,
    pub kind: TouchKind,
}

impl AttributionSnapshot {
    /// Same data in a different slot
    pub fn with_kind(&self, kind: TouchKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Recompute the traffic source for this snapshot
    pub fn traffic_source(&self) -> TrafficSource {
        classify_traffic_source(
            self.attribution.utm_source.as_deref(),
            self.attribution.referrer.as_deref(),
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
