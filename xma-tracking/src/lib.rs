//! XMA attribution and analytics tracking
//!
//! Traffic-source classification, first/last-touch attribution capture,
//! session-change detection and delivery of analytics events. All browser
//! state is reached through [`xma_common::KeyValueStore`], so the logic runs
//! the same against SQLite, memory or anything else.

pub mod capture;
pub mod context;
pub mod forwarder;
pub mod posthog;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod tracker;
pub mod traffic;

pub use capture::{
    attribution_super_properties, build_candidate, register_super_properties, AttributionStore,
    CaptureOutcome,
};
pub use context::NavigationContext;
pub use forwarder::spawn_forwarder;
pub use posthog::PostHogClient;
pub use session::{detect_session_change, SessionChange};
#[cfg(any(test, feature = "test-util"))]
pub use sink::RecordingSink;
pub use sink::{AnalyticsSink, NoopSink, SinkError, SuperProperties, SuperPropertyRegistry};
pub use snapshot::{AttributionSnapshot, TouchKind, FIRST_TOUCH_KEY, LAST_TOUCH_KEY, SESSION_KEY};
pub use tracker::{NavigationTracker, TrackOutcome};
pub use traffic::{classify_traffic_source, TrafficSource};
