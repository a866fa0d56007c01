//! Navigation tracker
//!
//! Runs on every route change:
//! 1. Skip excluded (administrative/studio) paths entirely
//! 2. Note whether a first touch already exists
//! 3. Capture attribution and register super-properties
//! 4. On a new analytics session, restore super-properties from durable
//!    attribution, then emit `landing_page_view` and, when UTM tags are
//!    present, `attribution_captured`
//!
//! Emitted events carry the super-properties in effect for this navigation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use xma_common::events::{AnalyticsEvent, EventBus};
use xma_common::KeyValueStore;

use crate::capture::{
    attribution_super_properties, build_candidate, prefixed_properties, register_super_properties,
    AttributionStore,
};
use crate::context::NavigationContext;
use crate::session::detect_session_change;
use crate::sink::{AnalyticsSink, SuperProperties};
use crate::traffic::classify_traffic_source;

/// What a single route change did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackOutcome {
    /// Path was excluded; nothing else happened
    pub excluded: bool,
    /// A snapshot was recorded as last touch
    pub attribution_recorded: bool,
    /// This navigation wrote the first touch
    pub first_touch_written: bool,
    /// Names of events emitted, in order
    pub events: Vec<&'static str>,
}

/// Per-route-change attribution and landing-page tracking
#[derive(Clone)]
pub struct NavigationTracker {
    bus: EventBus,
    sink: Arc<dyn AnalyticsSink>,
    excluded_prefixes: Vec<String>,
}

impl NavigationTracker {
    pub fn new(bus: EventBus, sink: Arc<dyn AnalyticsSink>, excluded_prefixes: Vec<String>) -> Self {
        Self {
            bus,
            sink,
            excluded_prefixes,
        }
    }

    pub fn excluded_prefixes(&self) -> &[String] {
        &self.excluded_prefixes
    }

    /// Super-properties to attach to an event produced outside navigation
    pub async fn super_properties(&self, distinct_id: &str) -> SuperProperties {
        self.sink.super_properties(distinct_id).await
    }

    /// Track a route change at the current time
    pub async fn track(
        &self,
        ctx: &NavigationContext,
        durable: &dyn KeyValueStore,
        ephemeral: &dyn KeyValueStore,
    ) -> TrackOutcome {
        self.track_at(ctx, durable, ephemeral, xma_common::time::now())
            .await
    }

    /// Track a route change observed at `now`
    pub async fn track_at(
        &self,
        ctx: &NavigationContext,
        durable: &dyn KeyValueStore,
        ephemeral: &dyn KeyValueStore,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        let mut outcome = TrackOutcome::default();

        if ctx.is_excluded(&self.excluded_prefixes) {
            debug!(path = %ctx.path, "Navigation on excluded path, not tracked");
            outcome.excluded = true;
            return outcome;
        }

        let attribution = AttributionStore::new(durable);
        let had_first_touch = attribution.has_first_touch().await;

        let candidate = build_candidate(ctx, now);
        if let Some(candidate) = &candidate {
            let capture = attribution.record(candidate).await;
            register_super_properties(
                self.sink.as_ref(),
                &ctx.distinct_id,
                attribution_super_properties(capture.first_touch.as_ref(), Some(&capture.last_touch)),
            )
            .await;
            outcome.attribution_recorded = true;
            outcome.first_touch_written = capture.first_touch_written;
        }

        let Some(session_id) = ctx.session_id.as_deref().filter(|s| !s.is_empty()) else {
            debug!(path = %ctx.path, "No analytics session id, landing page view skipped");
            return outcome;
        };

        if !detect_session_change(ephemeral, session_id).await.is_new() {
            return outcome;
        }

        // Registrations live in memory; a new session starts from durable attribution
        if candidate.is_none() {
            let restored = attribution_super_properties(
                attribution.first_touch().await.as_ref(),
                attribution.last_touch().await.as_ref(),
            );
            if !restored.is_empty() {
                debug!(distinct_id = %ctx.distinct_id, "Restoring super-properties from stored attribution");
            }
            register_super_properties(self.sink.as_ref(), &ctx.distinct_id, restored).await;
        }

        let mut super_properties = self.sink.super_properties(&ctx.distinct_id).await;
        if let Some(candidate) = &candidate {
            super_properties
                .current
                .extend(prefixed_properties("current_", candidate));
        }

        let fields = ctx.attribution_fields();
        let traffic_source =
            classify_traffic_source(fields.utm_source.as_deref(), fields.referrer.as_deref())
                .to_string();

        let landing = AnalyticsEvent::LandingPageView {
            distinct_id: ctx.distinct_id.clone(),
            landing_page: ctx.path.clone(),
            traffic_source: traffic_source.clone(),
            attribution: fields.clone(),
            is_first_session: !had_first_touch,
            timestamp: now,
            super_properties: super_properties.clone(),
        };
        outcome.events.push(landing.name());
        self.bus.emit_lossy(landing);

        if fields.has_utm() {
            let captured = AnalyticsEvent::AttributionCaptured {
                distinct_id: ctx.distinct_id.clone(),
                landing_page: ctx.path.clone(),
                traffic_source,
                attribution: fields,
                timestamp: now,
                super_properties,
            };
            outcome.events.push(captured.name());
            self.bus.emit_lossy(captured);
        }

        outcome
    }
}
