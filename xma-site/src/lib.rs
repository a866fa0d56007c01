//! xma-site library - agency site backend
//!
//! Checkout sessions, lead capture, navigation/attribution collection,
//! Web Vitals ingestion and CMS-backed blog/portfolio content.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use xma_common::config::{is_configured, ContentProvider, TomlConfig};
use xma_common::events::EventBus;
use xma_tracking::{AnalyticsSink, NavigationTracker};

pub mod api;
pub mod checkout;
pub mod content;
pub mod db;
pub mod error;
pub mod leads;
pub mod services;
pub mod tabs;

pub use error::{ApiError, ApiResult};

use content::ContentSource;
use services::{ContentfulSource, LeadWebhookClient, SanitySource, StripeClient};
use tabs::TabStores;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Durable attribution storage
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub tracker: NavigationTracker,
    /// Ephemeral per-tab storage
    pub tabs: TabStores,
    /// Host of the public site, for internal/external referrer checks
    pub site_host: String,
    pub stripe: Option<Arc<StripeClient>>,
    pub lead_webhook: Option<Arc<LeadWebhookClient>>,
    pub content: Option<Arc<dyn ContentSource>>,
    pub startup_time: Instant,
}

impl AppState {
    /// State with tracking only; integrations are attached with the `with_*` methods
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        sink: Arc<dyn AnalyticsSink>,
        excluded_prefixes: Vec<String>,
        site_host: impl Into<String>,
    ) -> Self {
        let tracker = NavigationTracker::new(event_bus.clone(), sink, excluded_prefixes);
        Self {
            db,
            event_bus,
            tracker,
            tabs: TabStores::default(),
            site_host: site_host.into(),
            stripe: None,
            lead_webhook: None,
            content: None,
            startup_time: Instant::now(),
        }
    }

    pub fn with_stripe(mut self, client: StripeClient) -> Self {
        self.stripe = Some(Arc::new(client));
        self
    }

    pub fn with_lead_webhook(mut self, client: LeadWebhookClient) -> Self {
        self.lead_webhook = Some(Arc::new(client));
        self
    }

    pub fn with_content(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content = Some(source);
        self
    }

    /// Build state from configuration
    ///
    /// Integrations without credentials are left unset and logged; their
    /// endpoints then answer with an error instead of failing startup.
    pub fn from_config(
        db: SqlitePool,
        config: &TomlConfig,
        event_bus: EventBus,
        sink: Arc<dyn AnalyticsSink>,
    ) -> xma_common::Result<Self> {
        let mut state = Self::new(
            db,
            event_bus,
            sink,
            config.tracking.excluded_path_prefixes.clone(),
            config.site_host.clone(),
        );

        match &config.stripe.secret_key {
            Some(key) if is_configured(&config.stripe.secret_key) => {
                let client = StripeClient::new(
                    key.clone(),
                    &config.stripe.api_base,
                    config.stripe.success_url.clone(),
                    config.stripe.cancel_url.clone(),
                )
                .map_err(|e| xma_common::Error::Config(e.to_string()))?;
                state = state.with_stripe(client);
                info!("Stripe checkout enabled");
            }
            _ => warn!("Stripe secret key not configured; checkout endpoints will fail"),
        }

        match &config.leads.webhook_url {
            Some(url) if is_configured(&config.leads.webhook_url) => {
                let client = LeadWebhookClient::new(url.clone())
                    .map_err(|e| xma_common::Error::Config(e.to_string()))?;
                state = state.with_lead_webhook(client);
                info!("Lead webhook enabled");
            }
            _ => warn!("Lead webhook URL not configured; lead submissions will fail"),
        }

        if let Some(source) = content_source(config)? {
            info!(provider = source.provider(), "Content source enabled");
            state = state.with_content(source);
        }

        Ok(state)
    }
}

fn content_source(config: &TomlConfig) -> xma_common::Result<Option<Arc<dyn ContentSource>>> {
    let content = &config.content;
    let source: Arc<dyn ContentSource> = match content.provider {
        None => {
            warn!("No content provider configured; blog and portfolio endpoints disabled");
            return Ok(None);
        }
        Some(ContentProvider::Contentful) => {
            let cfg = &content.contentful;
            let token = match &cfg.access_token {
                Some(token) if is_configured(&cfg.access_token) && !cfg.space_id.is_empty() => token,
                _ => {
                    warn!("Contentful selected but space id or access token missing");
                    return Ok(None);
                }
            };
            Arc::new(
                ContentfulSource::new(&cfg.api_base, &cfg.space_id, &cfg.environment, token.clone())
                    .map_err(|e| xma_common::Error::Config(e.to_string()))?,
            )
        }
        Some(ContentProvider::Sanity) => {
            let cfg = &content.sanity;
            if cfg.project_id.is_empty() {
                warn!("Sanity selected but project id missing");
                return Ok(None);
            }
            let token = cfg.token.clone().filter(|t| !t.trim().is_empty());
            Arc::new(
                SanitySource::new(
                    &cfg.project_id,
                    &cfg.dataset,
                    &cfg.api_version,
                    token,
                    cfg.api_base.as_deref(),
                )
                .map_err(|e| xma_common::Error::Config(e.to_string()))?,
            )
        }
    };
    Ok(Some(source))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route("/api/checkout", post(api::create_checkout))
        .route("/api/checkout/package", post(api::create_package_checkout))
        .route("/api/leads", post(api::submit_lead))
        .route("/api/track/navigation", post(api::track_navigation))
        .route("/api/track/attribution/:visitor_id", get(api::get_attribution))
        .route("/api/vitals", post(api::report_vital))
        .route("/api/blog", get(api::list_posts))
        .route("/api/blog/:slug", get(api::get_post))
        .route("/api/blog/:slug/related", get(api::related_posts))
        .route("/api/portfolio", get(api::list_projects))
        .route("/api/portfolio/:slug", get(api::get_project));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
