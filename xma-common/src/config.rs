//! Configuration loading
//!
//! Resolution order for the config file:
//! 1. Explicit path (command line)
//! 2. `XMA_CONFIG` environment variable
//! 3. `~/.config/xma/site.toml`
//! 4. Compiled defaults
//!
//! A missing file is never fatal: a warning is logged and defaults are used.
//! Secrets may additionally be supplied through environment variables, which
//! take precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "XMA_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// SQLite database holding durable attribution state
    pub database_path: PathBuf,
    /// Host name of the public site, used to tell internal from external referrers
    pub site_host: String,
    pub tracking: TrackingConfig,
    pub stripe: StripeConfig,
    pub leads: LeadsConfig,
    pub posthog: PostHogConfig,
    pub content: ContentConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5730".to_string(),
            database_path: default_data_dir().join("xma.db"),
            site_host: "localhost".to_string(),
            tracking: TrackingConfig::default(),
            stripe: StripeConfig::default(),
            leads: LeadsConfig::default(),
            posthog: PostHogConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    /// Paths under these prefixes are never tracked
    pub excluded_path_prefixes: Vec<String>,
    /// EventBus buffer size
    pub event_bus_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            excluded_path_prefixes: vec!["/studio".to_string(), "/admin".to_string()],
            event_bus_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: "https://api.stripe.com".to_string(),
            success_url: "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "http://localhost:3000/pricing".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeadsConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostHogConfig {
    pub api_key: Option<String>,
    pub host: String,
}

impl Default for PostHogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: "https://us.i.posthog.com".to_string(),
        }
    }
}

/// Which CMS backs the blog and portfolio
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentProvider {
    Contentful,
    Sanity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentConfig {
    /// `None` disables the content endpoints
    pub provider: Option<ContentProvider>,
    pub contentful: ContentfulConfig,
    pub sanity: SanityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContentfulConfig {
    pub space_id: String,
    pub environment: String,
    pub access_token: Option<String>,
    pub api_base: String,
}

impl Default for ContentfulConfig {
    fn default() -> Self {
        Self {
            space_id: String::new(),
            environment: "master".to_string(),
            access_token: None,
            api_base: "https://cdn.contentful.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SanityConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: Option<String>,
    /// Overrides `https://{project_id}.apicdn.sanity.io`
    pub api_base: Option<String>,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: None,
            api_base: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration following the resolution order, then apply
    /// environment overrides
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit_path) {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path)?;
                let config = Self::from_toml_str(&text)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                info!("No config file found, using compiled defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override secrets and endpoints from `XMA_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        override_opt(&mut self.stripe.secret_key, "XMA_STRIPE_SECRET_KEY");
        override_opt(&mut self.leads.webhook_url, "XMA_LEAD_WEBHOOK_URL");
        override_opt(&mut self.posthog.api_key, "XMA_POSTHOG_API_KEY");
        override_opt(
            &mut self.content.contentful.access_token,
            "XMA_CONTENTFUL_ACCESS_TOKEN",
        );
        override_opt(&mut self.content.sanity.token, "XMA_SANITY_TOKEN");
        if let Some(host) = non_empty_env("XMA_SITE_HOST") {
            self.site_host = host;
        }
    }
}

/// Pick the config file path: explicit, then env var, then user config dir
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = non_empty_env(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("xma").join("site.toml"))
        .filter(|p| p.exists())
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("xma"))
        .unwrap_or_else(|| PathBuf::from("./xma_data"))
}

/// Treat empty or whitespace-only strings as unset
pub fn is_configured(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_opt(slot: &mut Option<String>, env_name: &str) {
    if let Some(value) = non_empty_env(env_name) {
        *slot = Some(value);
    }
}
