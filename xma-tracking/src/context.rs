//! Navigation context
//!
//! Everything the tracker needs to know about one route change, passed in
//! explicitly instead of being read from browser globals.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use xma_common::events::AttributionFields;

use crate::traffic::referrer_domain;

/// Inputs for one route change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationContext {
    /// Analytics identity the events belong to
    pub distinct_id: String,
    /// Current path, without query string
    pub path: String,
    /// Decoded query parameters in URL order
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub referrer: Option<String>,
    /// Host of the site being visited
    pub site_host: String,
    /// Session id issued by the analytics SDK, if it is loaded
    #[serde(default)]
    pub session_id: Option<String>,
}

impl NavigationContext {
    pub fn new(distinct_id: impl Into<String>, path: impl Into<String>, site_host: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            path: path.into(),
            site_host: site_host.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Parse a raw query string, with or without the leading `?`
    pub fn with_query_string(mut self, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        self.query = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        let referrer = referrer.into();
        self.referrer = if referrer.is_empty() { None } else { Some(referrer) };
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// First non-empty value for a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// Referrer, if present and non-empty
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref().filter(|r| !r.is_empty())
    }

    /// UTM tags and referrer details for this navigation
    pub fn attribution_fields(&self) -> AttributionFields {
        let param = |name: &str| self.param(name).map(str::to_string);
        AttributionFields {
            utm_source: param("utm_source"),
            utm_medium: param("utm_medium"),
            utm_campaign: param("utm_campaign"),
            utm_term: param("utm_term"),
            utm_content: param("utm_content"),
            referrer: self.referrer().map(str::to_string),
            referrer_domain: self.referrer().and_then(referrer_domain),
        }
    }

    /// True if the referrer parses and points at a different host than the site
    pub fn is_external_referrer(&self) -> bool {
        match self.referrer().and_then(referrer_domain) {
            Some(host) => !host.eq_ignore_ascii_case(&self.site_host),
            None => false,
        }
    }

    /// True if the path equals one of the prefixes or lies beneath it
    pub fn is_excluded(&self, prefixes: &[String]) -> bool {
        prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            !prefix.is_empty()
                && (self.path == prefix
                    || self
                        .path
                        .strip_prefix(prefix)
                        .map(|rest| rest.starts_with('/'))
                        .unwrap_or(false))
        })
    }
}
