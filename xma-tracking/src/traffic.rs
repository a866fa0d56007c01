//! Traffic-source classification
//!
//! Maps a UTM source and/or referrer to a canonical source label. Pure; the
//! label is recomputed whenever needed and never stored on its own.

use std::fmt;
use url::Url;

/// Canonical traffic source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficSource {
    /// `utm_source` value, taken literally
    Campaign(String),
    GoogleOrganic,
    BingOrganic,
    Facebook,
    Instagram,
    LinkedIn,
    Twitter,
    YouTube,
    TikTok,
    /// Referrer host not in the known list
    Referral(String),
    Direct,
    /// Referrer present but not a parseable URL with a host
    Unknown,
}

impl TrafficSource {
    pub fn as_str(&self) -> &str {
        match self {
            TrafficSource::Campaign(source) => source,
            TrafficSource::GoogleOrganic => "google_organic",
            TrafficSource::BingOrganic => "bing_organic",
            TrafficSource::Facebook => "facebook",
            TrafficSource::Instagram => "instagram",
            TrafficSource::LinkedIn => "linkedin",
            TrafficSource::Twitter => "twitter",
            TrafficSource::YouTube => "youtube",
            TrafficSource::TikTok => "tiktok",
            TrafficSource::Referral(host) => host,
            TrafficSource::Direct => "direct",
            TrafficSource::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known referrer hosts, checked in order; first substring hit wins
const KNOWN_REFERRERS: &[(&[&str], TrafficSource)] = &[
    (&["google"], TrafficSource::GoogleOrganic),
    (&["bing"], TrafficSource::BingOrganic),
    (&["facebook", "fb.com"], TrafficSource::Facebook),
    (&["instagram"], TrafficSource::Instagram),
    (&["linkedin"], TrafficSource::LinkedIn),
    (&["twitter", "x.com"], TrafficSource::Twitter),
    (&["youtube"], TrafficSource::YouTube),
    (&["tiktok"], TrafficSource::TikTok),
];

/// Classify where a visit came from
///
/// Empty strings are treated the same as missing values.
pub fn classify_traffic_source(utm_source: Option<&str>, referrer: Option<&str>) -> TrafficSource {
    if let Some(source) = utm_source.filter(|s| !s.is_empty()) {
        return TrafficSource::Campaign(source.to_string());
    }

    let Some(referrer) = referrer.filter(|r| !r.is_empty()) else {
        return TrafficSource::Direct;
    };

    let host = match Url::parse(referrer) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return TrafficSource::Unknown,
        },
        Err(_) => return TrafficSource::Unknown,
    };

    KNOWN_REFERRERS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| host.contains(*n)))
        .map(|(_, source)| source.clone())
        .unwrap_or(TrafficSource::Referral(host))
}

/// Host portion of a referrer, `None` if it is not a URL with a host
pub fn referrer_domain(referrer: &str) -> Option<String> {
    Url::parse(referrer)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
}
