//! PostHog capture API client
//!
//! Events go to `POST {host}/capture/`. The super-properties an event carries
//! are merged into its properties; write-once properties are also sent as
//! `$set_once` and overwriting ones as `$set` so they land on the person
//! profile.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use xma_common::events::AnalyticsEvent;
use xma_common::time::to_rfc3339_millis;

use crate::sink::{AnalyticsSink, SinkError, SuperProperties, SuperPropertyRegistry};

const USER_AGENT: &str = concat!("xma-site/", env!("CARGO_PKG_VERSION"));

/// Body of a single capture request
#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    api_key: &'a str,
    event: &'a str,
    distinct_id: &'a str,
    properties: Map<String, Value>,
    timestamp: String,
}

/// PostHog client
pub struct PostHogClient {
    http_client: reqwest::Client,
    api_key: String,
    capture_url: String,
    registry: SuperPropertyRegistry,
}

impl PostHogClient {
    pub fn new(api_key: String, host: &str) -> Result<Self, SinkError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            capture_url: format!("{}/capture/", host.trim_end_matches('/')),
            registry: SuperPropertyRegistry::new(),
        })
    }

    pub fn capture_url(&self) -> &str {
        &self.capture_url
    }

    fn build_properties(event: &AnalyticsEvent) -> Map<String, Value> {
        let mut properties = event.properties();
        let snapshot = event.super_properties();
        if !snapshot.once.is_empty() {
            properties.insert("$set_once".into(), Value::Object(snapshot.once.clone()));
        }
        if !snapshot.current.is_empty() {
            properties.insert("$set".into(), Value::Object(snapshot.current.clone()));
        }
        properties
    }
}

#[async_trait]
impl AnalyticsSink for PostHogClient {
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
        let body = CaptureRequest {
            api_key: &self.api_key,
            event: event.name(),
            distinct_id: event.distinct_id(),
            properties: Self::build_properties(event),
            timestamp: to_rfc3339_millis(event.timestamp()),
        };

        tracing::debug!(
            event = event.name(),
            distinct_id = event.distinct_id(),
            "Sending event to PostHog"
        );

        let response = self
            .http_client
            .post(&self.capture_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SinkError::Api(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xma_common::events::AttributionFields;

    fn landing() -> AnalyticsEvent {
        landing_with(SuperProperties::default())
    }

    fn landing_with(super_properties: SuperProperties) -> AnalyticsEvent {
        AnalyticsEvent::LandingPageView {
            distinct_id: "visitor-9".into(),
            landing_page: "/services".into(),
            traffic_source: "linkedin".into(),
            attribution: AttributionFields {
                utm_source: Some("linkedin".into()),
                ..Default::default()
            },
            is_first_session: false,
            timestamp: chrono::Utc::now(),
            super_properties,
        }
    }

    #[test]
    fn test_capture_url_normalises_trailing_slash() {
        let client = PostHogClient::new("phc".into(), "https://eu.i.posthog.com/").unwrap();
        assert_eq!(client.capture_url(), "https://eu.i.posthog.com/capture/");
    }

    #[tokio::test]
    async fn test_capture_sends_event_with_super_properties() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/capture/"))
            .and(body_partial_json(json!({
                "api_key": "phc_test",
                "event": "landing_page_view",
                "distinct_id": "visitor-9",
                "properties": {
                    "landing_page": "/services",
                    "utm_source": "linkedin",
                    "is_first_session": false,
                    "initial_utm_source": "google",
                    "$set_once": { "initial_utm_source": "google" },
                    "$set": { "current_utm_source": "linkedin" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PostHogClient::new("phc_test".into(), &server.uri()).unwrap();
        client
            .register_once(
                "visitor-9",
                json!({"initial_utm_source": "google"}).as_object().cloned().unwrap(),
            )
            .await;
        client
            .register(
                "visitor-9",
                json!({"current_utm_source": "linkedin"}).as_object().cloned().unwrap(),
            )
            .await;

        let event = landing_with(client.super_properties("visitor-9").await);

        // registered after the event was produced, so not part of it
        client
            .register(
                "visitor-9",
                json!({"current_utm_source": "twitter"}).as_object().cloned().unwrap(),
            )
            .await;
        client.capture(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_without_super_properties_omits_person_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/capture/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = PostHogClient::new("phc_test".into(), &server.uri()).unwrap();
        client.capture(&landing()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["properties"].get("$set").is_none());
        assert!(body["properties"].get("$set_once").is_none());
    }

    #[tokio::test]
    async fn test_capture_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/capture/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = PostHogClient::new("bad".into(), &server.uri()).unwrap();
        match client.capture(&landing()).await {
            Err(SinkError::Api(status, body)) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
