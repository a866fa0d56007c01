//! Integration tests for xma-site API endpoints
//!
//! Third-party services (Stripe, lead webhook, Contentful) are stood in for
//! by wiremock servers; durable storage is an in-memory SQLite database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xma_common::events::{AnalyticsEvent, EventBus};
use xma_site::services::{ContentfulSource, LeadWebhookClient, StripeClient};
use xma_site::{build_router, db, AppState};
use xma_tracking::{NoopSink, RecordingSink};

/// Test helper: state with tracking only, no integrations
async fn setup_state() -> AppState {
    let pool = db::init_memory_database().await.expect("Should open memory database");
    AppState::new(
        pool,
        EventBus::new(64),
        Arc::new(NoopSink),
        vec!["/studio".to_string(), "/admin".to_string()],
        "xmagency.com",
    )
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn stripe_client(base: &str) -> StripeClient {
    StripeClient::new(
        "sk_test_abc".into(),
        base,
        "https://xmagency.com/success".into(),
        "https://xmagency.com/pricing".into(),
    )
    .unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(setup_state().await);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "xma-site");
    assert!(body["version"].is_string());
    assert_eq!(body["integrations"]["stripe"], false);
    assert!(body["integrations"]["content"].is_null());
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_empty_line_items_rejected() {
    let app = build_router(setup_state().await);

    for body in [json!({ "lineItems": [] }), json!({})] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/checkout", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body, json!({ "error": "Missing required parameters" }));
    }
}

#[tokio::test]
async fn test_checkout_creates_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_42",
            "url": "https://checkout.stripe.com/c/pay/cs_test_42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = setup_state().await.with_stripe(stripe_client(&server.uri()));
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/checkout",
            json!({ "lineItems": [{ "price": "price_1PkStarterWebsitePkg", "quantity": 1 }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["sessionId"], "cs_test_42");
}

#[tokio::test]
async fn test_checkout_provider_failure_is_generic_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "message": "Your card was declined." }
        })))
        .mount(&server)
        .await;

    let app = build_router(setup_state().await.with_stripe(stripe_client(&server.uri())));
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/checkout",
            json!({ "lineItems": [{ "price": "price_x", "quantity": 1 }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(!body["error"].as_str().unwrap().contains("declined"));
}

#[tokio::test]
async fn test_checkout_without_stripe_is_500() {
    let app = build_router(setup_state().await);
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/checkout",
            json!({ "lineItems": [{ "price": "price_x", "quantity": 1 }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_package_checkout_composes_line_items() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(wiremock::matchers::body_string_contains(
            "line_items%5B2%5D%5Bprice%5D=price_1PkAddonDomain",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cs_pkg" })))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_router(setup_state().await.with_stripe(stripe_client(&server.uri())));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/checkout/package",
            json!({ "package": "standard", "addOns": ["hosting", "domain"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["sessionId"], "cs_pkg");

    // nothing recognisable left to buy
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/checkout/package",
            json!({ "package": "platinum", "addOns": ["yacht"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Leads
// =============================================================================

fn lead_body() -> Value {
    json!({
        "name": "Ada",
        "email": "ada@example.com",
        "phone": "555-0100",
        "message": "We need a new site",
        "source": "contact_page"
    })
}

#[tokio::test]
async fn test_lead_validation_messages() {
    let app = build_router(setup_state().await);

    let cases = [
        (json!({ "name": "", "email": "a@b.com", "phone": "123" }), "Name is required"),
        (
            json!({ "name": "A", "email": "bad-email", "phone": "123", "message": "hi" }),
            "Please enter a valid email address",
        ),
    ];
    for (body, expected) in cases {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/leads", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], expected);
    }
}

#[tokio::test]
async fn test_lead_forwarded_with_origin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(wiremock::matchers::body_partial_json(json!({
            "email": "ada@example.com",
            "origin": "https://xmagency.com"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let webhook = LeadWebhookClient::new(format!("{}/hook", server.uri())).unwrap();
    let app = build_router(setup_state().await.with_lead_webhook(webhook));

    let request = Request::builder()
        .method("POST")
        .uri("/api/leads")
        .header("content-type", "application/json")
        .header("origin", "https://xmagency.com")
        .body(Body::from(lead_body().to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Thank you! We'll be in touch soon.");
}

#[tokio::test]
async fn test_lead_webhook_failure_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let webhook = LeadWebhookClient::new(server.uri()).unwrap();
    let app = build_router(setup_state().await.with_lead_webhook(webhook));

    let response = app
        .oneshot(json_request("POST", "/api/leads", lead_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(extract_json(response.into_body()).await["success"], false);
}

#[tokio::test]
async fn test_lead_without_webhook_is_500() {
    let app = build_router(setup_state().await);
    let response = app
        .oneshot(json_request("POST", "/api/leads", lead_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Navigation tracking
// =============================================================================

#[tokio::test]
async fn test_navigation_records_attribution_and_landing_view() {
    let state = setup_state().await;
    let mut events = state.event_bus.subscribe();
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/track/navigation",
            json!({
                "visitor_id": "visitor-1",
                "tab_id": "tab-1",
                "path": "/services",
                "query": "?utm_source=newsletter&utm_campaign=spring",
                "referrer": "https://www.google.com/search?q=agency",
                "session_id": "session-1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let first = events.try_recv().expect("landing view emitted");
    assert_eq!(first.name(), "landing_page_view");
    match first {
        AnalyticsEvent::LandingPageView {
            traffic_source,
            is_first_session,
            ..
        } => {
            assert_eq!(traffic_source, "newsletter");
            assert!(is_first_session);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(events.try_recv().map(|e| e.name()), Some("attribution_captured"));

    // same session, new page: no further landing view
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/track/navigation",
            json!({
                "visitor_id": "visitor-1",
                "tab_id": "tab-1",
                "path": "/pricing",
                "session_id": "session-1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(events.try_recv().is_none());

    let response = app
        .oneshot(get_request("/api/track/attribution/visitor-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["first_touch"]["utm_source"], "newsletter");
    assert_eq!(body["first_touch"]["landing_page"], "/services");
    assert_eq!(body["traffic_source"], "newsletter");
}

#[tokio::test]
async fn test_excluded_path_leaves_no_trace() {
    let state = setup_state().await;
    let mut events = state.event_bus.subscribe();
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/track/navigation",
            json!({
                "visitor_id": "editor",
                "tab_id": "tab-9",
                "path": "/studio/desk",
                "query": "utm_source=internal",
                "session_id": "s"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(events.try_recv().is_none());

    let body = extract_json(
        app.oneshot(get_request("/api/track/attribution/editor"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    assert!(body.get("first_touch").is_none());
    assert!(body.get("last_touch").is_none());
    assert_eq!(body["traffic_source"], "direct");
}

#[tokio::test]
async fn test_navigation_invalid_body_rejected() {
    let app = build_router(setup_state().await);
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/track/navigation",
            json!({ "visitor_id": "v", "path": "/" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Web Vitals
// =============================================================================

#[tokio::test]
async fn test_vital_published_on_bus() {
    let state = setup_state().await;
    let mut events = state.event_bus.subscribe();
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/vitals",
            json!({
                "visitor_id": "visitor-1",
                "name": "LCP",
                "value": 2140.5,
                "rating": "needs-improvement",
                "id": "v3-1700000000000-123",
                "path": "/"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let event = events.try_recv().expect("web vital emitted");
    assert_eq!(event.name(), "web_vital");
    assert_eq!(event.distinct_id(), "visitor-1");
}

#[tokio::test]
async fn test_vital_carries_registered_super_properties() {
    let pool = db::init_memory_database().await.unwrap();
    let state = AppState::new(
        pool,
        EventBus::new(64),
        Arc::new(RecordingSink::new()),
        Vec::new(),
        "xmagency.com",
    );
    let mut events = state.event_bus.subscribe();
    let app = build_router(state);

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/track/navigation",
            json!({
                "visitor_id": "visitor-1",
                "tab_id": "tab-1",
                "path": "/",
                "query": "?utm_source=newsletter",
                "session_id": "session-1"
            }),
        ))
        .await
        .unwrap();
    while events.try_recv().is_some() {}

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/vitals",
            json!({
                "visitor_id": "visitor-1",
                "name": "CLS",
                "value": 0.01,
                "rating": "good",
                "id": "v3-cls",
                "path": "/"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let event = events.try_recv().expect("web vital emitted");
    assert_eq!(event.name(), "web_vital");
    assert_eq!(
        event.super_properties().once["initial_utm_source"],
        "newsletter"
    );
    assert_eq!(event.properties()["current_utm_source"], "newsletter");
}

// =============================================================================
// Content
// =============================================================================

#[tokio::test]
async fn test_content_unconfigured_is_503() {
    let app = build_router(setup_state().await);
    let response = app.oneshot(get_request("/api/blog")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

async fn contentful_state(server: &MockServer) -> AppState {
    let source = ContentfulSource::new(&server.uri(), "space1", "master", "token".into()).unwrap();
    setup_state().await.with_content(Arc::new(source))
}

fn entry(slug: &str, category: &str, tags: &[&str], date: &str) -> Value {
    json!({
        "sys": { "id": slug },
        "fields": {
            "slug": slug,
            "title": slug,
            "category": category,
            "tags": tags,
            "publishedAt": date
        }
    })
}

#[tokio::test]
async fn test_blog_listing_filters_and_related() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spaces/space1/environments/master/entries"))
        .and(wiremock::matchers::query_param("content_type", "blogPost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                entry("seo-basics", "Marketing", &["seo"], "2025-01-05"),
                entry("brand-voice", "Design", &["branding"], "2025-01-09"),
                entry("local-seo", "Marketing", &["seo", "local"], "2025-01-07")
            ]
        })))
        .mount(&server)
        .await;

    let app = build_router(contentful_state(&server).await);

    let response = app
        .clone()
        .oneshot(get_request("/api/blog?category=marketing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let slugs: Vec<_> = body.as_array().unwrap().iter().map(|p| p["slug"].clone()).collect();
    assert_eq!(slugs, vec![json!("local-seo"), json!("seo-basics")]);

    let body = extract_json(
        app.clone()
            .oneshot(get_request("/api/blog/seo-basics/related"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    assert_eq!(body[0]["slug"], "local-seo");
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get_request("/api/blog/missing/related"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blog_post_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let app = build_router(contentful_state(&server).await);
    let response = app.oneshot(get_request("/api/blog/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cms_failure_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = build_router(contentful_state(&server).await);
    let response = app
        .oneshot(get_request("/api/portfolio?featured=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
