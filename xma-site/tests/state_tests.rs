//! AppState construction from configuration

use std::sync::Arc;
use xma_common::config::{ContentProvider, TomlConfig};
use xma_common::events::EventBus;
use xma_site::{db, AppState};
use xma_tracking::NoopSink;

async fn state_for(config: &TomlConfig) -> AppState {
    let pool = db::init_memory_database().await.unwrap();
    AppState::from_config(pool, config, EventBus::new(8), Arc::new(NoopSink)).unwrap()
}

#[tokio::test]
async fn test_defaults_leave_integrations_unset() {
    let state = state_for(&TomlConfig::default()).await;
    assert!(state.stripe.is_none());
    assert!(state.lead_webhook.is_none());
    assert!(state.content.is_none());
    assert_eq!(state.site_host, "localhost");
}

#[tokio::test]
async fn test_blank_secrets_count_as_missing() {
    let mut config = TomlConfig::default();
    config.stripe.secret_key = Some("   ".into());
    config.leads.webhook_url = Some(String::new());

    let state = state_for(&config).await;
    assert!(state.stripe.is_none());
    assert!(state.lead_webhook.is_none());
}

#[tokio::test]
async fn test_configured_integrations_are_built() {
    let config = TomlConfig::from_toml_str(
        r#"
        site_host = "xmagency.com"

        [stripe]
        secret_key = "sk_test_abc"

        [leads]
        webhook_url = "https://hooks.example.com/lead"

        [content]
        provider = "sanity"

        [content.sanity]
        project_id = "abc123"
        "#,
    )
    .unwrap();

    let state = state_for(&config).await;
    assert!(state.stripe.is_some());
    assert!(state.lead_webhook.is_some());
    assert_eq!(state.content.as_ref().map(|c| c.provider()), Some("sanity"));
    assert_eq!(state.site_host, "xmagency.com");
}

#[tokio::test]
async fn test_selected_provider_without_credentials_is_disabled() {
    let mut config = TomlConfig::default();
    config.content.provider = Some(ContentProvider::Contentful);
    config.content.contentful.space_id = "space1".into();

    let state = state_for(&config).await;
    assert!(state.content.is_none());
}
