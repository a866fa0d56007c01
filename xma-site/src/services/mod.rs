//! Third-party service clients
//!
//! Each client owns its `reqwest::Client` and is injected through `AppState`.

pub mod contentful_client;
pub mod lead_webhook;
pub mod sanity_client;
pub mod stripe_client;

pub use contentful_client::ContentfulSource;
pub use lead_webhook::{LeadPayload, LeadWebhookClient, WebhookError};
pub use sanity_client::SanitySource;
pub use stripe_client::{CheckoutSession, StripeClient, StripeError};
