//! HTTP API handlers for xma-site

pub mod checkout;
pub mod content;
pub mod health;
pub mod leads;
pub mod tracking;
pub mod vitals;

pub use checkout::{create_checkout, create_package_checkout};
pub use content::{get_post, get_project, list_posts, list_projects, related_posts};
pub use health::health_routes;
pub use leads::submit_lead;
pub use tracking::{get_attribution, track_navigation};
pub use vitals::report_vital;
