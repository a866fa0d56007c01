//! Checkout line-item composition
//!
//! Packages and add-ons are sold through fixed Stripe prices. The mapping is
//! static; a new product means a new entry here.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Package identifier → Stripe price id
pub const PACKAGE_PRICE_IDS: &[(&str, &str)] = &[
    ("starter", "price_1PkStarterWebsitePkg"),
    ("standard", "price_1PkStandardWebsitePkg"),
    ("premium", "price_1PkPremiumWebsitePkg"),
];

/// Add-on identifier → Stripe price id
pub const ADDON_PRICE_IDS: &[(&str, &str)] = &[
    ("hosting", "price_1PkAddonHosting"),
    ("domain", "price_1PkAddonDomain"),
    ("seo", "price_1PkAddonSeo"),
    ("maintenance", "price_1PkAddonMaintenance"),
    ("copywriting", "price_1PkAddonCopywriting"),
];

/// One Stripe checkout line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub price: String,
    pub quantity: u32,
}

impl LineItem {
    pub fn single(price: &str) -> Self {
        Self {
            price: price.to_string(),
            quantity: 1,
        }
    }
}

fn lookup(table: &[(&str, &'static str)], id: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, price)| *price)
}

pub fn package_price(package: &str) -> Option<&'static str> {
    lookup(PACKAGE_PRICE_IDS, package)
}

pub fn addon_price(addon: &str) -> Option<&'static str> {
    lookup(ADDON_PRICE_IDS, addon)
}

/// Package first, then add-ons in the order given, one of each
///
/// Unknown identifiers are skipped with a warning; an empty result is
/// rejected later, when the checkout session is requested.
pub fn build_line_items<S: AsRef<str>>(package: &str, addons: &[S]) -> Vec<LineItem> {
    let mut items = Vec::with_capacity(addons.len() + 1);

    match package_price(package) {
        Some(price) => items.push(LineItem::single(price)),
        None => warn!(package, "Unknown package in checkout request"),
    }

    for addon in addons {
        let addon = addon.as_ref();
        match addon_price(addon) {
            Some(price) => items.push(LineItem::single(price)),
            None => warn!(addon, "Unknown add-on in checkout request"),
        }
    }

    items
}
