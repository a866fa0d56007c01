//! Per-tab ephemeral storage
//!
//! Session-scoped keys (the session id) live only as long as the tab keeps
//! reporting. A tab idle for longer than the TTL is evicted, and one coming
//! back after that starts with an empty store, the same as a reopened tab.

use moka::future::Cache;
use std::time::Duration;
use xma_common::MemoryStore;

/// Tabs idle longer than this lose their ephemeral state
pub const DEFAULT_TAB_TTL: Duration = Duration::from_secs(30 * 60);

/// Tabs held at once; least recently used beyond this are evicted
pub const DEFAULT_MAX_TABS: u64 = 100_000;

/// Registry of ephemeral stores keyed by tab id
#[derive(Clone)]
pub struct TabStores {
    tabs: Cache<String, MemoryStore>,
}

impl Default for TabStores {
    fn default() -> Self {
        Self::new(DEFAULT_TAB_TTL)
    }
}

impl TabStores {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_TABS)
    }

    pub fn with_capacity(ttl: Duration, max_tabs: u64) -> Self {
        Self {
            tabs: Cache::builder()
                .max_capacity(max_tabs)
                .time_to_idle(ttl)
                .eviction_listener(|tab_id, _store, cause| {
                    tracing::debug!(tab_id = %tab_id, ?cause, "Tab store evicted");
                })
                .build(),
        }
    }

    /// Store for `tab_id`, created on first use; refreshes its idle timer
    pub async fn store_for(&self, tab_id: &str) -> MemoryStore {
        self.tabs
            .get_with(tab_id.to_string(), async { MemoryStore::new() })
            .await
    }

    /// Number of tabs currently tracked
    pub async fn len(&self) -> usize {
        self.tabs.run_pending_tasks().await;
        self.tabs.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
