//! Session-change detection
//!
//! The analytics SDK issues the session id; the tracker only remembers the
//! last one it saw in the tab's ephemeral store. A different id (or none
//! remembered) marks the start of a new session.

use tracing::debug;
use xma_common::KeyValueStore;

use crate::snapshot::SESSION_KEY;

/// Result of comparing the live session id with the remembered one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// Same id as last time
    Unchanged,
    /// New session; `previous` is the id remembered before this call
    Started { previous: Option<String> },
}

impl SessionChange {
    pub fn is_new(&self) -> bool {
        matches!(self, SessionChange::Started { .. })
    }
}

/// Compare `session_id` with the cached one, caching it when it differs
///
/// Read failures count as "nothing remembered"; write failures are logged.
pub async fn detect_session_change(ephemeral: &dyn KeyValueStore, session_id: &str) -> SessionChange {
    let previous = match ephemeral.get(SESSION_KEY).await {
        Ok(value) => value,
        Err(e) => {
            debug!("Session marker read failed: {}", e);
            None
        }
    };

    if previous.as_deref() == Some(session_id) {
        return SessionChange::Unchanged;
    }

    if let Err(e) = ephemeral.set(SESSION_KEY, session_id).await {
        debug!("Session marker write failed: {}", e);
    }

    SessionChange::Started { previous }
}
