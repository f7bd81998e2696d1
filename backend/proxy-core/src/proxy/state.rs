//! Lifecycle state shared between the watcher and readers.
//!
//! The three mutable facts about a proxy (lifecycle state, pending auth URL
//! and last status snapshot) live in one record behind one mutex. Nothing
//! outside this module touches the record directly; every read or write is
//! a short method call that takes and releases the lock. The lock is never
//! held across an `.await`.

use crate::PROXY_URL_PREFIX;
use crate::provider::StatusSnapshot;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Where a proxy is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyState {
    /// Constructed, `start` not yet completed.
    #[default]
    Idle,
    /// An auth URL is waiting for the user.
    Authenticating,
    /// Login finished, the node is bringing itself up.
    Starting,
    /// Inferred from a status snapshot with a usable name. Never recorded.
    Running,
    /// Terminal, after `shutdown`.
    Stopped,
}

impl Display for ProxyState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            ProxyState::Idle => "idle",
            ProxyState::Authenticating => "authenticating",
            ProxyState::Starting => "starting",
            ProxyState::Running => "running",
            ProxyState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A lifecycle transition published to event subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEvent {
    /// Set only for `Authenticating` events.
    pub auth_url: String,
    pub state: ProxyState,
}

impl ProxyEvent {
    pub fn authenticating(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            state: ProxyState::Authenticating,
        }
    }

    pub fn starting() -> Self {
        Self {
            auth_url: String::new(),
            state: ProxyState::Starting,
        }
    }
}

#[derive(Debug, Default)]
struct Record {
    state: ProxyState,
    auth_url: String,
    status: Option<StatusSnapshot>,
}

/// The guarded record. Shared between a proxy and its watcher via `Arc`.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    record: Mutex<Record>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves plain values behind, never a
    // half-written one, so a poisoned guard is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin_authentication(&self, auth_url: &str) {
        let mut record = self.lock();
        record.state = ProxyState::Authenticating;
        record.auth_url = auth_url.to_string();
    }

    /// Moves to `Starting`. The previous auth URL is left in place.
    pub(crate) fn finish_login(&self) {
        self.lock().state = ProxyState::Starting;
    }

    pub(crate) fn store_status(&self, status: StatusSnapshot) {
        self.lock().status = Some(status);
    }

    pub(crate) fn mark_stopped(&self) {
        self.lock().state = ProxyState::Stopped;
    }

    pub(crate) fn state(&self) -> ProxyState {
        self.lock().state
    }

    pub(crate) fn auth_url(&self) -> String {
        self.lock().auth_url.clone()
    }

    pub(crate) fn status(&self) -> Option<StatusSnapshot> {
        self.lock().status.clone()
    }

    /// Public URL of the node, or an empty string until a snapshot with a
    /// self node has been stored.
    pub(crate) fn url(&self) -> String {
        let record = self.lock();
        match record.status.as_ref().and_then(|s| s.self_node.as_ref()) {
            Some(node) => format!("{PROXY_URL_PREFIX}{}", node.dns_name.trim_end_matches('.')),
            None => String::new(),
        }
    }

    /// Recorded state, except that `Idle`/`Starting` read as `Running` once
    /// the snapshot carries a usable DNS name.
    pub(crate) fn observed_state(&self) -> ProxyState {
        let record = self.lock();
        let has_name = record
            .status
            .as_ref()
            .and_then(StatusSnapshot::normalized_dns_name)
            .is_some();

        match record.state {
            ProxyState::Idle | ProxyState::Starting if has_name => ProxyState::Running,
            state => state,
        }
    }
}
