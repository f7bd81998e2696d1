use std::fmt::{Display, Formatter, Result as FormatResult};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// The identity provider's own view of its backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    NoState,
    NeedsLogin,
    NeedsMachineAuth,
    Stopped,
    Starting,
    Running,
}

impl Display for BackendState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            BackendState::NoState => "NoState",
            BackendState::NeedsLogin => "NeedsLogin",
            BackendState::NeedsMachineAuth => "NeedsMachineAuth",
            BackendState::Stopped => "Stopped",
            BackendState::Starting => "Starting",
            BackendState::Running => "Running",
        };
        f.write_str(name)
    }
}

/// One message from the provider's notification bus.
///
/// Any combination of fields may be set; the watcher inspects them in a
/// fixed order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    #[serde(default)]
    pub err_message: Option<String>,
    #[serde(default)]
    pub browse_to_url: Option<String>,
    #[serde(default)]
    pub login_finished: bool,
    #[serde(default)]
    pub state: Option<BackendState>,
}

impl Notification {
    pub fn browse_to(url: impl Into<String>) -> Self {
        Self {
            browse_to_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn login_finished() -> Self {
        Self {
            login_finished: true,
            ..Default::default()
        }
    }

    pub fn state(state: BackendState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// What the provider knows about this node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelfStatus {
    /// Fully-qualified name, usually with a trailing root dot (`host.ts.net.`).
    pub dns_name: String,
    pub host_name: String,
    #[serde(default)]
    pub tailscale_ips: Vec<IpAddr>,
    #[serde(default)]
    pub online: bool,
}

/// Point-in-time status fetched from the control client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub backend_state: BackendState,
    #[serde(default)]
    pub self_node: Option<SelfStatus>,
    #[serde(default)]
    pub cert_domains: Vec<String>,
}

impl StatusSnapshot {
    /// Assigned DNS name without the trailing root label separator.
    ///
    /// `None` when the snapshot has no self node or the name is still empty.
    pub fn normalized_dns_name(&self) -> Option<&str> {
        let name = self.self_node.as_ref()?.dns_name.trim_end_matches('.');
        if name.is_empty() { None } else { Some(name) }
    }
}

/// PEM encoded certificate chain and private key.
#[derive(Clone, PartialEq, Eq)]
pub struct CertPair {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for CertPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("CertPair")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}
