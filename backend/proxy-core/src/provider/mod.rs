//! Seams to the external identity provider.
//!
//! The proxy core never talks to the overlay network directly. It drives
//! three collaborators through these traits:
//!
//! - [`IdentityServer`] - the embedded node: start/close, listeners, cert domains
//! - [`ControlClient`] - the node's local API: notifications, status, certificates
//! - [`NotificationStream`] - one live subscription to the notification bus
//!
//! Implementations are expected to be cheap to share behind `Arc`.

mod types;

pub use types::{BackendState, CertPair, Notification, SelfStatus, StatusSnapshot};

use crate::error::provider::ProviderError;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The embedded overlay node that grants this proxy its identity.
#[async_trait]
pub trait IdentityServer: Send + Sync + 'static {
    type Client: ControlClient;
    type Listener: Send + 'static;

    async fn start(&self) -> Result<(), ProviderError>;

    async fn local_client(&self) -> Result<Arc<Self::Client>, ProviderError>;

    async fn listen(&self, network: &str, address: &str) -> Result<Self::Listener, ProviderError>;

    async fn listen_tls(&self, network: &str, address: &str)
    -> Result<Self::Listener, ProviderError>;

    /// Listener reachable from outside the overlay network.
    async fn listen_funnel(
        &self,
        network: &str,
        address: &str,
    ) -> Result<Self::Listener, ProviderError>;

    /// Domains the node may request certificates for, most specific first.
    fn cert_domains(&self) -> Vec<String>;

    async fn close(&self) -> Result<(), ProviderError>;
}

/// Local control API of a running [`IdentityServer`].
#[async_trait]
pub trait ControlClient: Send + Sync + 'static {
    type Stream: NotificationStream;

    /// Subscribe to the notification bus.
    ///
    /// With `initial_state` set, the first notification carries the full
    /// current state. The subscription must end once `cancel` fires.
    async fn watch_notifications(
        &self,
        cancel: CancellationToken,
        initial_state: bool,
    ) -> Result<Self::Stream, ProviderError>;

    async fn status(&self) -> Result<StatusSnapshot, ProviderError>;

    async fn cert_pair(&self, domain: &str) -> Result<CertPair, ProviderError>;
}

/// A live subscription handed out by [`ControlClient::watch_notifications`].
#[async_trait]
pub trait NotificationStream: Send + 'static {
    async fn next(&mut self) -> Result<Notification, ProviderError>;

    /// Release the subscription. Called exactly once, from a drop guard.
    fn close(&mut self);
}
