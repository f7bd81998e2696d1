//! Listener factory and certificate pre-warm.
//!
//! Thin pass-through to the identity provider. Nothing here touches the
//! lifecycle state.

use crate::error::proxy::ProxyError;
use crate::provider::{ControlClient, IdentityServer};
use crate::proxy::Proxy;

use common::ErrorLocation;

use std::panic::Location;

use log::{debug, info};

impl<S: IdentityServer> Proxy<S> {
    /// Plain listener inside the overlay network.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Listener`] if the provider refuses the listener.
    pub async fn new_listener(
        &self,
        network: &str,
        address: &str,
    ) -> Result<S::Listener, ProxyError> {
        debug!("Requesting {network} listener on {address}");

        self.server
            .listen(network, address)
            .await
            .map_err(|e| ProxyError::Listener {
                message: format!("Failed to listen on {network} {address}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })
    }

    /// TLS listener using the node's own certificate.
    ///
    /// With `tailscale.funnel` enabled the listener is also exposed outside
    /// the overlay network.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Listener`] if the provider refuses the listener.
    pub async fn new_tls_listener(
        &self,
        network: &str,
        address: &str,
    ) -> Result<S::Listener, ProxyError> {
        let listener = if self.config.tailscale.funnel {
            debug!("Requesting funnel listener on {network} {address}");
            self.server.listen_funnel(network, address).await
        } else {
            debug!("Requesting TLS listener on {network} {address}");
            self.server.listen_tls(network, address).await
        };

        listener.map_err(|e| ProxyError::Listener {
            message: format!("Failed to listen with TLS on {network} {address}"),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })
    }

    /// Ask the provider to mint a certificate for the node's first domain.
    ///
    /// Not called automatically. Lets the first TLS handshake skip the wait
    /// for issuance.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::NotStarted`] - no control client yet
    /// - [`ProxyError::NoCertificateDomains`] - the provider lists no domains
    /// - [`ProxyError::Certificate`] - issuance failed
    pub async fn prewarm_tls_certificates(&self) -> Result<(), ProxyError> {
        let client = self.client.get().ok_or_else(|| ProxyError::NotStarted {
            message: "Cannot generate TLS certificate before start".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!("Generating TLS certificate");

        let domains = self.server.cert_domains();
        let domain = domains.first().ok_or_else(|| ProxyError::NoCertificateDomains {
            message: "Identity provider has no certificate domains".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        client
            .cert_pair(domain)
            .await
            .map_err(|e| ProxyError::Certificate {
                message: format!("Failed to generate certificate for {domain}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        info!("TLS certificate generated");
        Ok(())
    }
}
