use crate::error::provider::ProviderError;

use common::ErrorLocation;

use thiserror::Error as ThisError;
use tokio::task::JoinError;

#[derive(Debug, ThisError)]
pub enum ProxyError {
    #[error("Startup Error: {message} {location}")]
    Startup {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ProviderError,
    },

    #[error("Already Started Error: {message} {location}")]
    AlreadyStarted {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Started Error: {message} {location}")]
    NotStarted {
        message: String,
        location: ErrorLocation,
    },

    #[error("Closed Error: {message} {location}")]
    Closed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Listener Error: {message} {location}")]
    Listener {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ProviderError,
    },

    #[error("No Certificate Domains Error: {message} {location}")]
    NoCertificateDomains {
        message: String,
        location: ErrorLocation,
    },

    #[error("Certificate Error: {message} {location}")]
    Certificate {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ProviderError,
    },

    #[error("Shutdown Error: {message} {location}")]
    Shutdown {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ProviderError,
    },

    #[error("Watcher Join Error: {message} {location}")]
    WatcherJoin {
        message: String,
        location: ErrorLocation,
        #[source]
        source: JoinError,
    },
}
