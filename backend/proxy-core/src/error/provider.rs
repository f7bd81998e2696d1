use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failures reported by the identity provider or its control client.
///
/// The watcher branches on the variant: `ListenerClosed` during a status
/// fetch is a shutdown race, `Cancelled` ends the loop quietly, anything
/// else is logged.
#[derive(Debug, ThisError)]
pub enum ProviderError {
    #[error("Listener Closed Error: {message} {location}")]
    ListenerClosed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Cancelled Error: {message} {location}")]
    Cancelled {
        message: String,
        location: ErrorLocation,
    },

    #[error("Backend Error: {message} {location}")]
    Backend {
        message: String,
        location: ErrorLocation,
    },
}

impl ProviderError {
    #[track_caller]
    pub fn listener_closed(message: impl Into<String>) -> Self {
        ProviderError::ListenerClosed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn cancelled(message: impl Into<String>) -> Self {
        ProviderError::Cancelled {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn backend(message: impl Into<String>) -> Self {
        ProviderError::Backend {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn is_listener_closed(&self) -> bool {
        matches!(self, ProviderError::ListenerClosed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled { .. })
    }
}
