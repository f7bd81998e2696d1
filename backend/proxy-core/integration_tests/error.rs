use proxy_core::error::{ConfigError, CoreError, ProviderError, ProxyError};

use common::ErrorLocation;

use std::error::Error;
use std::panic::Location;

/// **VALUE**: Verifies that `ProxyError::Startup` carries message, location and source.
///
/// **WHY THIS MATTERS**: A failed `start` is the one proxy error an operator sees
/// directly. It has to say where it failed and why the provider refused.
///
/// **BUG THIS CATCHES**: Would catch the `#[source]` attribute or the location being
/// dropped from the Display format.
#[test]
fn given_startup_error_when_formatted_then_includes_location_and_source() {
    // GIVEN: A startup error wrapping a provider failure
    let err = ProxyError::Startup {
        message: "Identity provider failed to start".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: ProviderError::backend("state dir not writable"),
    };

    // WHEN: Formatting and walking the chain
    let error_string = format!("{}", err);
    let source = err.source().expect("source").to_string();

    // THEN: Message, location and cause are all present
    assert!(error_string.contains("Startup Error"));
    assert!(error_string.contains("Identity provider failed to start"));
    assert!(error_string.contains("error.rs"));
    assert!(source.contains("state dir not writable"));
}

/// **VALUE**: Verifies every provider-backed proxy error keeps the provider error as
/// its source.
///
/// **BUG THIS CATCHES**: Would catch a variant flattening the cause into its message and
/// losing the chain.
#[test]
fn given_provider_backed_errors_when_walked_then_source_is_the_provider_error() {
    let errors = [
        ProxyError::Listener {
            message: "Failed to listen".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: ProviderError::backend("port in use"),
        },
        ProxyError::Certificate {
            message: "Failed to generate certificate".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: ProviderError::backend("rate limited"),
        },
        ProxyError::Shutdown {
            message: "Failed to close identity provider".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: ProviderError::listener_closed("already closed"),
        },
    ];

    for err in errors {
        let source = err.source().expect("source");
        assert!(
            source.downcast_ref::<ProviderError>().is_some(),
            "Source should be a ProviderError: {err}"
        );
    }
}

/// **VALUE**: Verifies provider constructors record where they were called.
///
/// **BUG THIS CATCHES**: Would catch `#[track_caller]` being removed from the helpers,
/// which would point every provider error at `provider.rs`.
#[test]
fn given_provider_helper_when_called_then_location_is_the_call_site() {
    let err = ProviderError::listener_closed("use of closed network connection");

    assert!(err.is_listener_closed());
    assert!(!err.is_cancelled());
    assert!(format!("{err}").contains("error.rs"));
}

/// **VALUE**: Verifies `CoreError` is a transparent wrapper.
#[test]
fn given_config_error_when_wrapped_in_core_error_then_display_is_unchanged() {
    let err = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: "hostname cannot be empty".to_string(),
    };
    let expected = err.to_string();

    let core: CoreError = err.into();

    assert_eq!(core.to_string(), expected);
}
