use crate::helpers::{FakeProvider, capture_logs, eventually, logged_errors, test_config};

use proxy_core::WatchExit;
use proxy_core::error::ProviderError;
use proxy_core::provider::{BackendState, Notification};

use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

/// **VALUE**: Verifies shutdown during a hung status fetch exits without an error log.
///
/// **WHY THIS MATTERS**: Cancellation is the normal way a proxy stops. Operators alert on
/// error lines, so a clean stop must not produce one.
///
/// **BUG THIS CATCHES**: Would catch cancellation mid-fetch being logged as a status
/// failure.
#[tokio::test]
async fn given_hung_status_fetch_when_shutdown_then_no_error_is_logged() {
    // GIVEN: A running proxy stuck in a status call
    capture_logs();
    let (proxy, feed, probe) = FakeProvider::new()
        .hanging_status()
        .into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");
    feed.send(Ok(Notification::state(BackendState::Starting))).unwrap();
    assert!(eventually(|| probe.status_calls.load(Ordering::SeqCst) == 1).await);

    // WHEN: Shutting down
    let exit = proxy.shutdown().await.expect("shutdown");

    // THEN: Graceful, and silent at error level
    assert_eq!(exit, Some(WatchExit::Cancelled));
    assert_eq!(logged_errors(), Vec::<String>::new());
}

/// **VALUE**: Verifies a provider cancellation error from a status fetch is not logged
/// as an error.
#[tokio::test]
async fn given_cancelled_status_error_when_fetched_then_no_error_is_logged() {
    capture_logs();
    let (proxy, feed, _probe) = FakeProvider::new()
        .with_status(Err(ProviderError::cancelled("context canceled")))
        .into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");

    feed.send(Ok(Notification::state(BackendState::Stopped))).unwrap();
    assert!(eventually(|| !proxy.is_watching()).await);

    assert_eq!(proxy.shutdown().await.expect("shutdown"), Some(WatchExit::Cancelled));
    assert_eq!(logged_errors(), Vec::<String>::new());
}

/// **VALUE**: Verifies a real status failure does reach the error log.
///
/// **BUG THIS CATCHES**: Would catch the capture missing records, which would make the
/// two checks above pass vacuously.
#[tokio::test]
async fn given_failing_status_when_fetched_then_error_is_logged() {
    capture_logs();
    let (proxy, feed, _probe) = FakeProvider::new()
        .with_status(Err(ProviderError::backend("permission denied")))
        .into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");

    feed.send(Ok(Notification::state(BackendState::NeedsLogin))).unwrap();
    assert!(eventually(|| !proxy.is_watching()).await);

    let errors = logged_errors();
    assert_eq!(errors.len(), 1, "Expected one error line, got {errors:?}");
    assert!(errors[0].contains("permission denied"));
    assert_eq!(
        proxy.shutdown().await.expect("shutdown"),
        Some(WatchExit::StatusFetchFailed)
    );
}
