use crate::error::provider::ProviderError;
use crate::provider::{BackendState, Notification, SelfStatus, StatusSnapshot};
use crate::proxy::state::{ProxyEvent, ProxyState, SharedState};
use crate::proxy::watcher::{WatchExit, Watcher};
use crate::tests::support::{ScriptedClient, eventually};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Harness {
    shared: Arc<SharedState>,
    events: mpsc::UnboundedReceiver<ProxyEvent>,
    cancel: CancellationToken,
    join: JoinHandle<WatchExit>,
}

fn spawn_watcher(client: Arc<ScriptedClient>) -> Harness {
    let shared = Arc::new(SharedState::new());
    let (tx, events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let watcher = Watcher::new(client, Arc::clone(&shared), tx, cancel.clone());
    Harness {
        shared,
        events,
        cancel,
        join: tokio::spawn(watcher.run()),
    }
}

async fn exit_of(join: JoinHandle<WatchExit>) -> WatchExit {
    timeout(Duration::from_secs(1), join)
        .await
        .expect("watcher did not exit in time")
        .expect("watcher panicked")
}

fn named_snapshot(dns_name: &str) -> StatusSnapshot {
    StatusSnapshot {
        backend_state: BackendState::Running,
        self_node: Some(SelfStatus {
            dns_name: dns_name.to_string(),
            ..Default::default()
        }),
        cert_domains: vec!["host.ts.net".to_string()],
    }
}

/// **VALUE**: Walks the full authentication sequence through the watcher.
///
/// **WHY THIS MATTERS**: This is the path every new node takes: browse URL, login,
/// then a status with its assigned name.
///
/// **BUG THIS CATCHES**: Would catch missing events, wrong event order, or the status
/// not being stored after a backend state change.
#[tokio::test]
async fn given_auth_sequence_when_watched_then_transitions_and_events_follow() {
    // GIVEN: A watcher fed by a scripted client
    let (client, feed) = ScriptedClient::with_feed();
    client.push_status(Ok(named_snapshot("host.ts.net.")));
    let mut h = spawn_watcher(Arc::clone(&client));

    // WHEN: The provider asks for authentication
    feed.send(Ok(Notification::browse_to("https://auth.example/x"))).unwrap();

    // THEN: Authenticating is recorded and published
    let event = h.events.recv().await.expect("event");
    assert_eq!(event, ProxyEvent::authenticating("https://auth.example/x"));
    assert_eq!(h.shared.state(), ProxyState::Authenticating);
    assert_eq!(h.shared.auth_url(), "https://auth.example/x");

    // WHEN: Login finishes
    feed.send(Ok(Notification::login_finished())).unwrap();

    // THEN: Starting is published with no URL, recorded URL is untouched
    let event = h.events.recv().await.expect("event");
    assert_eq!(event, ProxyEvent::starting());
    assert_eq!(h.shared.state(), ProxyState::Starting);
    assert_eq!(h.shared.auth_url(), "https://auth.example/x");

    // WHEN: The backend reports a state
    feed.send(Ok(Notification::state(BackendState::Running))).unwrap();

    // THEN: The fresh snapshot drives the URL
    let shared = Arc::clone(&h.shared);
    assert!(eventually(|| shared.url() == "https://host.ts.net").await);

    h.cancel.cancel();
    assert_eq!(exit_of(h.join).await, WatchExit::Cancelled);
    assert!(client.stream_closed.load(Ordering::SeqCst));
}

/// **VALUE**: Verifies a browse URL wins over a login flag in the same notification.
///
/// **BUG THIS CATCHES**: Would catch both branches firing and publishing two events.
#[tokio::test]
async fn given_browse_and_login_in_one_notification_when_applied_then_only_authenticating() {
    let (client, feed) = ScriptedClient::with_feed();
    let mut h = spawn_watcher(client);

    let mut notification = Notification::browse_to("https://auth.example/z");
    notification.login_finished = true;
    feed.send(Ok(notification)).unwrap();
    feed.send(Ok(Notification::error("stop"))).unwrap();

    assert_eq!(exit_of(h.join).await, WatchExit::BackendError);
    assert_eq!(h.shared.state(), ProxyState::Authenticating);
    assert_eq!(
        h.events.recv().await.expect("event").state,
        ProxyState::Authenticating
    );
    assert!(h.events.try_recv().is_err(), "Only one event expected");
}

/// **VALUE**: Verifies a backend error message stops the loop before anything else in it.
///
/// **BUG THIS CATCHES**: Would catch the URL in the same notification still being applied.
#[tokio::test]
async fn given_backend_error_when_received_then_loop_ends_without_transition() {
    let (client, feed) = ScriptedClient::with_feed();
    let h = spawn_watcher(Arc::clone(&client));

    let mut notification = Notification::error("node key expired");
    notification.browse_to_url = Some("https://auth.example/ignored".to_string());
    feed.send(Ok(notification)).unwrap();

    assert_eq!(exit_of(h.join).await, WatchExit::BackendError);
    assert_eq!(h.shared.state(), ProxyState::Idle);
    assert_eq!(h.shared.auth_url(), "");
    assert!(client.stream_closed.load(Ordering::SeqCst), "Stream must be released");
}

/// **VALUE**: Verifies a subscription failure leaves everything untouched.
///
/// **BUG THIS CATCHES**: Would catch a transition or event on the failure path.
#[tokio::test]
async fn given_subscription_failure_when_run_then_exits_without_events() {
    let client = ScriptedClient::failing_subscription(ProviderError::backend("bus unavailable"));
    let mut h = spawn_watcher(client);

    assert_eq!(exit_of(h.join).await, WatchExit::SubscriptionFailed);
    assert_eq!(h.shared.state(), ProxyState::Idle);
    assert!(matches!(
        h.events.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

/// **VALUE**: Verifies a mid-stream failure freezes the last recorded values.
///
/// **BUG THIS CATCHES**: Would catch the loop resetting state on its way out.
#[tokio::test]
async fn given_stream_failure_when_received_then_state_is_frozen() {
    let (client, feed) = ScriptedClient::with_feed();
    let h = spawn_watcher(client);

    feed.send(Ok(Notification::browse_to("https://auth.example/x"))).unwrap();
    feed.send(Err(ProviderError::backend("connection reset"))).unwrap();

    assert_eq!(exit_of(h.join).await, WatchExit::StreamFailed);
    assert_eq!(h.shared.state(), ProxyState::Authenticating);
    assert_eq!(h.shared.auth_url(), "https://auth.example/x");
}

/// **VALUE**: Verifies a provider-side cancellation error is treated as a clean exit.
///
/// **BUG THIS CATCHES**: Would catch cancellation being reported as a stream failure.
#[tokio::test]
async fn given_cancelled_error_from_stream_when_received_then_exit_is_graceful() {
    let (client, feed) = ScriptedClient::with_feed();
    let h = spawn_watcher(client);

    feed.send(Err(ProviderError::cancelled("context canceled"))).unwrap();

    let exit = exit_of(h.join).await;
    assert_eq!(exit, WatchExit::Cancelled);
    assert!(exit.is_graceful());
}

/// **VALUE**: Verifies cancelling while a status fetch is in flight ends the loop cleanly.
///
/// **WHY THIS MATTERS**: A provider that stops answering must not keep shutdown waiting
/// on a status call.
///
/// **BUG THIS CATCHES**: Would catch the fetch not being raced against the token, or
/// cancellation being reported as a status failure.
#[tokio::test]
async fn given_status_fetch_in_flight_when_cancelled_then_exit_is_cancelled() {
    // GIVEN: A status call that never returns
    let (client, feed) = ScriptedClient::with_feed();
    client.hang_on_status();
    let h = spawn_watcher(Arc::clone(&client));
    feed.send(Ok(Notification::state(BackendState::Starting))).unwrap();
    let calls = Arc::clone(&client);
    assert!(eventually(|| calls.status_calls.load(Ordering::SeqCst) == 1).await);

    // WHEN: The token fires mid-fetch
    h.cancel.cancel();

    // THEN: Graceful exit, stream released, nothing stored
    let exit = exit_of(h.join).await;
    assert_eq!(exit, WatchExit::Cancelled);
    assert!(exit.is_graceful());
    assert!(client.stream_closed.load(Ordering::SeqCst));
    assert!(h.shared.status().is_none());
}

/// **VALUE**: Verifies a provider-side cancellation error from a status fetch is a
/// clean exit.
///
/// **BUG THIS CATCHES**: Would catch `Cancelled` falling through to `StatusFetchFailed`.
#[tokio::test]
async fn given_cancelled_error_from_status_when_fetched_then_exit_is_cancelled() {
    let (client, feed) = ScriptedClient::with_feed();
    client.push_status(Err(ProviderError::cancelled("context canceled")));
    let h = spawn_watcher(Arc::clone(&client));

    feed.send(Ok(Notification::state(BackendState::Stopped))).unwrap();

    assert_eq!(exit_of(h.join).await, WatchExit::Cancelled);
    assert!(!h.cancel.is_cancelled(), "Exit came from the provider, not the token");
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Verifies a closed listener during a status fetch is tolerated.
///
/// **WHY THIS MATTERS**: Closing the provider races with an in-flight status call.
/// That race must not end the watcher or wipe the last snapshot.
///
/// **BUG THIS CATCHES**: Would catch the loop exiting on `ListenerClosed`.
#[tokio::test]
async fn given_listener_closed_on_status_when_fetched_then_loop_continues() {
    // GIVEN: One good snapshot followed by a closed listener
    let (client, feed) = ScriptedClient::with_feed();
    client.push_status(Ok(named_snapshot("host.ts.net.")));
    client.push_status(Err(ProviderError::listener_closed("use of closed network connection")));
    let mut h = spawn_watcher(Arc::clone(&client));

    // WHEN: Two state notifications arrive, then a browse URL
    feed.send(Ok(Notification::state(BackendState::Running))).unwrap();
    feed.send(Ok(Notification::state(BackendState::Running))).unwrap();
    feed.send(Ok(Notification::browse_to("https://auth.example/again"))).unwrap();

    // THEN: The loop is still alive and the first snapshot survives
    let event = h.events.recv().await.expect("event");
    assert_eq!(event.auth_url, "https://auth.example/again");
    assert_eq!(client.status_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.shared.url(), "https://host.ts.net");
    assert!(!h.join.is_finished());

    h.cancel.cancel();
    assert_eq!(exit_of(h.join).await, WatchExit::Cancelled);
}

/// **VALUE**: Verifies any other status failure ends the loop.
///
/// **BUG THIS CATCHES**: Would catch status errors being silently swallowed.
#[tokio::test]
async fn given_status_failure_when_fetched_then_loop_ends() {
    let (client, feed) = ScriptedClient::with_feed();
    client.push_status(Err(ProviderError::backend("permission denied")));
    let h = spawn_watcher(client);

    feed.send(Ok(Notification::state(BackendState::NeedsLogin))).unwrap();

    assert_eq!(exit_of(h.join).await, WatchExit::StatusFetchFailed);
    assert_eq!(h.shared.url(), "");
}

/// **VALUE**: Verifies replaying the same notification prefix yields the same state.
///
/// **BUG THIS CATCHES**: Would catch state depending on anything but the last
/// browse/login notification.
#[tokio::test]
async fn given_same_prefix_twice_when_replayed_then_state_matches() {
    async fn replay() -> (ProxyState, String) {
        let (client, feed) = ScriptedClient::with_feed();
        let h = spawn_watcher(client);
        for notification in [
            Notification::browse_to("https://auth.example/1"),
            Notification::login_finished(),
            Notification::browse_to("https://auth.example/2"),
            Notification::error("done"),
        ] {
            feed.send(Ok(notification)).unwrap();
        }
        assert_eq!(exit_of(h.join).await, WatchExit::BackendError);
        (h.shared.state(), h.shared.auth_url())
    }

    let first = replay().await;
    let second = replay().await;

    assert_eq!(first, second);
    assert_eq!(first, (ProxyState::Authenticating, "https://auth.example/2".to_string()));
}
