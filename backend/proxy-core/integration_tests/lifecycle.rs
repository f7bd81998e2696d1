use crate::helpers::{FakeProvider, eventually, named_status, next_event, test_config};

use proxy_core::error::{ProviderError, ProxyError};
use proxy_core::provider::{BackendState, Notification};
use proxy_core::{ProxyEvent, ProxyState, WatchExit};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// **VALUE**: Runs the documented example end to end through the public API.
///
/// **WHY THIS MATTERS**: This is what a supervisor sees while a user signs a node in:
/// an auth URL to show, a "starting" signal, then the public URL.
///
/// **BUG THIS CATCHES**: Would catch any break between `start`, the watcher, the event
/// channel and the getters.
#[tokio::test]
async fn given_auth_flow_when_proxy_started_then_url_and_events_follow() {
    // GIVEN: A started proxy with a subscriber
    let (proxy, feed, _probe) = FakeProvider::new()
        .with_status(Ok(named_status("host.ts.net.")))
        .into_proxy(test_config());
    let events = proxy.watch_events();
    proxy.start(CancellationToken::new()).await.expect("start");
    assert_eq!(proxy.get_url(), "", "No URL before any status");

    // WHEN: The provider asks the user to authenticate
    feed.send(Ok(Notification::browse_to("https://auth.example/x"))).unwrap();

    // THEN: Event and getter agree
    assert_eq!(
        next_event(&events).await,
        ProxyEvent {
            auth_url: "https://auth.example/x".to_string(),
            state: ProxyState::Authenticating,
        }
    );
    assert_eq!(proxy.get_auth_url(), "https://auth.example/x");
    assert_eq!(proxy.state(), ProxyState::Authenticating);

    // WHEN: Login finishes
    feed.send(Ok(Notification::login_finished())).unwrap();

    // THEN: Starting, auth URL still recorded
    assert_eq!(next_event(&events).await, ProxyEvent::starting());
    assert_eq!(proxy.state(), ProxyState::Starting);
    assert_eq!(proxy.get_auth_url(), "https://auth.example/x");

    // WHEN: The backend reports a state
    feed.send(Ok(Notification::state(BackendState::Running))).unwrap();

    // THEN: The public URL appears and Running is inferred
    assert!(eventually(|| proxy.get_url() == "https://host.ts.net").await);
    assert_eq!(proxy.observed_state(), ProxyState::Running);
    assert_eq!(proxy.state(), ProxyState::Starting);

    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies a provider that fails to start leaves the proxy idle.
///
/// **BUG THIS CATCHES**: Would catch a watcher being spawned before startup succeeded.
#[tokio::test]
async fn given_provider_start_failure_when_started_then_returns_startup_error() {
    let (proxy, _feed, probe) = FakeProvider::new()
        .failing_start(ProviderError::backend("state dir not writable"))
        .into_proxy(test_config());

    let result = proxy.start(CancellationToken::new()).await;

    assert!(matches!(result, Err(ProxyError::Startup { .. })));
    assert_eq!(proxy.state(), ProxyState::Idle);
    assert!(!proxy.is_watching());
    assert_eq!(probe.start_calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Verifies a missing control client is also a startup error, and that a
/// later attempt can still succeed.
///
/// **BUG THIS CATCHES**: Would catch the "started" flag sticking after a failed start.
#[tokio::test]
async fn given_client_failure_when_started_then_retry_is_possible() {
    let (proxy, _feed, _probe) = FakeProvider::new()
        .failing_client(ProviderError::backend("local api not ready"))
        .into_proxy(test_config());

    let first = proxy.start(CancellationToken::new()).await;
    assert!(matches!(first, Err(ProxyError::Startup { .. })));
    assert!(!proxy.is_watching());

    proxy.start(CancellationToken::new()).await.expect("second start");
    assert!(proxy.is_watching());

    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies the watch loop is spawned exactly once.
///
/// **BUG THIS CATCHES**: Would catch two watchers racing on the same state.
#[tokio::test]
async fn given_started_proxy_when_started_again_then_returns_already_started() {
    let (proxy, _feed, probe) = FakeProvider::new().into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");

    let second = proxy.start(CancellationToken::new()).await;

    assert!(matches!(second, Err(ProxyError::AlreadyStarted { .. })));
    assert_eq!(probe.start_calls.load(Ordering::SeqCst), 1);

    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies cancelling the caller's token stops the watcher cleanly.
///
/// **WHY THIS MATTERS**: Cancellation is the expected shutdown path. It must not freeze
/// readers, lose the last values, or leak the subscription.
///
/// **BUG THIS CATCHES**: Would catch state being reset on cancellation or the stream
/// not being released.
#[tokio::test]
async fn given_running_watcher_when_token_cancelled_then_last_values_remain() {
    // GIVEN: A proxy that has reached Authenticating
    let (proxy, feed, probe) = FakeProvider::new().into_proxy(test_config());
    let events = proxy.watch_events();
    let cancel = CancellationToken::new();
    proxy.start(cancel.clone()).await.expect("start");
    feed.send(Ok(Notification::browse_to("https://auth.example/x"))).unwrap();
    next_event(&events).await;

    // WHEN: The owner cancels
    cancel.cancel();

    // THEN: The watcher stops, values are unchanged
    assert!(eventually(|| !proxy.is_watching()).await);
    assert!(probe.stream_closed.load(Ordering::SeqCst));
    assert_eq!(proxy.state(), ProxyState::Authenticating);
    assert_eq!(proxy.get_auth_url(), "https://auth.example/x");

    // WHEN: More notifications arrive after cancellation
    let _ = feed.send(Ok(Notification::login_finished()));
    sleep(Duration::from_millis(20)).await;

    // THEN: Nothing changes
    assert_eq!(proxy.state(), ProxyState::Authenticating);
    assert_eq!(proxy.shutdown().await.expect("shutdown"), Some(WatchExit::Cancelled));
}

/// **VALUE**: Verifies a subscription failure keeps the proxy idle and silent.
///
/// **BUG THIS CATCHES**: Would catch an event or transition on that path, or `start`
/// reporting it as an error.
#[tokio::test]
async fn given_subscription_failure_when_started_then_state_stays_idle() {
    let (proxy, _feed, _probe) = FakeProvider::new()
        .failing_subscription(ProviderError::backend("bus unavailable"))
        .into_proxy(test_config());
    let events = proxy.watch_events();

    proxy.start(CancellationToken::new()).await.expect("start succeeds");

    assert!(eventually(|| !proxy.is_watching()).await);
    assert_eq!(proxy.state(), ProxyState::Idle);
    assert!(events.try_recv().is_err(), "No events expected");
    assert_eq!(
        proxy.shutdown().await.expect("shutdown"),
        Some(WatchExit::SubscriptionFailed)
    );
}

/// **VALUE**: Verifies getters keep serving stale values after the watcher dies.
///
/// **BUG THIS CATCHES**: Would catch the URL being cleared when the loop exits.
#[tokio::test]
async fn given_backend_error_when_watcher_exits_then_values_are_stale_but_readable() {
    let (proxy, feed, _probe) = FakeProvider::new()
        .with_status(Ok(named_status("host.ts.net.")))
        .into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");

    feed.send(Ok(Notification::state(BackendState::Running))).unwrap();
    assert!(eventually(|| !proxy.get_url().is_empty()).await);
    feed.send(Ok(Notification::error("node key expired"))).unwrap();

    assert!(eventually(|| !proxy.is_watching()).await);
    assert_eq!(proxy.get_url(), "https://host.ts.net");
    assert_eq!(
        proxy.shutdown().await.expect("shutdown"),
        Some(WatchExit::BackendError)
    );
}

/// **VALUE**: Verifies the consolidated shutdown order.
///
/// **WHY THIS MATTERS**: Closing the event channel while the watcher can still send, or
/// closing the provider under a live watcher, are the two teardown races.
///
/// **BUG THIS CATCHES**: Would catch subscribers not seeing the channel close, the
/// provider being closed twice, or the state not ending at Stopped.
#[tokio::test]
async fn given_running_proxy_when_shutdown_then_everything_is_released_in_order() {
    // GIVEN: A running proxy with a subscriber
    let (proxy, _feed, probe) = FakeProvider::new().into_proxy(test_config());
    let events = proxy.watch_events();
    proxy.start(CancellationToken::new()).await.expect("start");

    // WHEN: Shutting down
    let exit = proxy.shutdown().await.expect("shutdown");

    // THEN: Watcher exited gracefully and everything is released
    assert_eq!(exit, Some(WatchExit::Cancelled));
    assert!(probe.stream_closed.load(Ordering::SeqCst));
    assert_eq!(probe.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.state(), ProxyState::Stopped);
    assert_eq!(events.recv().await, None);
    assert_eq!(proxy.watch_events().recv().await, None);

    // WHEN: Closing again or restarting
    proxy.close().await.expect("close is idempotent");
    let restart = proxy.start(CancellationToken::new()).await;

    // THEN: Provider still closed once, restart refused
    assert_eq!(probe.close_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(restart, Err(ProxyError::Closed { .. })));
}

/// **VALUE**: Verifies close on a never-started proxy is safe and idempotent.
///
/// **BUG THIS CATCHES**: Would catch close assuming a running watcher or client.
#[tokio::test]
async fn given_unstarted_proxy_when_closed_twice_then_provider_closed_once() {
    let (proxy, _feed, probe) = FakeProvider::new().into_proxy(test_config());

    proxy.close().await.expect("first close");
    proxy.close().await.expect("second close");

    assert_eq!(probe.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.state(), ProxyState::Idle);
    assert_eq!(proxy.shutdown().await.expect("shutdown"), None);
    assert_eq!(proxy.state(), ProxyState::Stopped);
}

/// **VALUE**: Verifies the watcher does not block when nobody reads events, and that
/// nothing is lost meanwhile.
///
/// **WHY THIS MATTERS**: A stalled UI must never stall the state machine, and must still
/// see every auth URL once it catches up.
///
/// **BUG THIS CATCHES**: Would catch a bounded blocking send in the watcher, or a
/// channel that drops the oldest events under load.
#[tokio::test]
async fn given_slow_subscriber_when_many_events_then_watcher_keeps_up() {
    // GIVEN: A subscriber that reads nothing for a while
    let (proxy, feed, _probe) = FakeProvider::new().into_proxy(test_config());
    let events = proxy.watch_events();
    proxy.start(CancellationToken::new()).await.expect("start");

    // WHEN: Fifty transitions happen
    for i in 0..50 {
        feed.send(Ok(Notification::browse_to(format!("https://auth.example/{i}"))))
            .unwrap();
    }

    // THEN: State keeps up, and every event is delivered in order afterwards
    assert!(eventually(|| proxy.get_auth_url() == "https://auth.example/49").await);
    for i in 0..50 {
        assert_eq!(
            next_event(&events).await.auth_url,
            format!("https://auth.example/{i}")
        );
    }
    assert!(events.try_recv().is_err(), "No extra events expected");

    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies a consumer that subscribes after the first transition still
/// receives it.
///
/// **WHY THIS MATTERS**: A supervisor typically asks for events after `start` returns.
/// The first `Authenticating` event carries the only copy of the login URL it pushes
/// to the user.
///
/// **BUG THIS CATCHES**: Would catch events emitted with no subscriber being discarded.
#[tokio::test]
async fn given_late_subscriber_when_transition_already_happened_then_event_is_delivered() {
    // GIVEN: A proxy that reached Authenticating with nobody listening
    let (proxy, feed, _probe) = FakeProvider::new().into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");
    feed.send(Ok(Notification::browse_to("https://auth.example/first"))).unwrap();
    assert!(eventually(|| proxy.state() == ProxyState::Authenticating).await);

    // WHEN: Subscribing only now
    let events = proxy.watch_events();

    // THEN: The event is waiting
    assert_eq!(
        events.try_recv().expect("buffered event"),
        ProxyEvent::authenticating("https://auth.example/first")
    );

    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies shutdown during a slow provider start leaves nothing running.
///
/// **WHY THIS MATTERS**: A supervisor may give up on a node while it is still starting.
/// A watcher spawned after teardown would run against a closed provider and move a
/// stopped proxy back to `Authenticating`.
///
/// **BUG THIS CATCHES**: Would catch `start` and `shutdown` interleaving so the watcher
/// is spawned after shutdown looked for it.
#[tokio::test]
async fn given_slow_start_when_shutdown_mid_start_then_watcher_is_torn_down() {
    // GIVEN: A provider whose start takes 100ms
    let (proxy, feed, probe) = FakeProvider::new()
        .slow_start(Duration::from_millis(100))
        .into_proxy(test_config());
    let proxy = Arc::new(proxy);
    let starting = {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move { proxy.start(CancellationToken::new()).await })
    };

    // WHEN: Shutdown is requested 20ms into start
    sleep(Duration::from_millis(20)).await;
    let exit = proxy.shutdown().await.expect("shutdown");
    let started = starting.await.expect("start task panicked");

    // THEN: Start finished first, and shutdown tore its watcher down
    assert!(started.is_ok());
    assert_eq!(exit, Some(WatchExit::Cancelled));
    assert!(!proxy.is_watching());
    assert!(probe.stream_closed.load(Ordering::SeqCst));
    assert_eq!(probe.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.state(), ProxyState::Stopped);

    // WHEN: The provider still pushes a notification
    let _ = feed.send(Ok(Notification::browse_to("https://auth.example/late")));
    sleep(Duration::from_millis(20)).await;

    // THEN: Stopped is terminal
    assert_eq!(proxy.state(), ProxyState::Stopped);
    assert_eq!(proxy.get_auth_url(), "");
}

/// **VALUE**: Stress test: many readers while the watcher writes.
///
/// **BUG THIS CATCHES**: Would catch reads that bypass the lock and observe a URL that
/// was never published.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_readers_when_watcher_writes_then_reads_are_consistent() {
    let (proxy, feed, _probe) = FakeProvider::new().into_proxy(test_config());
    let proxy = Arc::new(proxy);
    proxy.start(CancellationToken::new()).await.expect("start");

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                for _ in 0..500 {
                    let url = proxy.get_auth_url();
                    assert!(url.is_empty() || url.starts_with("https://auth.example/"));
                    let _ = proxy.get_url();
                    let _ = proxy.state();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for i in 0..500 {
        feed.send(Ok(Notification::browse_to(format!("https://auth.example/{i}"))))
            .unwrap();
    }

    for reader in readers {
        reader.await.expect("reader panicked");
    }
    assert!(eventually(|| proxy.get_auth_url() == "https://auth.example/499").await);

    proxy.shutdown().await.expect("shutdown");
}
