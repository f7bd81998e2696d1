use crate::provider::{BackendState, SelfStatus, StatusSnapshot};
use crate::proxy::state::{ProxyEvent, ProxyState, SharedState};

use std::sync::Arc;
use std::thread;

fn snapshot(dns_name: &str) -> StatusSnapshot {
    StatusSnapshot {
        backend_state: BackendState::Running,
        self_node: Some(SelfStatus {
            dns_name: dns_name.to_string(),
            host_name: "host".to_string(),
            tailscale_ips: Vec::new(),
            online: true,
        }),
        cert_domains: Vec::new(),
    }
}

/// **VALUE**: Verifies the empty URL contract before any status has been seen.
///
/// **WHY THIS MATTERS**: Dashboards call `get_url` as soon as a proxy exists. It must
/// report "nothing yet" rather than fail or invent an address.
///
/// **BUG THIS CATCHES**: Would catch a URL built from an absent snapshot, e.g. `"https://"`.
#[test]
fn given_no_status_when_url_requested_then_returns_empty_string() {
    // GIVEN: A fresh record
    let shared = SharedState::new();

    // WHEN/THEN: URL is empty and state is Idle
    assert_eq!(shared.url(), "");
    assert_eq!(shared.state(), ProxyState::Idle);
    assert_eq!(shared.auth_url(), "");
}

/// **VALUE**: Verifies the trailing root dot is stripped and the scheme is prefixed.
///
/// **BUG THIS CATCHES**: Would catch URLs like `https://host.ts.net.` that break browsers'
/// certificate matching.
#[test]
fn given_status_with_root_dot_when_url_requested_then_dot_is_stripped() {
    // GIVEN: A stored snapshot with a fully-qualified name
    let shared = SharedState::new();
    shared.store_status(snapshot("host.ts.net."));

    // WHEN/THEN: The URL is normalized
    assert_eq!(shared.url(), "https://host.ts.net");
}

/// **VALUE**: Verifies a snapshot without a self node still yields an empty URL.
///
/// **BUG THIS CATCHES**: Would catch a panic on the missing self node.
#[test]
fn given_status_without_self_node_when_url_requested_then_returns_empty_string() {
    let shared = SharedState::new();
    shared.store_status(StatusSnapshot::default());

    assert_eq!(shared.url(), "");
    assert!(shared.status().is_some());
}

/// **VALUE**: Verifies login completion keeps the previously recorded auth URL.
///
/// **WHY THIS MATTERS**: Callers decide relevance from the state, not from an empty URL.
/// Clearing it would change what existing consumers observe.
///
/// **BUG THIS CATCHES**: Would catch `finish_login` resetting `auth_url`.
#[test]
fn given_authenticating_when_login_finishes_then_auth_url_is_kept() {
    // GIVEN: A pending authentication
    let shared = SharedState::new();
    shared.begin_authentication("https://auth.example/x");

    // WHEN: Login finishes
    shared.finish_login();

    // THEN: Starting, URL unchanged
    assert_eq!(shared.state(), ProxyState::Starting);
    assert_eq!(shared.auth_url(), "https://auth.example/x");
}

/// **VALUE**: Verifies `Running` is inferred, never recorded.
///
/// **BUG THIS CATCHES**: Would catch `observed_state` reporting `Running` for a snapshot
/// whose DNS name is still empty, or overriding `Authenticating`.
#[test]
fn given_snapshot_with_name_when_observed_then_running_is_inferred() {
    let shared = SharedState::new();

    shared.store_status(snapshot("."));
    assert_eq!(shared.observed_state(), ProxyState::Idle);

    shared.store_status(snapshot("host.ts.net."));
    assert_eq!(shared.observed_state(), ProxyState::Running);
    assert_eq!(shared.state(), ProxyState::Idle, "Running is never stored");

    shared.begin_authentication("https://auth.example/y");
    assert_eq!(shared.observed_state(), ProxyState::Authenticating);

    shared.finish_login();
    assert_eq!(shared.observed_state(), ProxyState::Running);

    shared.mark_stopped();
    assert_eq!(shared.observed_state(), ProxyState::Stopped);
}

/// **VALUE**: Verifies readers never see a state/URL pair that was never written together.
///
/// **WHY THIS MATTERS**: One writer and many readers share the record. A torn read would
/// show `Authenticating` with another attempt's URL.
///
/// **BUG THIS CATCHES**: Would catch the auth URL being read outside the lock.
#[test]
fn given_concurrent_readers_when_writer_alternates_then_reads_are_consistent() {
    // GIVEN: A writer that alternates between two auth URLs
    let shared = Arc::new(SharedState::new());
    let writer_state = Arc::clone(&shared);
    let writer = thread::spawn(move || {
        for i in 0..2_000 {
            let url = if i % 2 == 0 { "https://auth.example/a" } else { "https://auth.example/b" };
            writer_state.begin_authentication(url);
            writer_state.store_status(snapshot("host.ts.net."));
        }
    });

    // WHEN: Many readers poll at the same time
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let url = shared.auth_url();
                    assert!(
                        url.is_empty() || url == "https://auth.example/a" || url == "https://auth.example/b",
                        "Unexpected auth URL: {url}"
                    );
                    let public = shared.url();
                    assert!(public.is_empty() || public == "https://host.ts.net");
                }
            })
        })
        .collect();

    // THEN: Nobody panics
    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }
    assert_eq!(shared.state(), ProxyState::Authenticating);
}

/// **VALUE**: Verifies event constructors and their wire form.
///
/// **BUG THIS CATCHES**: Would catch a `Starting` event carrying a stale URL, or the
/// serialized state name changing case.
#[test]
fn given_events_when_serialized_then_state_is_lowercase() {
    let auth = ProxyEvent::authenticating("https://auth.example/x");
    let starting = ProxyEvent::starting();

    assert_eq!(auth.state, ProxyState::Authenticating);
    assert!(starting.auth_url.is_empty());

    let json = serde_json::to_string(&auth).expect("serializable");
    assert_eq!(
        json,
        r#"{"auth_url":"https://auth.example/x","state":"authenticating"}"#
    );
    assert_eq!(ProxyState::Starting.to_string(), "starting");
}
