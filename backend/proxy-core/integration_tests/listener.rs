use crate::helpers::{FakeListener, FakeProvider, test_config};

use proxy_core::error::{ProviderError, ProxyError};

use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

/// **VALUE**: Verifies plain listeners are passed straight through.
///
/// **BUG THIS CATCHES**: Would catch network/address arguments being swapped.
#[tokio::test]
async fn given_proxy_when_plain_listener_requested_then_provider_listen_is_used() {
    let (proxy, _feed, _probe) = FakeProvider::new().into_proxy(test_config());

    let listener = proxy.new_listener("tcp", ":80").await.expect("listener");

    assert_eq!(
        listener,
        FakeListener::Plain {
            network: "tcp".to_string(),
            address: ":80".to_string(),
        }
    );
}

/// **VALUE**: Verifies provider listener failures surface as `ProxyError::Listener`.
#[tokio::test]
async fn given_provider_refuses_when_plain_listener_requested_then_returns_listener_error() {
    let (proxy, _feed, _probe) = FakeProvider::new().into_proxy(test_config());

    let result = proxy.new_listener("tcp", "").await;

    assert!(matches!(result, Err(ProxyError::Listener { .. })));
}

/// **VALUE**: Verifies the funnel flag picks the exposed listener.
///
/// **WHY THIS MATTERS**: Funnel publishes a service to the public internet. Picking the
/// wrong listener either hides a public service or exposes a private one.
///
/// **BUG THIS CATCHES**: Would catch an inverted branch on `tailscale.funnel`.
#[tokio::test]
async fn given_funnel_setting_when_tls_listener_requested_then_kind_follows_config() {
    // GIVEN: One private and one funnel proxy
    let (private, _f1, _p1) = FakeProvider::new().into_proxy(test_config());
    let mut funnel_config = test_config();
    funnel_config.tailscale.funnel = true;
    let (public, _f2, _p2) = FakeProvider::new().into_proxy(funnel_config);

    // WHEN: Both ask for a TLS listener
    let private_listener = private.new_tls_listener("tcp", ":443").await.expect("tls");
    let public_listener = public.new_tls_listener("tcp", ":443").await.expect("funnel");

    // THEN: Each gets the matching kind
    assert!(matches!(private_listener, FakeListener::Tls { .. }));
    assert!(matches!(public_listener, FakeListener::Funnel { .. }));
}

/// **VALUE**: Verifies the certificate pre-warm asks for the first domain.
#[tokio::test]
async fn given_started_proxy_when_prewarming_then_first_domain_is_requested() {
    let (proxy, _feed, probe) = FakeProvider::new().into_proxy(test_config());
    proxy.start(CancellationToken::new()).await.expect("start");

    proxy.prewarm_tls_certificates().await.expect("certificate");

    assert_eq!(*probe.cert_requests.lock().unwrap(), vec!["host.ts.net".to_string()]);
    proxy.shutdown().await.expect("shutdown");
}

/// **VALUE**: Verifies pre-warm before start is refused instead of panicking.
#[tokio::test]
async fn given_unstarted_proxy_when_prewarming_then_returns_not_started() {
    let (proxy, _feed, probe) = FakeProvider::new().into_proxy(test_config());

    let result = proxy.prewarm_tls_certificates().await;

    assert!(matches!(result, Err(ProxyError::NotStarted { .. })));
    assert!(probe.cert_requests.lock().unwrap().is_empty());
}

/// **VALUE**: Verifies pre-warm failures are surfaced, not swallowed.
///
/// **BUG THIS CATCHES**: Would catch an empty domain list indexing out of bounds, or an
/// issuance failure being reported as success.
#[tokio::test]
async fn given_certificate_failures_when_prewarming_then_returns_certificate_error() {
    let (no_domains, _f1, _p1) = FakeProvider::new()
        .without_cert_domains()
        .into_proxy(test_config());
    no_domains.start(CancellationToken::new()).await.expect("start");

    let (failing, _f2, probe) = FakeProvider::new()
        .failing_certificate(ProviderError::backend("rate limited"))
        .into_proxy(test_config());
    failing.start(CancellationToken::new()).await.expect("start");

    assert!(matches!(
        no_domains.prewarm_tls_certificates().await,
        Err(ProxyError::NoCertificateDomains { .. })
    ));
    match failing.prewarm_tls_certificates().await {
        Err(ProxyError::Certificate { source, .. }) => {
            assert!(source.to_string().contains("rate limited"));
        }
        other => panic!("Expected certificate error, got {other:?}"),
    }
    assert_eq!(probe.start_calls.load(Ordering::SeqCst), 1);

    no_domains.shutdown().await.expect("shutdown");
    failing.shutdown().await.expect("shutdown");
}
