//! The watch loop.
//!
//! A single task per proxy consumes the provider's notification bus and turns
//! it into lifecycle transitions. It is the only writer of [`SharedState`]
//! while the proxy is running.
//!
//! Per notification, in order:
//!
//! 1. a backend error message ends the loop
//! 2. a browse-to URL moves to `Authenticating` and is published
//! 3. otherwise a finished login moves to `Starting` and is published
//! 4. independently, a backend state triggers a fresh status fetch
//!
//! Every failure inside the loop is terminal. The loop never retries; the
//! proxy keeps serving the last values it recorded.

use crate::provider::{ControlClient, Notification, NotificationStream};
use crate::proxy::state::{ProxyEvent, SharedState};

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why a watch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The proxy's cancellation token fired. The expected shutdown path.
    Cancelled,
    /// The notification subscription could not be opened.
    SubscriptionFailed,
    /// Receiving the next notification failed.
    StreamFailed,
    /// The provider reported a fatal backend error message.
    BackendError,
    /// Fetching a status snapshot failed with something other than a closed listener.
    StatusFetchFailed,
}

impl WatchExit {
    pub fn is_graceful(self) -> bool {
        self == WatchExit::Cancelled
    }
}

/// Releases the subscription however the loop exits.
struct StreamGuard<S: NotificationStream> {
    stream: S,
}

impl<S: NotificationStream> Drop for StreamGuard<S> {
    fn drop(&mut self) {
        self.stream.close();
    }
}

pub(crate) struct Watcher<C: ControlClient> {
    client: Arc<C>,
    shared: Arc<SharedState>,
    events: mpsc::UnboundedSender<ProxyEvent>,
    cancel: CancellationToken,
}

impl<C: ControlClient> Watcher<C> {
    pub(crate) fn new(
        client: Arc<C>,
        shared: Arc<SharedState>,
        events: mpsc::UnboundedSender<ProxyEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            shared,
            events,
            cancel,
        }
    }

    /// Runs until cancelled or until the first unrecoverable error.
    pub(crate) async fn run(self) -> WatchExit {
        let stream = match self
            .client
            .watch_notifications(self.cancel.clone(), true)
            .await
        {
            Ok(stream) => stream,
            Err(e) if e.is_cancelled() => {
                debug!("Notification watch cancelled before subscribing");
                return WatchExit::Cancelled;
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {e}");
                return WatchExit::SubscriptionFailed;
            }
        };
        let mut guard = StreamGuard { stream };

        info!("Watching identity provider notifications");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Notification watch cancelled");
                    return WatchExit::Cancelled;
                }
                next = guard.stream.next() => next,
            };

            let notification = match next {
                Ok(notification) => notification,
                Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => {
                    debug!("Notification stream ended by cancellation");
                    return WatchExit::Cancelled;
                }
                Err(e) => {
                    error!("Notification stream failed: {e}");
                    return WatchExit::StreamFailed;
                }
            };

            if let Some(exit) = self.apply(notification).await {
                return exit;
            }
        }
    }

    /// Applies one notification. `Some` ends the loop.
    async fn apply(&self, notification: Notification) -> Option<WatchExit> {
        if let Some(message) = notification.err_message {
            error!("Identity provider backend error: {message}");
            return Some(WatchExit::BackendError);
        }

        if let Some(url) = notification.browse_to_url {
            self.shared.begin_authentication(&url);
            info!("Authentication required, browse to {url}");
            self.publish(ProxyEvent::authenticating(url));
        } else if notification.login_finished {
            self.shared.finish_login();
            info!("Login finished, proxy starting");
            self.publish(ProxyEvent::starting());
        }

        if let Some(backend_state) = notification.state {
            debug!("Backend state is now {backend_state}, refreshing status");
            return self.refresh_status().await;
        }

        None
    }

    async fn refresh_status(&self) -> Option<WatchExit> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Status fetch cancelled");
                return Some(WatchExit::Cancelled);
            }
            fetched = self.client.status() => fetched,
        };

        match fetched {
            Ok(status) => {
                self.shared.store_status(status);
                None
            }
            Err(e) if e.is_listener_closed() => {
                debug!("Status fetch hit a closed listener, keeping last snapshot: {e}");
                None
            }
            Err(e) if e.is_cancelled() => {
                debug!("Status fetch cancelled: {e}");
                Some(WatchExit::Cancelled)
            }
            Err(e) => {
                error!("Failed to fetch status: {e}");
                Some(WatchExit::StatusFetchFailed)
            }
        }
    }

    // Sending only fails once the proxy itself is gone.
    fn publish(&self, event: ProxyEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}
