//! Proxy lifecycle on top of an overlay identity provider.
//!
//! A [`Proxy`] owns one [`IdentityServer`] and turns its notification bus
//! into a small lifecycle: `Idle` → `Authenticating` → `Starting` →
//! (inferred `Running`) → `Stopped`.
//!
//! # Architecture
//!
//! - One watcher task per proxy is the only writer of lifecycle state
//! - Readers (`get_url`, `get_auth_url`, `state`, ...) take a short lock, never across `.await`
//! - Transitions are also queued on an unbounded channel ([`Proxy::watch_events`])
//!
//! # Shutdown
//!
//! [`Proxy::shutdown`] is the single teardown path: it cancels the watcher,
//! waits for it to exit, closes the provider and then closes the event
//! channel. It is serialized with [`Proxy::start`], so a start still in
//! flight finishes first and its watcher is torn down with the rest.
//! [`Proxy::close`] only closes the provider and leaves the watcher to the
//! caller's cancellation token.

mod events;
mod handle;
mod listener;
pub(crate) mod state;
pub(crate) mod watcher;

pub use events::{EventReceiver, TryRecvError};
pub use state::{ProxyEvent, ProxyState};
pub use watcher::WatchExit;

use crate::config::ProxyConfig;
use crate::error::proxy::ProxyError;
use crate::provider::{IdentityServer, StatusSnapshot};

use handle::WatcherHandle;
use state::SharedState;
use watcher::Watcher;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where the proxy is in its start/shutdown sequence.
#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    started: bool,
    shut_down: bool,
}

/// A proxied service published through an overlay network identity.
///
/// # Thread Safety
///
/// All methods take `&self`; share a proxy between tasks with `Arc<Proxy<S>>`.
pub struct Proxy<S: IdentityServer> {
    config: ProxyConfig,
    server: Arc<S>,
    client: OnceLock<Arc<S::Client>>,
    shared: Arc<SharedState>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    events: Mutex<Option<mpsc::UnboundedSender<ProxyEvent>>>,
    receiver: EventReceiver,
    watcher: Mutex<Option<WatcherHandle>>,
    server_closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: IdentityServer> Proxy<S> {
    /// Wrap an already configured identity provider.
    ///
    /// Nothing runs until [`Proxy::start`].
    pub fn new(server: S, config: ProxyConfig) -> Self {
        let (events, receiver) = events::channel();

        debug!(
            "Created proxy {} (funnel={})",
            config.hostname, config.tailscale.funnel
        );

        Self {
            config,
            server: Arc::new(server),
            client: OnceLock::new(),
            shared: Arc::new(SharedState::new()),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            events: Mutex::new(Some(events)),
            receiver,
            watcher: Mutex::new(None),
            server_closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bring the provider up and start watching its notifications.
    ///
    /// The watcher runs on a child of `cancel`: cancelling the caller's token
    /// stops it, and [`Proxy::shutdown`] can stop it without touching the
    /// caller's token.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::AlreadyStarted`] - a previous `start` succeeded
    /// - [`ProxyError::Startup`] - the provider failed to start or to hand out a client;
    ///   no watcher is running and the state is still `Idle`
    /// - [`ProxyError::Closed`] - the proxy was already shut down
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ProxyError> {
        let mut lifecycle = self.lifecycle.lock().await;

        if lifecycle.shut_down {
            return Err(ProxyError::Closed {
                message: format!("Proxy {} has been shut down", self.config.hostname),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if lifecycle.started {
            return Err(ProxyError::AlreadyStarted {
                message: format!("Proxy {} is already running", self.config.hostname),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let events = lock(&self.events)
            .clone()
            .ok_or_else(|| ProxyError::Closed {
                message: format!("Event channel for {} is closed", self.config.hostname),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("Starting identity provider for {}", self.config.hostname);

        self.server.start().await.map_err(|e| ProxyError::Startup {
            message: "Identity provider failed to start".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })?;

        let client = self
            .server
            .local_client()
            .await
            .map_err(|e| ProxyError::Startup {
                message: "Failed to obtain local control client".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        let client = Arc::clone(self.client.get_or_init(|| client));
        let cancel = cancel.child_token();

        let watcher = Watcher::new(client, Arc::clone(&self.shared), events, cancel.clone());
        let join = tokio::spawn(watcher.run());
        *lock(&self.watcher) = Some(WatcherHandle::new(join));

        lifecycle.cancel = Some(cancel);
        lifecycle.started = true;

        info!("Proxy {} started", self.config.hostname);
        Ok(())
    }

    /// Public URL of the proxied service.
    ///
    /// Empty until the watcher has stored a status snapshot with a self node.
    pub fn get_url(&self) -> String {
        self.shared.url()
    }

    /// Last authentication URL published by the provider.
    ///
    /// Not cleared once login finishes; check [`Proxy::state`] to know
    /// whether it is still relevant.
    pub fn get_auth_url(&self) -> String {
        self.shared.auth_url()
    }

    /// Recorded lifecycle state.
    pub fn state(&self) -> ProxyState {
        self.shared.state()
    }

    /// Recorded state, reported as `Running` once the snapshot has a usable name.
    pub fn observed_state(&self) -> ProxyState {
        self.shared.observed_state()
    }

    pub fn status(&self) -> Option<StatusSnapshot> {
        self.shared.status()
    }

    /// Whether the watch loop is still consuming notifications.
    ///
    /// Once this turns false the getters keep returning the last recorded
    /// values.
    pub fn is_watching(&self) -> bool {
        lock(&self.watcher)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Receive end of the proxy's event channel.
    ///
    /// Every call hands out the same channel. Only `Authenticating` and
    /// `Starting` transitions are published; they are buffered until read, so
    /// subscribing after [`Proxy::start`] still sees the first auth URL.
    /// After [`Proxy::shutdown`] the receiver drains what is left and then
    /// yields `None`.
    pub fn watch_events(&self) -> EventReceiver {
        self.receiver.clone()
    }

    /// Close the identity provider.
    ///
    /// Idempotent: the provider is closed at most once. Does not stop the
    /// watcher; cancel the token handed to [`Proxy::start`] or use
    /// [`Proxy::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Shutdown`] if the provider fails to close.
    pub async fn close(&self) -> Result<(), ProxyError> {
        if self.server_closed.swap(true, Ordering::SeqCst) {
            debug!("Identity provider for {} already closed", self.config.hostname);
            return Ok(());
        }

        self.server.close().await.map_err(|e| ProxyError::Shutdown {
            message: format!("Failed to close identity provider for {}", self.config.hostname),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })?;

        info!("Identity provider for {} closed", self.config.hostname);
        Ok(())
    }

    /// Tear the proxy down in order.
    ///
    /// 1. cancel the watcher
    /// 2. wait until it has exited
    /// 3. close the provider
    /// 4. close the event channel
    /// 5. record `Stopped`
    ///
    /// Waits for a `start` already in flight before tearing down.
    ///
    /// Returns why the watcher stopped, or `None` if it never ran. Every step
    /// runs even if an earlier one failed; the first failure is returned.
    pub async fn shutdown(&self) -> Result<Option<WatchExit>, ProxyError> {
        info!("Shutting down proxy {}", self.config.hostname);

        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.shut_down = true;

        if let Some(cancel) = lifecycle.cancel.take() {
            cancel.cancel();
        }

        let handle = lock(&self.watcher).take();
        let exit = match handle {
            Some(handle) => handle.wait().await.map(Some),
            None => Ok(None),
        };

        let closed = self.close().await;

        if lock(&self.events).take().is_none() {
            debug!("Event channel for {} already closed", self.config.hostname);
        }
        self.shared.mark_stopped();

        if let Ok(Some(reason)) = exit
            && !reason.is_graceful()
        {
            warn!("Watcher for {} had already stopped: {reason:?}", self.config.hostname);
        }

        let exit = exit?;
        closed?;
        Ok(exit)
    }
}
