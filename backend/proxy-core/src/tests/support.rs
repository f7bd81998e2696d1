// Scripted control client for driving the watcher from unit tests.

use crate::error::provider::ProviderError;
use crate::provider::{CertPair, ControlClient, Notification, NotificationStream, StatusSnapshot};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) type Feed = mpsc::UnboundedSender<Result<Notification, ProviderError>>;

pub(crate) struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<Result<Notification, ProviderError>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl NotificationStream for ScriptedStream {
    async fn next(&mut self) -> Result<Notification, ProviderError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(ProviderError::backend("notification feed dropped")),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct ScriptedClient {
    stream: Mutex<Option<ScriptedStream>>,
    subscribe_error: Mutex<Option<ProviderError>>,
    statuses: Mutex<VecDeque<Result<StatusSnapshot, ProviderError>>>,
    hang_status: AtomicBool,
    pub(crate) status_calls: AtomicUsize,
    pub(crate) stream_closed: Arc<AtomicBool>,
}

impl ScriptedClient {
    /// Client with a live notification feed.
    pub(crate) fn with_feed() -> (Arc<Self>, Feed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self::default();
        *client.stream.lock().unwrap() = Some(ScriptedStream {
            rx,
            closed: Arc::clone(&client.stream_closed),
        });
        (Arc::new(client), tx)
    }

    pub(crate) fn failing_subscription(error: ProviderError) -> Arc<Self> {
        let client = Self::default();
        *client.subscribe_error.lock().unwrap() = Some(error);
        Arc::new(client)
    }

    /// Make every status call wait forever.
    pub(crate) fn hang_on_status(&self) {
        self.hang_status.store(true, Ordering::SeqCst);
    }

    pub(crate) fn push_status(&self, status: Result<StatusSnapshot, ProviderError>) {
        self.statuses.lock().unwrap().push_back(status);
    }
}

#[async_trait]
impl ControlClient for ScriptedClient {
    type Stream = ScriptedStream;

    async fn watch_notifications(
        &self,
        _cancel: CancellationToken,
        initial_state: bool,
    ) -> Result<Self::Stream, ProviderError> {
        assert!(initial_state, "watcher must ask for the initial state");

        if let Some(error) = self.subscribe_error.lock().unwrap().take() {
            return Err(error);
        }

        self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProviderError::backend("stream already taken"))
    }

    async fn status(&self) -> Result<StatusSnapshot, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_status.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::backend("no status scripted")))
    }

    async fn cert_pair(&self, _domain: &str) -> Result<CertPair, ProviderError> {
        Err(ProviderError::backend("certificates are not scripted"))
    }
}

/// Poll `condition` until it holds or a second passes.
pub(crate) async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
