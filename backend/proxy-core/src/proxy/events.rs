//! Lifecycle event hand-off.
//!
//! The watcher is the only producer. Sends never block and never drop an
//! event: a consumer that subscribes late or reads slowly still sees every
//! transition, in order.

use crate::proxy::state::ProxyEvent;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

pub use tokio::sync::mpsc::error::TryRecvError;

/// Receive end of a proxy's event channel.
///
/// Cloning shares the same channel: each event is delivered to exactly one
/// `recv` call across all clones.
#[derive(Clone)]
pub struct EventReceiver {
    inner: Arc<Mutex<mpsc::UnboundedReceiver<ProxyEvent>>>,
}

pub(crate) fn channel() -> (mpsc::UnboundedSender<ProxyEvent>, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let receiver = EventReceiver {
        inner: Arc::new(Mutex::new(rx)),
    };
    (tx, receiver)
}

impl EventReceiver {
    /// Next event, waiting if none is buffered.
    ///
    /// Returns `None` once the proxy has shut down and every buffered event
    /// has been read.
    pub async fn recv(&self) -> Option<ProxyEvent> {
        self.inner.lock().await.recv().await
    }

    /// Next buffered event without waiting.
    ///
    /// Reports [`TryRecvError::Empty`] while another clone is parked in
    /// [`EventReceiver::recv`].
    pub fn try_recv(&self) -> Result<ProxyEvent, TryRecvError> {
        match self.inner.try_lock() {
            Ok(mut rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Empty),
        }
    }
}
