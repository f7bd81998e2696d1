//! Watcher completion handle.
//!
//! Returned internally when a proxy spawns its watch loop. Owning the handle
//! is what lets `shutdown` wait until the loop has really exited before the
//! provider is closed and the event channel dropped.

use crate::error::proxy::ProxyError;
use crate::proxy::watcher::WatchExit;

use common::ErrorLocation;

use std::panic::Location;

use tokio::task::JoinHandle;

pub(crate) struct WatcherHandle {
    join: JoinHandle<WatchExit>,
}

impl WatcherHandle {
    pub(crate) fn new(join: JoinHandle<WatchExit>) -> Self {
        Self { join }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit and report why it did.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::WatcherJoin`] if the watcher task panicked or was aborted.
    pub(crate) async fn wait(self) -> Result<WatchExit, ProxyError> {
        self.join.await.map_err(|e| ProxyError::WatcherJoin {
            message: "Watcher task did not exit cleanly".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })
    }
}
