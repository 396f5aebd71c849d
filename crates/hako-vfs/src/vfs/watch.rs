//! Change-watch subscriptions.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::types::VfsFileEvent;

/// Callback invoked for every delivered change event.
pub type WatchCallback = Arc<dyn Fn(VfsFileEvent) + Send + Sync>;

/// Capacity of the channel between an event source and its delivery task.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handle to a live watch subscription.
///
/// Delivery stops when the handle is closed or dropped. Events already
/// handed to the callback are not rolled back.
pub struct WatchHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Keeps the event source (e.g. a `notify` watcher) alive.
    _source: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    /// Handle that stops a delivery task through `shutdown_tx`.
    pub fn new(shutdown_tx: oneshot::Sender<()>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            _source: None,
        }
    }

    /// Attach an event source that must live as long as the subscription.
    pub fn with_source(mut self, source: impl Any + Send) -> Self {
        self._source = Some(Box::new(source));
        self
    }

    /// Returns true while the delivery task is still listening.
    pub fn is_active(&self) -> bool {
        self.shutdown_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Stop delivery.
    pub fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Deliver events from `rx` to `handler` on a background task.
pub(crate) fn pump_events(mut rx: mpsc::Receiver<VfsFileEvent>, handler: WatchCallback) -> WatchHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    tracing::debug!("watch subscription closed");
                    break;
                }
                event = rx.recv() => match event {
                    // close() may land while recv() was being polled
                    Some(_) if shutdown_requested(&mut shutdown_rx) => break,
                    Some(event) => handler(event),
                    None => break,
                },
            }
        }
    });

    WatchHandle::new(shutdown_tx)
}

/// True once the handle has been closed or dropped.
fn shutdown_requested(shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}
