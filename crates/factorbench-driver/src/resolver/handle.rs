//! The shared "current endpoint" of a run.
//!
//! [`EndpointHandle`] is the single writer, owned by the refresher.
//! [`EndpointReader`]s are handed to every worker at construction time. Each
//! update replaces the whole address, so a reader either sees the previous
//! value or the new one, never a torn write. After the first successful
//! publish the value is never unset again.

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

type Slot = Option<Arc<str>>;

/// Write side of the current endpoint.
#[derive(Debug)]
pub struct EndpointHandle {
    tx: watch::Sender<Slot>,
}

impl EndpointHandle {
    /// Creates an unresolved handle.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replaces the current endpoint. Returns `true` if it changed.
    pub fn publish(&self, address: &str) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.as_deref() == Some(address) {
                return false;
            }
            *slot = Some(Arc::from(address));
            true
        })
    }

    /// Creates a reader observing this handle.
    pub fn reader(&self) -> EndpointReader {
        EndpointReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> Option<Arc<str>> {
        self.tx.borrow().clone()
    }
}

impl Default for EndpointHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the current endpoint.
#[derive(Debug, Clone)]
pub struct EndpointReader {
    rx: watch::Receiver<Slot>,
}

impl EndpointReader {
    /// Non-blocking snapshot of the current endpoint, stale or not.
    pub fn current(&self) -> Option<Arc<str>> {
        self.rx.borrow().clone()
    }

    /// Waits up to `timeout` for the first endpoint to be published.
    ///
    /// Returns `None` if the timeout elapses or the writer goes away before
    /// anything was published.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Option<Arc<str>> {
        match tokio::time::timeout(timeout, self.rx.wait_for(Option::is_some)).await {
            Ok(Ok(slot)) => slot.clone(),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}
