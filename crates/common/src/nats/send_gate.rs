use crate::domain::{DomainError, DomainResult};
use std::future::Future;
use tokio::sync::RwLock;

/// Tracks in-flight sends so a publisher can drain them before closing
///
/// Each send holds a shared guard for its whole duration; closing takes the exclusive
/// guard, which waits for every in-flight send to finish. Sends that arrive after the
/// close are rejected with `PublisherClosed`.
#[derive(Default)]
pub(crate) struct SendGate {
    closed: RwLock<bool>,
}

impl SendGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn run<F, T>(&self, send: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        let closed = self.closed.read().await;
        if *closed {
            return Err(DomainError::PublisherClosed);
        }
        send.await
    }

    /// Wait for in-flight sends and mark the gate closed.
    ///
    /// Returns false when the gate was already closed.
    pub(crate) async fn close(&self) -> bool {
        let mut closed = self.closed.write().await;
        let first_close = !*closed;
        *closed = true;
        first_close
    }
}
