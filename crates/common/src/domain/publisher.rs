use crate::domain::{DomainError, DomainResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Prefix of every per-device subject on the bus
pub const RAW_SUBJECT_PREFIX: &str = "raw";

/// Bus subject for payloads published by `identity`
pub fn raw_subject(identity: &str) -> String {
    format!("{}.{}", RAW_SUBJECT_PREFIX, identity)
}

/// Time budget for a single publish
///
/// Combines a timeout with a cancellation token derived from the process-wide shutdown
/// token, so a shutdown cuts an in-flight publish short.
#[derive(Debug, Clone)]
pub struct PublishDeadline {
    timeout: Duration,
    cancellation: CancellationToken,
}

impl PublishDeadline {
    pub fn new(timeout: Duration, cancellation: CancellationToken) -> Self {
        Self {
            timeout,
            cancellation,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` until it completes, the timeout elapses or the token is cancelled
    pub async fn bound<F, T>(&self, operation: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(DomainError::PublishCancelled),
            result = tokio::time::timeout(self.timeout, operation) => match result {
                Ok(result) => result,
                Err(_) => Err(DomainError::PublishTimeout(self.timeout)),
            },
        }
    }
}

/// Sink for raw device payloads on the event bus
///
/// Implementations must be safe to call from many connections at once and must let
/// in-flight publishes finish before `close` releases the underlying connection.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawPayloadPublisher: Send + Sync {
    /// Publish `payload` to `subject` within the given deadline
    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
        deadline: PublishDeadline,
    ) -> DomainResult<()>;

    /// Drain in-flight publishes and release the bus connection
    async fn close(&self) -> DomainResult<()>;
}
