use async_trait::async_trait;
use bytes::Bytes;
use common::domain::DomainResult;

/// Kind of topic access a connection asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Admission and authorization decisions for transport connections
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConnectionAuthenticator: Send + Sync {
    /// Decide whether a connection presenting these credentials is admitted.
    /// On `true`, `username` becomes the connection's identity.
    async fn authenticate(&self, username: &str, secret: &str) -> bool;

    /// Decide whether an admitted identity may use `topic`
    async fn authorize(&self, identity: &str, topic: &str, access: Access) -> bool;
}

/// Per-message hook invoked for every publish on an admitted connection
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageForwarder: Send + Sync {
    /// Forward `payload` on behalf of `identity`, returning it unmodified on success
    async fn forward(&self, identity: &str, payload: Bytes) -> DomainResult<Bytes>;
}
