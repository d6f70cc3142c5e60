use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Device already exists: {0}")]
    DeviceAlreadyExists(String),

    #[error("Could not allocate a unique device ID after {0} attempts")]
    IdentifierSpaceExhausted(u32),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Publish failed: {0:#}")]
    PublishFailed(anyhow::Error),

    #[error("Publish timed out after {0:?}")]
    PublishTimeout(Duration),

    #[error("Publish cancelled by shutdown")]
    PublishCancelled,

    #[error("Publisher is closed")]
    PublisherClosed,

    #[error("Failed to close publisher: {0:#}")]
    CloseFailed(anyhow::Error),
}
