use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A provisioned device and the MQTT credentials issued to it
///
/// Records are immutable once persisted. `credential_user` always equals `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub device_type: String,
    pub credential_user: String,
    pub credential_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Repository input for persisting a new device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeviceRepoInput {
    pub id: String,
    pub device_type: String,
    pub credential_user: String,
    pub credential_secret: String,
    pub created_at: DateTime<Utc>,
}

impl From<CreateDeviceRepoInput> for Device {
    fn from(input: CreateDeviceRepoInput) -> Self {
        Device {
            id: input.id,
            device_type: input.device_type,
            credential_user: input.credential_user,
            credential_secret: input.credential_secret,
            created_at: input.created_at,
        }
    }
}

/// Repository input for an identifier existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceExistsRepoInput {
    pub id: String,
}

/// Repository input for an exact credential pair lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindDeviceByCredentialsRepoInput {
    pub credential_user: String,
    pub credential_secret: String,
}

/// Repository trait for device storage operations
///
/// Implementations must enforce uniqueness of `id` and report a duplicate insert as
/// `DomainError::DeviceAlreadyExists`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Check whether a device with the given ID has been persisted
    async fn device_exists(&self, input: DeviceExistsRepoInput) -> DomainResult<bool>;

    /// Persist a new device record
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device>;

    /// Find the device owning exactly this credential pair
    async fn find_device_by_credentials(
        &self,
        input: FindDeviceByCredentialsRepoInput,
    ) -> DomainResult<Option<Device>>;
}
