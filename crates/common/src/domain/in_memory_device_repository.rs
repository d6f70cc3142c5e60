use crate::domain::{
    CreateDeviceRepoInput, Device, DeviceExistsRepoInput, DeviceRepository, DomainError,
    DomainResult, FindDeviceByCredentialsRepoInput,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of DeviceRepository keyed by device ID
///
/// Records do not survive a restart. Used for local runs without PostgreSQL and in tests.
#[derive(Clone)]
pub struct InMemoryDeviceRepository {
    devices: Arc<RwLock<HashMap<String, Device>>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }
}

impl Default for InMemoryDeviceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn device_exists(&self, input: DeviceExistsRepoInput) -> DomainResult<bool> {
        let devices = self.devices.read().await;
        Ok(devices.contains_key(&input.id))
    }

    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&input.id) {
            return Err(DomainError::DeviceAlreadyExists(input.id));
        }
        let device: Device = input.into();
        devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn find_device_by_credentials(
        &self,
        input: FindDeviceByCredentialsRepoInput,
    ) -> DomainResult<Option<Device>> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .find(|d| {
                d.credential_user == input.credential_user
                    && d.credential_secret == input.credential_secret
            })
            .cloned())
    }
}
