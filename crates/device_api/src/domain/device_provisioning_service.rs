use common::domain::{Device, DeviceRegistry, DomainResult};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Service request for provisioning a device
#[derive(Debug, Clone, Validate)]
pub struct ProvisionDeviceRequest {
    #[garde(length(min = 1))]
    pub device_type: String,
}

/// Validates provisioning requests and hands them to the registry
pub struct DeviceProvisioningService {
    registry: Arc<DeviceRegistry>,
}

impl DeviceProvisioningService {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    #[instrument(skip(self, request), fields(device_type = %request.device_type))]
    pub async fn provision_device(&self, request: ProvisionDeviceRequest) -> DomainResult<Device> {
        common::garde::validate(&request)?;

        debug!("provisioning device");
        self.registry.create_device(&request.device_type).await
    }
}
