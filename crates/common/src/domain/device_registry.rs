use crate::domain::credentials::{generate_device_id, generate_secret, DEFAULT_SECRET_LENGTH};
use crate::domain::{
    CreateDeviceRepoInput, Device, DeviceExistsRepoInput, DeviceRepository, DomainError,
    DomainResult, FindDeviceByCredentialsRepoInput,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Tuning knobs for device creation
#[derive(Debug, Clone)]
pub struct DeviceRegistryConfig {
    /// Length of generated device secrets, at least 1
    pub secret_length: usize,
    /// Attempts at drawing an unused device ID before giving up
    pub max_id_attempts: u32,
}

impl Default for DeviceRegistryConfig {
    fn default() -> Self {
        Self {
            secret_length: DEFAULT_SECRET_LENGTH,
            max_id_attempts: 8,
        }
    }
}

/// Owns device identity and credential issuance and validates connection credentials
///
/// This is the only component that reads or writes device records.
pub struct DeviceRegistry {
    repository: Arc<dyn DeviceRepository>,
    config: DeviceRegistryConfig,
}

impl DeviceRegistry {
    pub fn new(repository: Arc<dyn DeviceRepository>, config: DeviceRegistryConfig) -> Self {
        Self { repository, config }
    }

    /// Create a device with a fresh, unused ID and a random secret
    ///
    /// A candidate ID that already exists, or that loses an insert race to another
    /// creation, is discarded and a new one is drawn.
    #[instrument(skip_all, fields(device_type = %device_type))]
    pub async fn create_device(&self, device_type: &str) -> DomainResult<Device> {
        let max_attempts = self.config.max_id_attempts.max(1);

        for attempt in 1..=max_attempts {
            let device_id = generate_device_id();

            let exists = self
                .repository
                .device_exists(DeviceExistsRepoInput {
                    id: device_id.clone(),
                })
                .await
                .map_err(|e| with_context(e, "failed to check for existing device ID"))?;

            if exists {
                warn!(device_id = %device_id, attempt, "generated device ID already exists, retrying");
                continue;
            }

            let input = CreateDeviceRepoInput {
                id: device_id.clone(),
                device_type: device_type.to_string(),
                credential_user: device_id.clone(),
                credential_secret: generate_secret(self.config.secret_length.max(1)),
                created_at: Utc::now(),
            };

            match self.repository.create_device(input).await {
                Ok(device) => {
                    info!(device_id = %device.id, "created device");
                    return Ok(device);
                }
                Err(DomainError::DeviceAlreadyExists(id)) => {
                    warn!(device_id = %id, attempt, "device ID claimed concurrently, retrying");
                }
                Err(e) => return Err(with_context(e, "failed to create device record")),
            }
        }

        error!(attempts = max_attempts, "exhausted device ID attempts");
        Err(DomainError::IdentifierSpaceExhausted(max_attempts))
    }

    /// Check a credential pair against the registry
    ///
    /// Every failure (unknown user, wrong secret, unreachable store) yields `false`;
    /// callers cannot tell them apart.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn authenticate(&self, username: &str, secret: &str) -> bool {
        if username.is_empty() || secret.is_empty() {
            debug!("empty credentials");
            return false;
        }

        let input = FindDeviceByCredentialsRepoInput {
            credential_user: username.to_string(),
            credential_secret: secret.to_string(),
        };

        match self.repository.find_device_by_credentials(input).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("no device matches credentials");
                false
            }
            Err(e) => {
                error!(error = %e, "credential lookup failed");
                false
            }
        }
    }
}

fn with_context(error: DomainError, context: &'static str) -> DomainError {
    match error {
        DomainError::RepositoryError(e) => DomainError::RepositoryError(e.context(context)),
        other => other,
    }
}
