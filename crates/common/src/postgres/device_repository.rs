use crate::domain::{
    CreateDeviceRepoInput, Device, DeviceExistsRepoInput, DeviceRepository, DomainError,
    DomainResult, FindDeviceByCredentialsRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// PostgreSQL error code for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Device row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub id: String,
    pub device_type: String,
    pub credential_user: String,
    pub credential_secret: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for DeviceRow {
    fn from(row: &Row) -> Self {
        DeviceRow {
            id: row.get(0),
            device_type: row.get(1),
            credential_user: row.get(2),
            credential_secret: row.get(3),
            created_at: row.get(4),
        }
    }
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            device_type: row.device_type,
            credential_user: row.credential_user,
            credential_secret: row.credential_secret,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(device_id = %input.id))]
    async fn device_exists(&self, input: DeviceExistsRepoInput) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM devices WHERE id = $1)",
                &[&input.id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.get(0))
    }

    #[instrument(skip(self, input), fields(device_id = %input.id, device_type = %input.device_type))]
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let result = conn
            .execute(
                "INSERT INTO devices (id, device_type, credential_user, credential_secret, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &input.id,
                    &input.device_type,
                    &input.credential_user,
                    &input.credential_secret,
                    &input.created_at,
                ],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == UNIQUE_VIOLATION {
                    return Err(DomainError::DeviceAlreadyExists(input.id));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!("registered device: {}", input.id);

        Ok(input.into())
    }

    #[instrument(skip(self, input), fields(credential_user = %input.credential_user))]
    async fn find_device_by_credentials(
        &self,
        input: FindDeviceByCredentialsRepoInput,
    ) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, device_type, credential_user, credential_secret, created_at
                 FROM devices
                 WHERE credential_user = $1 AND credential_secret = $2
                 LIMIT 1",
                &[&input.credential_user, &input.credential_secret],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| DeviceRow::from(&row).into()))
    }
}
