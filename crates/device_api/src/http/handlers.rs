use crate::domain::{DeviceProvisioningService, ProvisionDeviceRequest};
use crate::http::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use common::domain::Device;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateDeviceBody {
    #[serde(rename = "type")]
    pub device_type: String,
}

/// Provisioned device as returned to the caller, secret included
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub credential_user: String,
    pub credential_secret: String,
    pub created_at: String,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        DeviceResponse {
            id: device.id,
            device_type: device.device_type,
            credential_user: device.credential_user,
            credential_secret: device.credential_secret,
            created_at: rfc3339_utc(device.created_at),
        }
    }
}

fn rfc3339_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn build_router(service: Arc<DeviceProvisioningService>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/devices", post(create_device))
        .with_state(service)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn create_device(
    State(service): State<Arc<DeviceProvisioningService>>,
    body: Result<Json<CreateDeviceBody>, JsonRejection>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let Json(body) = body?;

    let device = service
        .provision_device(ProvisionDeviceRequest {
            device_type: body.device_type,
        })
        .await?;

    Ok(Json(device.into()))
}
