use crate::domain::{Access, ConnectionAuthenticator};
use async_trait::async_trait;
use common::domain::DeviceRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// Admits connections whose credentials match a registered device
///
/// Stateless: no retry, lockout or memory of earlier attempts. Once admitted, an identity
/// may read and write every topic.
pub struct AuthenticationGate {
    registry: Arc<DeviceRegistry>,
}

impl AuthenticationGate {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ConnectionAuthenticator for AuthenticationGate {
    async fn authenticate(&self, username: &str, secret: &str) -> bool {
        let admitted = self.registry.authenticate(username, secret).await;
        if admitted {
            info!(username = %username, "connection admitted");
        } else {
            warn!(username = %username, "connection denied");
        }
        admitted
    }

    async fn authorize(&self, _identity: &str, _topic: &str, _access: Access) -> bool {
        true
    }
}
