use crate::domain::DeviceProvisioningService;
use crate::http::{run_http_server, HttpServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DeviceApi {
    service: Arc<DeviceProvisioningService>,
    config: HttpServerConfig,
}

impl DeviceApi {
    pub fn new(service: Arc<DeviceProvisioningService>, config: HttpServerConfig) -> Self {
        debug!("Initializing device API module");
        Self { service, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { run_http_server(self.config, self.service, ctx).await })
    }
}
