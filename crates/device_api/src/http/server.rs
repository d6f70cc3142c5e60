use crate::domain::DeviceProvisioningService;
use crate::http::build_router;
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9091,
        }
    }
}

/// Serve the provisioning API until the token is cancelled
pub async fn run_http_server(
    config: HttpServerConfig,
    service: Arc<DeviceProvisioningService>,
    cancellation_token: CancellationToken,
) -> Result<(), anyhow::Error> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            info!("HTTP server shutting down");
        })
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}
