use crate::mqtt::{MqttListener, MqttListenerConfig, SessionHooks};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// MQTT ingress wired to the authentication and forwarding hooks
pub struct MqttBridge {
    hooks: SessionHooks,
    config: MqttListenerConfig,
}

impl MqttBridge {
    pub fn new(hooks: SessionHooks, config: MqttListenerConfig) -> Self {
        debug!("Initializing MQTT bridge module");
        Self { hooks, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                let listener = MqttListener::bind(self.config).await?;
                listener.run(self.hooks, ctx).await
            })
        }
    }
}
