use crate::mqtt::{run_session, SessionConfig, SessionEnd, SessionHooks};
use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, field, info, info_span, warn, Instrument};

/// Pause after a failed accept, e.g. when the process is out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// MQTT listener configuration
#[derive(Debug, Clone)]
pub struct MqttListenerConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
}

impl Default for MqttListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1883,
            session: SessionConfig::default(),
        }
    }
}

/// Accepts device connections and runs a session task for each
pub struct MqttListener {
    listener: TcpListener,
    session_config: SessionConfig,
}

impl MqttListener {
    pub async fn bind(config: MqttListenerConfig) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind MQTT listener on {}", addr))?;

        Ok(Self {
            listener,
            session_config: config.session,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read MQTT listener address")
    }

    /// Accept connections until `shutdown` is cancelled, then wait for open sessions to end
    pub async fn run(self, hooks: SessionHooks, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "MQTT listener accepting connections");

        let sessions = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept MQTT connection");
                        if !accept_backoff(&shutdown).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
            }

            let span = info_span!(
                "mqtt_connection",
                peer = %peer,
                client_id = field::Empty,
                identity = field::Empty,
            );
            let hooks = hooks.clone();
            let config = self.session_config.clone();
            let shutdown = shutdown.clone();

            sessions.spawn(
                async move {
                    match run_session(stream, hooks, &config, shutdown).await {
                        Ok(SessionEnd::ClientDisconnected) | Ok(SessionEnd::Shutdown) => {
                            debug!("session ended")
                        }
                        Ok(end) => info!(reason = ?end, "session closed"),
                        Err(e) => warn!(error = %e, "session failed"),
                    }
                }
                .instrument(span),
            );
        }

        drop(self.listener);
        sessions.close();
        info!(open_sessions = sessions.len(), "MQTT listener stopped accepting, draining sessions");
        sessions.wait().await;
        info!("MQTT listener stopped");

        Ok(())
    }
}

/// Wait before the next accept; `false` when shutdown was requested meanwhile
async fn accept_backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}
