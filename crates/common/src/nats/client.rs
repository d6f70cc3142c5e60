use crate::domain::RawPayloadPublisher;
use crate::nats::{NatsCorePublisher, NatsJetStreamPublisher};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How raw payloads are handed to NATS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Core NATS publish plus flush, no persistence
    Core,
    /// JetStream publish acknowledged by a stream
    JetStream,
}

impl PublishMode {
    pub fn from_jetstream_enabled(enabled: bool) -> Self {
        if enabled {
            PublishMode::JetStream
        } else {
            PublishMode::Core
        }
    }
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration, connection_name: &str) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .name(connection_name)
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Make sure a stream capturing `subjects` exists, creating it if missing
    pub async fn ensure_stream(&self, stream_name: &str, subjects: Vec<String>) -> Result<()> {
        info!(stream = %stream_name, subjects = ?subjects, "Ensuring stream exists");

        match self.jetstream.get_stream(stream_name).await {
            Ok(_) => {
                info!(stream = %stream_name, "Stream already exists");
            }
            Err(_) => {
                let stream_config = StreamConfig {
                    name: stream_name.to_string(),
                    subjects,
                    description: Some("Raw device payloads forwarded from MQTT".to_string()),
                    ..Default::default()
                };
                self.jetstream
                    .create_stream(stream_config)
                    .await
                    .context("Failed to create stream")?;
                info!(stream = %stream_name, "Created stream");
            }
        }

        Ok(())
    }

    /// Build the raw payload publisher for the chosen mode
    pub fn create_publisher(&self, mode: PublishMode) -> Arc<dyn RawPayloadPublisher> {
        match mode {
            PublishMode::Core => Arc::new(NatsCorePublisher::new(self.client.clone())),
            PublishMode::JetStream => Arc::new(NatsJetStreamPublisher::new(
                self.client.clone(),
                self.jetstream.clone(),
            )),
        }
    }
}
