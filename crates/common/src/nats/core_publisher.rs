use crate::domain::{DomainError, DomainResult, PublishDeadline, RawPayloadPublisher};
use crate::nats::send_gate::SendGate;
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Fire-and-forget publisher on a core NATS connection
///
/// A publish enqueues the message and flushes the connection. Delivery is only as durable
/// as the server's own buffering.
pub struct NatsCorePublisher {
    client: async_nats::Client,
    gate: SendGate,
}

impl NatsCorePublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            gate: SendGate::new(),
        }
    }
}

#[async_trait]
impl RawPayloadPublisher for NatsCorePublisher {
    #[instrument(skip_all, fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
        deadline: PublishDeadline,
    ) -> DomainResult<()> {
        deadline
            .bound(self.gate.run(async {
                self.client
                    .publish(subject, payload)
                    .await
                    .context("Failed to enqueue message on NATS connection")
                    .map_err(DomainError::PublishFailed)?;

                self.client
                    .flush()
                    .await
                    .context("Failed to flush NATS connection")
                    .map_err(DomainError::PublishFailed)?;

                debug!("flushed core NATS publish");
                Ok(())
            }))
            .await
    }

    async fn close(&self) -> DomainResult<()> {
        if !self.gate.close().await {
            return Ok(());
        }

        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection on close")
            .map_err(DomainError::CloseFailed)?;

        self.client
            .drain()
            .await
            .context("Failed to drain NATS connection")
            .map_err(DomainError::CloseFailed)?;

        info!("core NATS publisher closed");
        Ok(())
    }
}
