use crate::domain::{DomainError, DomainResult, PublishDeadline, RawPayloadPublisher};
use crate::nats::send_gate::SendGate;
use crate::nats::trace_context::inject_trace_context;
use anyhow::Context;
use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Header carrying the payload content type on every stored message
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Content type attached to raw device payloads
pub const RAW_PAYLOAD_CONTENT_TYPE: &str = "application/json";

/// Durable publisher appending payloads to a JetStream stream
///
/// A publish returns only after the stream has acknowledged the message.
pub struct NatsJetStreamPublisher {
    client: async_nats::Client,
    context: jetstream::Context,
    gate: SendGate,
}

impl NatsJetStreamPublisher {
    pub fn new(client: async_nats::Client, context: jetstream::Context) -> Self {
        Self {
            client,
            context,
            gate: SendGate::new(),
        }
    }
}

/// Headers attached to every raw payload: content type plus trace context
pub(crate) fn raw_payload_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE_HEADER, RAW_PAYLOAD_CONTENT_TYPE);
    inject_trace_context(&mut headers);
    headers
}

#[async_trait]
impl RawPayloadPublisher for NatsJetStreamPublisher {
    #[instrument(skip_all, fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(
        &self,
        subject: String,
        payload: Bytes,
        deadline: PublishDeadline,
    ) -> DomainResult<()> {
        deadline
            .bound(self.gate.run(async {
                let ack = self
                    .context
                    .publish_with_headers(subject, raw_payload_headers(), payload)
                    .await
                    .context("Failed to publish message to JetStream")
                    .map_err(DomainError::PublishFailed)?;

                let ack = ack
                    .await
                    .context("Failed to receive JetStream acknowledgment")
                    .map_err(DomainError::PublishFailed)?;

                debug!(stream = %ack.stream, sequence = ack.sequence, "JetStream acknowledged publish");
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

        info!("JetStream publisher closed");
        Ok(())
    }
}
