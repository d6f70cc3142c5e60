use crate::domain::MessageForwarder;
use async_trait::async_trait;
use bytes::Bytes;
use common::domain::{raw_subject, DomainResult, PublishDeadline, RawPayloadPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Forwarding settings
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    pub publish_timeout: Duration,
    /// Log payload contents on successful forwards
    pub log_payloads: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            log_payloads: false,
        }
    }
}

/// Maps each message to its device subject and hands it to the bus publisher
pub struct ForwardingMediator {
    publisher: Arc<dyn RawPayloadPublisher>,
    config: ForwardingConfig,
    shutdown: CancellationToken,
}

impl ForwardingMediator {
    /// `shutdown` is the process-wide token; each publish gets a child of it.
    pub fn new(
        publisher: Arc<dyn RawPayloadPublisher>,
        config: ForwardingConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            publisher,
            config,
            shutdown,
        }
    }
}

#[async_trait]
impl MessageForwarder for ForwardingMediator {
    #[instrument(skip_all, fields(identity = %identity, bytes = payload.len()))]
    async fn forward(&self, identity: &str, payload: Bytes) -> DomainResult<Bytes> {
        let subject = raw_subject(identity);
        let deadline = PublishDeadline::new(self.config.publish_timeout, self.shutdown.child_token());

        match self
            .publisher
            .publish(subject.clone(), payload.clone(), deadline)
            .await
        {
            Ok(()) => {
                if self.config.log_payloads {
                    info!(
                        subject = %subject,
                        bytes = payload.len(),
                        payload = %String::from_utf8_lossy(&payload),
                        "forwarded payload"
                    );
                } else {
                    info!(subject = %subject, bytes = payload.len(), "forwarded payload");
                }
                Ok(payload)
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "failed to forward payload");
                Err(e)
            }
        }
    }
}
