//! Delivery engine: outbound sends with credential fallback and durable
//! attempt recording.

use std::sync::Arc;

use otto_channel::{
    ChannelCredentials, ChannelError, ChannelReceipt, ChannelTransport, OutboundPayload,
};
use otto_store::PipelineStore;
use otto_types::{DeliveryAttempt, DeliveryStatus, NewDeliveryAttempt};
use tracing::{error, info, warn};

use crate::metrics::PipelineMetrics;

/// Sends replies through the outbound channel and records every terminal
/// outcome as a delivery attempt row.
pub struct DeliveryEngine {
    transport: Arc<dyn ChannelTransport>,
    store: Arc<dyn PipelineStore>,
    platform_credentials: ChannelCredentials,
    metrics: Arc<PipelineMetrics>,
}

impl DeliveryEngine {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        store: Arc<dyn PipelineStore>,
        platform_credentials: ChannelCredentials,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            transport,
            store,
            platform_credentials,
            metrics,
        }
    }

    /// Sends `payload` to `recipient`, using tenant credentials when given.
    ///
    /// A provider-classified invalid-credential failure with tenant
    /// credentials triggers exactly one extra attempt with platform
    /// credentials, so one tenant's broken token cannot block delivery when
    /// a working route exists. Returns `true` only when a `sent` outcome was
    /// durably recorded.
    pub async fn deliver(
        &self,
        recipient: &str,
        payload: &OutboundPayload,
        tenant_credentials: Option<ChannelCredentials>,
    ) -> bool {
        let tenant_specific = tenant_credentials.is_some();
        let credentials = tenant_credentials.unwrap_or_else(|| self.platform_credentials.clone());

        let mut outcome = self.transport.send(recipient, payload, &credentials).await;
        if tenant_specific {
            if let Err(failure) = &outcome {
                if failure.is_invalid_credential() {
                    warn!(
                        recipient,
                        "invalid tenant token, retrying with platform credentials"
                    );
                    outcome = self
                        .transport
                        .send(recipient, payload, &self.platform_credentials)
                        .await;
                }
            }
        }

        match outcome {
            Ok(receipt) => {
                info!(recipient, status = receipt.http_status, "message delivered");
                self.record(recipient, sent_attempt(payload, recipient, &receipt))
                    .await
            }
            Err(failure) => {
                self.metrics.record_delivery_failure();
                error!(recipient, %failure, "message delivery failed");
                self.record(
                    recipient,
                    NewDeliveryAttempt {
                        recipient: recipient.to_string(),
                        body: payload.record_body(),
                        status: DeliveryStatus::Failed,
                        response_status: failure.http_status,
                        response_body: None,
                        error_detail: Some(failure.to_string()),
                    },
                )
                .await;
                false
            }
        }
    }

    /// Re-sends a stored failed attempt with platform credentials. Does not
    /// insert a new attempt row; the sweeper transitions the existing one,
    /// which keeps resends out of the retryable pool.
    pub async fn redeliver(
        &self,
        attempt: &DeliveryAttempt,
    ) -> Result<ChannelReceipt, ChannelError> {
        let payload = OutboundPayload::text(attempt.body.clone());
        let result = self
            .transport
            .send(&attempt.recipient, &payload, &self.platform_credentials)
            .await;
        if result.is_err() {
            self.metrics.record_delivery_failure();
        }
        result
    }

    async fn record(&self, recipient: &str, attempt: NewDeliveryAttempt) -> bool {
        let sent = attempt.status == DeliveryStatus::Sent;
        match self.store.record_delivery_attempt(attempt).await {
            Ok(_) => sent,
            Err(store_error) => {
                error!(recipient, %store_error, "failed to record delivery attempt");
                false
            }
        }
    }
}

fn sent_attempt(
    payload: &OutboundPayload,
    recipient: &str,
    receipt: &ChannelReceipt,
) -> NewDeliveryAttempt {
    NewDeliveryAttempt {
        recipient: recipient.to_string(),
        body: payload.record_body(),
        status: DeliveryStatus::Sent,
        response_status: Some(receipt.http_status),
        response_body: Some(receipt.body.clone()),
        error_detail: None,
    }
}
