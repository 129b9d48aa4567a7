use super::Outcome;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::payment::OutgoingRequest;
use crate::domain::ports::{Delivery, MessageSource, PaymentNetworkRef, TransferReceipt};
use crate::error::{Result, SoakError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Default bound on unacknowledged submissions.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Executes queued outgoing requests against the payment network.
#[derive(Clone)]
pub struct OutboundProcessor {
    network: PaymentNetworkRef,
    private_key: Arc<str>,
    backoff: BackoffPolicy,
    max_in_flight: usize,
}

impl OutboundProcessor {
    pub fn new(network: PaymentNetworkRef, private_key: impl Into<Arc<str>>) -> Self {
        Self {
            network,
            private_key: private_key.into(),
            backoff: BackoffPolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub async fn execute(&self, request: &OutgoingRequest) -> Result<TransferReceipt> {
        info!(to = %request.to, amount = request.amount, "submitting transfer");
        self.network.submit(request, &self.private_key).await
    }

    /// Settles one delivery. Errors are only returned when the broker could not
    /// be told about the outcome.
    pub async fn handle(&self, delivery: Box<dyn Delivery>) -> Result<Outcome> {
        let request = match decode_request(delivery.payload()) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "discarding invalid outgoing request");
                delivery.ack().await?;
                return Ok(Outcome::Rejected);
            }
        };

        match self.execute(&request).await {
            Ok(receipt) => {
                info!(to = %request.to, amount = request.amount, transaction = ?receipt.id, "transfer settled");
                delivery.ack().await?;
                Ok(Outcome::Processed)
            }
            Err(e) => {
                let attempt = delivery.redelivery_count();
                let delay = self.backoff.delay(attempt);
                warn!(to = %request.to, amount = request.amount, error = %e, attempt, ?delay, "transfer failed, scheduling redelivery");
                delivery.nak(delay).await?;
                Ok(Outcome::Retrying(delay))
            }
        }
    }

    /// Consumes until the source ends, with at most `max_in_flight`
    /// deliveries unsettled at any time. Errors reported by the source are
    /// logged and consumption continues.
    pub async fn run<S: MessageSource>(&self, mut source: S) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        loop {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| SoakError::BrokerError(e.to_string()))?;
            let Some(next) = source.next().await else {
                break;
            };
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(error = %e, "error receiving outgoing request");
                    continue;
                }
            };

            let processor = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = processor.handle(delivery).await {
                    error!(error = %e, "failed to settle outgoing request");
                }
            });

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "outgoing request task aborted");
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "outgoing request task aborted");
            }
        }
        info!("outbound subscription ended");
        Ok(())
    }
}

fn decode_request(payload: &[u8]) -> Result<OutgoingRequest> {
    let request: OutgoingRequest = serde_json::from_slice(payload)?;
    request.validate()?;
    Ok(request)
}
