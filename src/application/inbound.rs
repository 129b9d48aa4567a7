use super::Outcome;
use super::publisher::RequestPublisher;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::directive::Directive;
use crate::domain::payment::IncomingPayment;
use crate::domain::policy::{Decision, LEFTOVER_NOTICE, RefundReason, SplitPolicy};
use crate::domain::ports::{Delivery, MessageSource, RecipientResolverRef};
use crate::error::Result;
use futures_util::future::try_join_all;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How many partially published decisions are remembered.
pub const PENDING_PLAN_CAPACITY: usize = 1024;

/// Decisions whose requests were only partly queued, by source payment id.
///
/// A redelivered payment reuses its earlier decision instead of resolving
/// recipients again, so destinations already queued are never paired with
/// recomputed amounts. Oldest entries are evicted past the capacity.
struct PendingPlans {
    capacity: usize,
    entries: Mutex<VecDeque<(String, Decision)>>,
}

impl PendingPlans {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    async fn take(&self, id: &str) -> Option<Decision> {
        let mut entries = self.entries.lock().await;
        let position = entries.iter().position(|(key, _)| key == id)?;
        entries.remove(position).map(|(_, decision)| decision)
    }

    async fn remember(&self, id: &str, decision: Decision) {
        let mut entries = self.entries.lock().await;
        entries.retain(|(key, _)| key != id);
        entries.push_back((id.to_string(), decision));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}

/// The address and name payments must be sent to for this service to act on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub address: String,
    pub name: String,
}

/// Consumes payment notifications and redistributes the ones sent to us.
pub struct InboundProcessor {
    identity: ServiceIdentity,
    publisher: RequestPublisher,
    resolver: RecipientResolverRef,
    policy: SplitPolicy,
    backoff: BackoffPolicy,
    closed_message: Option<String>,
    pending: PendingPlans,
}

impl InboundProcessor {
    pub fn new(
        identity: ServiceIdentity,
        publisher: RequestPublisher,
        resolver: RecipientResolverRef,
        policy: SplitPolicy,
    ) -> Self {
        Self {
            identity,
            publisher,
            resolver,
            policy,
            backoff: BackoffPolicy::default(),
            closed_message: None,
            pending: PendingPlans::new(PENDING_PLAN_CAPACITY),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Refund everything with `message` as the error instead of splitting.
    pub fn with_closed_message(mut self, message: Option<String>) -> Self {
        self.closed_message = message;
        self
    }

    pub fn is_addressed_to_us(&self, payment: &IncomingPayment) -> bool {
        payment.to == self.identity.address && payment.sent_name == self.identity.name
    }

    /// Decides what to do with `payment` and queues the resulting requests.
    ///
    /// Any error leaves the payment unsettled. A decision whose requests were
    /// only partly queued is kept and reused when the payment comes back, and
    /// the requests already queued are deduplicated on their destination.
    pub async fn process(&self, payment: &IncomingPayment) -> Result<Decision> {
        let decision = match self.pending.take(&payment.id).await {
            Some(decision) => {
                info!(id = %payment.id, "reusing decision from an earlier attempt");
                decision
            }
            None => self.decide(payment).await?,
        };

        if let Err(e) = self.enqueue(payment, &decision).await {
            self.pending.remember(&payment.id, decision).await;
            return Err(e);
        }
        Ok(decision)
    }

    async fn decide(&self, payment: &IncomingPayment) -> Result<Decision> {
        if let Some(text) = &self.closed_message {
            return Ok(Decision::Refund(RefundReason::Closed(text.clone())));
        }

        let directive = Directive::decode(payment.metadata.as_deref());
        let recipients = self.resolver.eligible(payment, &directive).await?;
        debug!(
            id = %payment.id,
            recipients = ?recipients.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "resolved eligible recipients"
        );
        Ok(self.policy.decide(payment, &directive, &recipients))
    }

    async fn enqueue(&self, payment: &IncomingPayment, decision: &Decision) -> Result<()> {
        match decision {
            Decision::Refund(reason) => {
                info!(id = %payment.id, %reason, "refunding payment");
                self.publisher
                    .refund(payment, Some(&Directive::with_error(reason.to_string())), None)
                    .await?;
            }
            Decision::Split { payouts, leftover } => {
                info!(
                    id = %payment.id,
                    recipients = payouts.len(),
                    leftover,
                    "splitting payment"
                );
                if *leftover > 0 {
                    self.publisher
                        .refund(
                            payment,
                            Some(&Directive::with_message(LEFTOVER_NOTICE)),
                            Some(*leftover),
                        )
                        .await?;
                }
                try_join_all(payouts.iter().map(|payout| {
                    self.publisher.publish(
                        payment,
                        &payout.recipient.address,
                        payout.amount,
                        Some(&payout.directive),
                    )
                }))
                .await?;
            }
        }
        Ok(())
    }

    /// Settles one delivery. Errors are only returned when the broker could not
    /// be told about the outcome.
    pub async fn handle(&self, delivery: Box<dyn Delivery>) -> Result<Outcome> {
        let payment: IncomingPayment = match serde_json::from_slice(delivery.payload()) {
            Ok(payment) => payment,
            Err(e) => {
                error!(error = %e, "discarding undecodable payment notification");
                delivery.ack().await?;
                return Ok(Outcome::Rejected);
            }
        };

        if !self.is_addressed_to_us(&payment) {
            debug!(id = %payment.id, to = %payment.to, "payment not addressed to us");
            delivery.ack().await?;
            return Ok(Outcome::Ignored);
        }

        info!(id = %payment.id, from = %payment.from, value = payment.value, "received payment");

        match self.process(&payment).await {
            Ok(_) => {
                delivery.ack().await?;
                Ok(Outcome::Processed)
            }
            Err(e) => {
                let attempt = delivery.redelivery_count();
                let delay = self.backoff.delay(attempt);
                warn!(id = %payment.id, error = %e, attempt, ?delay, "payment handling failed, scheduling redelivery");
                delivery.nak(delay).await?;
                Ok(Outcome::Retrying(delay))
            }
        }
    }

    /// Processes deliveries one at a time until the source ends.
    ///
    /// Errors reported by the source are logged and consumption continues;
    /// a source that can no longer deliver ends instead.
    pub async fn run<S: MessageSource>(&self, mut source: S) -> Result<()> {
        while let Some(next) = source.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(error = %e, "error receiving payment notification");
                    continue;
                }
            };
            if let Err(e) = self.handle(delivery).await {
                error!(error = %e, "failed to settle payment notification");
            }
        }
        info!("inbound subscription ended");
        Ok(())
    }
}
