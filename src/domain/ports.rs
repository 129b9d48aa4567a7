use super::directive::Directive;
use super::idempotency::IdempotencyKey;
use super::payment::{IncomingPayment, OutgoingRequest};
use super::policy::Recipient;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A message handed out by the broker that must be settled exactly once.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];
    /// How many times this message was delivered before; zero on first delivery.
    fn redelivery_count(&self) -> u32;
    async fn ack(self: Box<Self>) -> Result<()>;
    /// Returns the message to the broker for redelivery after `delay`.
    async fn nak(self: Box<Self>, delay: Duration) -> Result<()>;
}

/// A durable consumer. `None` means the subscription ended.
#[async_trait]
pub trait MessageSource: Send {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>>>;
}

/// Result of enqueueing an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    pub sequence: u64,
    /// The broker had already accepted a message with the same key.
    pub duplicate: bool,
}

/// The outgoing-request queue. Publishing twice with the same key is a no-op.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    async fn publish(&self, request: &OutgoingRequest, key: IdempotencyKey) -> Result<PublishAck>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub id: Option<String>,
}

/// The payment network the outbound loop settles requests on.
#[async_trait]
pub trait PaymentNetwork: Send + Sync {
    async fn submit(&self, request: &OutgoingRequest, private_key: &str) -> Result<TransferReceipt>;
    async fn balance(&self, address: &str) -> Result<u64>;
}

/// Decides who may receive a share of `payment`.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn eligible(
        &self,
        payment: &IncomingPayment,
        directive: &Directive,
    ) -> Result<Vec<Recipient>>;
}

/// A connected participant as reported by the presence service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    #[serde(alias = "uuid")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub afk: bool,
}

/// Snapshot source for the participants currently online.
#[async_trait]
pub trait Roster: Send + Sync {
    async fn participants(&self) -> Result<Vec<Participant>>;
}

pub type RequestQueueRef = Arc<dyn RequestQueue>;
pub type PaymentNetworkRef = Arc<dyn PaymentNetwork>;
pub type RecipientResolverRef = Arc<dyn RecipientResolver>;
pub type RosterBox = Box<dyn Roster>;
