//! NATS JetStream broker adapter.
//!
//! Payment notifications arrive on the `krist` stream under
//! `krist.from.<sender>.to.<recipient>`; outgoing requests live on the `soak`
//! stream and are deduplicated through the `Nats-Msg-Id` header.

use crate::domain::idempotency::IdempotencyKey;
use crate::domain::payment::OutgoingRequest;
use crate::domain::ports::{Delivery, MessageSource, PublishAck, RequestQueue};
use crate::error::{Result, SoakError};
use async_nats::jetstream::consumer::pull::MessagesErrorKind;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, ReplayPolicy, pull};
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, info};

pub const PAYMENT_STREAM: &str = "krist";
pub const OUTGOING_STREAM: &str = "soak";
pub const OUTGOING_SUBJECT: &str = "soak.txs.outgoing";
pub const INBOUND_CONSUMER: &str = "soak-krist";
pub const OUTBOUND_CONSUMER: &str = "soak-sender";

fn broker_error(e: impl Display) -> SoakError {
    SoakError::BrokerError(e.to_string())
}

fn outgoing_stream_config() -> jetstream::stream::Config {
    jetstream::stream::Config {
        name: OUTGOING_STREAM.to_string(),
        subjects: vec![OUTGOING_SUBJECT.to_string()],
        ..Default::default()
    }
}

/// Whether the server-side stream differs from `desired` in the fields we set.
fn needs_update(current: &jetstream::stream::Config, desired: &jetstream::stream::Config) -> bool {
    current.subjects != desired.subjects
}

/// A connected JetStream context.
#[derive(Clone)]
pub struct JetStreamBroker {
    context: jetstream::Context,
}

impl JetStreamBroker {
    pub async fn connect(server: &str, user: &str, password: &str) -> Result<Self> {
        let client = async_nats::ConnectOptions::with_user_and_password(
            user.to_string(),
            password.to_string(),
        )
        .connect(server)
        .await
        .map_err(broker_error)?;
        info!(server, "connected to NATS");

        Ok(Self {
            context: jetstream::new(client),
        })
    }

    /// Creates the outgoing stream, or brings an existing one up to date.
    pub async fn ensure_outgoing_stream(&self) -> Result<()> {
        let desired = outgoing_stream_config();
        let stream = self
            .context
            .get_or_create_stream(desired.clone())
            .await
            .map_err(broker_error)?;

        if needs_update(&stream.cached_info().config, &desired) {
            self.context
                .update_stream(desired)
                .await
                .map_err(broker_error)?;
            info!(stream = OUTGOING_STREAM, "updated outgoing stream configuration");
        }
        Ok(())
    }

    /// Durable consumer over new payments sent to `address`.
    pub async fn inbound(&self, address: &str) -> Result<JetStreamSource> {
        self.subscribe(
            PAYMENT_STREAM,
            pull::Config {
                durable_name: Some(INBOUND_CONSUMER.to_string()),
                deliver_policy: DeliverPolicy::New,
                ack_policy: AckPolicy::Explicit,
                replay_policy: ReplayPolicy::Instant,
                filter_subject: format!("krist.from.*.to.{address}"),
                ..Default::default()
            },
        )
        .await
    }

    /// Durable consumer over outgoing requests with at most `max_ack_pending` unacknowledged.
    pub async fn outbound(&self, max_ack_pending: usize) -> Result<JetStreamSource> {
        self.subscribe(
            OUTGOING_STREAM,
            pull::Config {
                durable_name: Some(OUTBOUND_CONSUMER.to_string()),
                deliver_policy: DeliverPolicy::New,
                ack_policy: AckPolicy::Explicit,
                replay_policy: ReplayPolicy::Instant,
                filter_subject: OUTGOING_SUBJECT.to_string(),
                max_ack_pending: i64::try_from(max_ack_pending).unwrap_or(i64::MAX),
                ..Default::default()
            },
        )
        .await
    }

    pub fn queue(&self) -> JetStreamQueue {
        JetStreamQueue {
            context: self.context.clone(),
        }
    }

    /// Creates the consumer, or updates it in place when it already exists.
    async fn subscribe(&self, stream: &str, config: pull::Config) -> Result<JetStreamSource> {
        let stream = self.context.get_stream(stream).await.map_err(broker_error)?;
        let consumer = stream.create_consumer(config).await.map_err(broker_error)?;
        let messages = consumer.messages().await.map_err(broker_error)?;
        Ok(JetStreamSource {
            messages,
            closed: false,
        })
    }
}

/// Pull subscription on a durable consumer.
///
/// Errors such as missed heartbeats are passed on and the subscription keeps
/// going; once the consumer is gone the source ends.
pub struct JetStreamSource {
    messages: pull::Stream,
    closed: bool,
}

#[async_trait]
impl MessageSource for JetStreamSource {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>>> {
        if self.closed {
            return None;
        }
        let message = self.messages.next().await?;
        Some(match message {
            Ok(message) => {
                let delivery: Box<dyn Delivery> = Box::new(JetStreamDelivery { message });
                Ok(delivery)
            }
            Err(e) => {
                if matches!(
                    e.kind(),
                    MessagesErrorKind::ConsumerDeleted | MessagesErrorKind::PushBasedConsumer
                ) {
                    error!(error = %e, "consumer is no longer available");
                    self.closed = true;
                }
                Err(broker_error(e))
            }
        })
    }
}

struct JetStreamDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for JetStreamDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn redelivery_count(&self) -> u32 {
        self.message
            .info()
            .map(|info| u32::try_from(info.delivered.saturating_sub(1)).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.message.ack().await.map_err(broker_error)
    }

    async fn nak(self: Box<Self>, delay: Duration) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(broker_error)
    }
}

/// Publishes outgoing requests to the `soak` stream.
#[derive(Clone)]
pub struct JetStreamQueue {
    context: jetstream::Context,
}

#[async_trait]
impl RequestQueue for JetStreamQueue {
    async fn publish(&self, request: &OutgoingRequest, key: IdempotencyKey) -> Result<PublishAck> {
        let payload = serde_json::to_vec(request)?;
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", key.to_string().as_str());

        let ack = self
            .context
            .publish_with_headers(OUTGOING_SUBJECT, headers, payload.into())
            .await
            .map_err(broker_error)?
            .await
            .map_err(broker_error)?;

        Ok(PublishAck {
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }
}
