//! Offline replay of recorded payment notifications.
//!
//! Both loops run against in-memory queues and a dry-run network, so the
//! transfers a live service would have made can be inspected without touching
//! the broker or the payment network.

use crate::application::inbound::{InboundProcessor, ServiceIdentity};
use crate::application::outbound::OutboundProcessor;
use crate::application::publisher::RequestPublisher;
use crate::config::Config;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::payment::{IncomingPayment, OutgoingRequest};
use crate::domain::policy::SplitPolicy;
use crate::domain::ports::Participant;
use crate::error::Result;
use crate::infrastructure::dry_run::DryRunNetwork;
use crate::infrastructure::in_memory::InMemoryQueue;
use crate::infrastructure::roster::{RosterResolver, StaticRoster};
use std::sync::Arc;
use tracing::info;

/// Runs `payments` through both loops and returns the transfers that were executed.
pub async fn replay(
    payments: &[IncomingPayment],
    participants: Vec<Participant>,
    config: &Config,
    address: &str,
) -> Result<Vec<OutgoingRequest>> {
    config.validate()?;

    let notifications = InMemoryQueue::new();
    for payment in payments {
        notifications.push_json(payment).await?;
    }

    let outgoing = InMemoryQueue::new();
    let backoff = BackoffPolicy::from(&config.backoff);
    let resolver = RosterResolver::new(
        Box::new(StaticRoster::new(participants)),
        config.service.deny_list.clone(),
        config.service.recipient_domain.as_str(),
    );

    InboundProcessor::new(
        ServiceIdentity {
            address: address.to_string(),
            name: config.service.name.clone(),
        },
        RequestPublisher::new(Arc::new(outgoing.clone())),
        Arc::new(resolver),
        SplitPolicy::new(config.service.name.as_str()),
    )
    .with_backoff(backoff)
    .with_closed_message(config.service.closed_message.clone())
    .run(notifications.subscribe())
    .await?;

    // One at a time so the transfers come out in queue order.
    let network = Arc::new(DryRunNetwork::new());
    OutboundProcessor::new(network.clone(), config.service.private_key.as_str())
        .with_backoff(backoff)
        .with_max_in_flight(1)
        .run(outgoing.subscribe())
        .await?;

    let transfers = network.transfers().await;
    info!(
        payments = payments.len(),
        transfers = transfers.len(),
        "replay finished"
    );
    Ok(transfers)
}
