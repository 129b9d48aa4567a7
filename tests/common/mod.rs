#![allow(dead_code)]

use soak::application::inbound::{InboundProcessor, ServiceIdentity};
use soak::application::publisher::RequestPublisher;
use soak::domain::backoff::BackoffPolicy;
use soak::domain::payment::IncomingPayment;
use soak::domain::policy::SplitPolicy;
use soak::domain::ports::{Participant, RecipientResolverRef};
use soak::infrastructure::in_memory::InMemoryQueue;
use soak::infrastructure::roster::{RosterResolver, StaticRoster};
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE_ADDRESS: &str = "ksoak00000";
pub const SERVICE_NAME: &str = "soak";
pub const PAYER: &str = "kpayer0001";

pub fn payment(id: u64, value: u64, metadata: Option<&str>) -> IncomingPayment {
    IncomingPayment {
        id: id.to_string(),
        from: PAYER.to_string(),
        to: SERVICE_ADDRESS.to_string(),
        value,
        sent_name: SERVICE_NAME.to_string(),
        metadata: metadata.map(str::to_string),
    }
}

pub fn participants(names: &[&str]) -> Vec<Participant> {
    names
        .iter()
        .map(|name| Participant {
            id: format!("uuid-{name}"),
            name: name.to_string(),
            afk: false,
        })
        .collect()
}

pub fn roster_resolver(names: &[&str]) -> RecipientResolverRef {
    Arc::new(RosterResolver::new(
        Box::new(StaticRoster::new(participants(names))),
        Vec::new(),
        "switchcraft.kst",
    ))
}

/// Backoff without jitter so redelivery timing is predictable.
pub fn fixed_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial_delay: Duration::from_millis(100),
        factor: 2.0,
        jitter: Duration::ZERO,
        cap_attempt: 5,
    }
}

pub fn inbound_processor(outgoing: &InMemoryQueue, resolver: RecipientResolverRef) -> InboundProcessor {
    InboundProcessor::new(
        ServiceIdentity {
            address: SERVICE_ADDRESS.to_string(),
            name: SERVICE_NAME.to_string(),
        },
        RequestPublisher::new(Arc::new(outgoing.clone())),
        resolver,
        SplitPolicy::new("soak.kst"),
    )
    .with_backoff(fixed_backoff())
}

pub fn write_payments(path: &Path, payments: &[IncomingPayment]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for payment in payments {
        serde_json::to_writer(&mut file, payment)?;
        writeln!(file)?;
    }
    Ok(())
}

pub fn write_roster(path: &Path, names: &[&str]) -> Result<(), Error> {
    let file = File::create(path)?;
    serde_json::to_writer(file, &participants(names))?;
    Ok(())
}
