//! Adapters implementing the domain ports.

pub mod dry_run;
pub mod in_memory;
pub mod krist;
#[cfg(feature = "broker-nats")]
pub mod nats;
pub mod roster;
