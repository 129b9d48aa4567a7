//! Domain types and the ports the application layer talks through.
//!
//! Nothing in here performs I/O; brokers, payment networks and presence
//! services are reached through the traits in [`ports`].

pub mod backoff;
pub mod directive;
pub mod idempotency;
pub mod payment;
pub mod policy;
pub mod ports;
