//! Application layer containing the core business logic orchestration.
//!
//! This module defines the two consumption loops and the publisher that connects
//! them. The inbound loop turns payment notifications into queued outgoing
//! requests; the outbound loop executes those requests against the payment
//! network. Both settle every message explicitly and rely on broker redelivery
//! for anything that fails.

pub mod inbound;
pub mod outbound;
pub mod publisher;

use std::time::Duration;

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not meant for this service; acknowledged without side effects.
    Ignored,
    /// Handled successfully and acknowledged.
    Processed,
    /// Could never be handled (undecodable); acknowledged and logged.
    Rejected,
    /// Failed; negatively acknowledged for redelivery after the delay.
    Retrying(Duration),
}
