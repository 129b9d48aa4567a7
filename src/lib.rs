//! Redistributes payments sent to a fixed name.
//!
//! Payment notifications are consumed from a durable stream, split evenly
//! between the currently eligible recipients (or refunded), and executed
//! through an outgoing queue whose requests are keyed so that reprocessing
//! never pays anyone twice.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod replay;
