use super::directive::Directive;
use super::payment::IncomingPayment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest per-recipient split that may carry the payer's message.
pub const MESSAGE_MIN_SPLIT: u64 = 10;

/// Sent alongside the remainder when a payment does not divide evenly.
pub const LEFTOVER_NOTICE: &str =
    "Amount could not be split evenly between recipients, here is the leftover.";

/// Someone eligible to receive a share of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Stable participant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where the share is paid to.
    pub address: String,
}

/// Why a payment is sent back in full instead of being split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundReason {
    NoEligibleRecipients,
    InsufficientAmount { minimum: u64 },
    MessageBelowMinimum { split: u64 },
    /// The service is not accepting payments; carries the operator's text.
    Closed(String),
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEligibleRecipients => write!(f, "no eligible recipients"),
            Self::InsufficientAmount { minimum } => {
                write!(f, "insufficient amount, minimum is {minimum}")
            }
            Self::MessageBelowMinimum { split } => write!(
                f,
                "message requires per-recipient minimum of {MESSAGE_MIN_SPLIT}, got {split}"
            ),
            Self::Closed(text) => f.write_str(text),
        }
    }
}

/// One recipient's share, with the metadata it is sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub recipient: Recipient,
    pub amount: u64,
    pub directive: Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Return the whole payment.
    Refund(RefundReason),
    /// Pay every recipient the same share and return `leftover` (may be zero).
    Split { payouts: Vec<Payout>, leftover: u64 },
}

/// Decides how an incoming payment is redistributed.
#[derive(Debug, Clone)]
pub struct SplitPolicy {
    service_name: String,
}

impl SplitPolicy {
    /// `service_name` is how the service introduces itself in payout messages.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Computes the decision for `payment` given the currently eligible recipients.
    ///
    /// Shares are `value / count` truncated; the remainder is refunded. A share
    /// of zero is never paid out and becomes an insufficient-amount refund.
    pub fn decide(
        &self,
        payment: &IncomingPayment,
        directive: &Directive,
        recipients: &[Recipient],
    ) -> Decision {
        if recipients.is_empty() {
            return Decision::Refund(RefundReason::NoEligibleRecipients);
        }

        let count = recipients.len() as u64;
        let split = payment.value / count;
        let leftover = payment.value % count;

        if split == 0 {
            return Decision::Refund(RefundReason::InsufficientAmount { minimum: count });
        }

        let message = directive.message.as_deref().filter(|m| !m.is_empty());
        if message.is_some() && split < MESSAGE_MIN_SPLIT {
            return Decision::Refund(RefundReason::MessageBelowMinimum { split });
        }

        let note = self.payout_message(payment, directive, split, message);
        let payouts = recipients
            .iter()
            .map(|recipient| Payout {
                recipient: recipient.clone(),
                amount: split,
                directive: Directive::with_message(note.clone()),
            })
            .collect();

        Decision::Split { payouts, leftover }
    }

    fn payout_message(
        &self,
        payment: &IncomingPayment,
        directive: &Directive,
        split: u64,
        message: Option<&str>,
    ) -> String {
        let sender = directive
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&payment.from);

        let mut text = format!(
            "{sender} donated {split} to you through {}!",
            self.service_name
        );
        if let Some(message) = message {
            text.push_str(&format!(" They left a message: {message}"));
        }
        text
    }
}
