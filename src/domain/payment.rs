use crate::error::SoakError;
use serde::{Deserialize, Deserializer, Serialize};

/// A settled payment notification as published by the payment network.
///
/// The network sends `null` for a few fields (mined transactions have no
/// sender, plain transfers have no name or metadata), so those are normalised
/// on the way in. The id arrives as a number but is treated as opaque text.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IncomingPayment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub from: String,
    pub to: String,
    pub value: u64,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub sent_name: String,
    #[serde(default)]
    pub metadata: Option<String>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

fn deserialize_nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single payment waiting to be executed by the outbound loop.
///
/// This is the wire format of the outgoing queue.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct OutgoingRequest {
    pub to: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

impl OutgoingRequest {
    pub fn new(to: impl Into<String>, amount: u64, meta: Option<String>) -> Result<Self, SoakError> {
        let request = Self {
            to: to.into(),
            amount,
            meta,
        };
        request.validate()?;
        Ok(request)
    }

    /// Checks the invariants a request read back from the queue must still hold.
    pub fn validate(&self) -> Result<(), SoakError> {
        if self.to.is_empty() {
            return Err(SoakError::ValidationError(
                "Destination must not be empty".to_string(),
            ));
        }
        if self.amount == 0 {
            return Err(SoakError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
