//! HTTP client for the Krist payment network.

use crate::domain::payment::OutgoingRequest;
use crate::domain::ports::{PaymentNetwork, TransferReceipt};
use crate::error::{Result, SoakError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_ENDPOINT: &str = "https://krist.dev";

const ADDRESS_PREFIX: char = 'k';
const ADDRESS_CHARS: usize = 9;

#[derive(Serialize)]
struct MakeTransaction<'a> {
    privatekey: &'a str,
    to: &'a str,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a str>,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    transaction: Option<ApiTransaction>,
    #[serde(default)]
    address: Option<ApiAddress>,
}

#[derive(Deserialize)]
struct ApiTransaction {
    id: u64,
}

#[derive(Deserialize)]
struct ApiAddress {
    balance: u64,
}

impl ApiResponse {
    fn into_result(self) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        let error = self.error.as_deref().unwrap_or("unknown_error");
        Err(SoakError::NetworkError(match &self.message {
            Some(message) => format!("{error}: {message}"),
            None => error.to_string(),
        }))
    }
}

/// Krist node client.
#[derive(Clone)]
pub struct KristClient {
    http: reqwest::Client,
    endpoint: String,
}

impl KristClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    async fn read(response: reqwest::Response) -> Result<ApiResponse> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SoakError::NetworkError(e.to_string()))?;
        serde_json::from_slice::<ApiResponse>(&body)
            .map_err(|e| SoakError::NetworkError(format!("unexpected response ({status}): {e}")))?
            .into_result()
    }
}

impl Default for KristClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl PaymentNetwork for KristClient {
    async fn submit(&self, request: &OutgoingRequest, private_key: &str) -> Result<TransferReceipt> {
        let body = MakeTransaction {
            privatekey: private_key,
            to: &request.to,
            amount: request.amount,
            metadata: request.meta.as_deref(),
        };
        let response = self
            .http
            .post(format!("{}/transactions", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| SoakError::NetworkError(e.to_string()))?;

        let parsed = Self::read(response).await?;
        Ok(TransferReceipt {
            id: parsed.transaction.map(|tx| tx.id.to_string()),
        })
    }

    async fn balance(&self, address: &str) -> Result<u64> {
        let response = self
            .http
            .get(format!("{}/addresses/{address}", self.endpoint))
            .send()
            .await
            .map_err(|e| SoakError::NetworkError(e.to_string()))?;

        Self::read(response)
            .await?
            .address
            .map(|a| a.balance)
            .ok_or_else(|| SoakError::NetworkError("address missing from response".to_string()))
    }
}

struct Hashed {
    hex: String,
    bytes: [u8; 32],
}

fn sha256(input: &str) -> Hashed {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&Sha256::digest(input.as_bytes()));
    Hashed {
        hex: hex::encode(bytes),
        bytes,
    }
}

fn byte_to_address_char(byte: u8) -> char {
    let c = 48 + byte / 7;
    char::from(if c + 39 > 122 {
        101
    } else if c > 57 {
        c + 39
    } else {
        c
    })
}

/// Derives the v2 address owned by a raw private key.
pub fn derive_address(private_key: &str) -> String {
    let mut hash = sha256(&sha256(private_key).hex);
    let mut slots = [None; ADDRESS_CHARS];
    for slot in slots.iter_mut() {
        *slot = Some(hash.bytes[0]);
        hash = sha256(&sha256(&hash.hex).hex);
    }

    let mut address = String::from(ADDRESS_PREFIX);
    let mut filled = 0;
    while filled < ADDRESS_CHARS {
        let index = usize::from(hash.bytes[filled]) % ADDRESS_CHARS;
        match slots[index].take() {
            Some(byte) => {
                address.push(byte_to_address_char(byte));
                filled += 1;
            }
            None => hash = sha256(&hash.hex),
        }
    }
    address
}
