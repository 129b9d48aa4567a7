use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::{Builder, Uuid};

/// Deduplication key attached to every published outgoing request.
///
/// The broker drops a second publish carrying a key it has already seen, so a
/// source payment that is processed twice never pays the same destination twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Derives the key for paying `destination` out of `source_id`.
///
/// The first 16 bytes of `sha256("{source_id}.{destination}")` are used as the
/// random input of a version 4 UUID.
pub fn derive_key(source_id: &str, destination: &str) -> IdempotencyKey {
    let digest = Sha256::digest(format!("{source_id}.{destination}").as_bytes());
    let mut seed = [0u8; 16];
    seed.copy_from_slice(&digest[..16]);
    IdempotencyKey(Builder::from_random_bytes(seed).into_uuid())
}
