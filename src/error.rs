use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoakError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Broker error: {0}")]
    BrokerError(String),
    #[error("Payment network error: {0}")]
    NetworkError(String),
    #[error("Presence error: {0}")]
    PresenceError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SoakError>;
