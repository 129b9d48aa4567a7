//! Service configuration loading from file and environment variables.

use crate::domain::backoff::BackoffPolicy;
use crate::infrastructure::krist::DEFAULT_ENDPOINT;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity and behaviour of the redistribution service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name payments must be sent through; also used in payout messages.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Private key of the receiving (and paying) wallet.
    #[serde(default)]
    pub private_key: String,

    /// Participant ids that never receive a share.
    #[serde(default)]
    pub deny_list: Vec<String>,

    /// Shares are paid to `{participant}@{recipient_domain}`.
    #[serde(default = "default_recipient_domain")]
    pub recipient_domain: String,

    /// When set, every payment is refunded with this text.
    #[serde(default)]
    pub closed_message: Option<String>,
}

/// NATS connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_server")]
    pub server: String,
    #[serde(default = "default_broker_user")]
    pub user: String,
    #[serde(default = "default_broker_password")]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// JSON snapshot of the participants currently online.
    #[serde(default = "default_roster_path")]
    pub roster_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_cap_attempt")]
    pub cap_attempt: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundConfig {
    /// Unacknowledged submissions allowed at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "soak=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_service_name() -> String {
    "soak".to_string()
}

fn default_recipient_domain() -> String {
    "switchcraft.kst".to_string()
}

fn default_broker_server() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_user() -> String {
    "krist".to_string()
}

fn default_broker_password() -> String {
    "krist".to_string()
}

fn default_network_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_roster_path() -> String {
    "roster.json".to_string()
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_factor() -> f64 {
    1.5
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_cap_attempt() -> u32 {
    5
}

fn default_max_in_flight() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            private_key: String::new(),
            deny_list: Vec::new(),
            recipient_domain: default_recipient_domain(),
            closed_message: None,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: default_broker_server(),
            user: default_broker_user(),
            password: default_broker_password(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_network_endpoint(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            roster_path: default_roster_path(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            factor: default_factor(),
            jitter_ms: default_jitter_ms(),
            cap_attempt: default_cap_attempt(),
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            factor: config.factor,
            jitter: Duration::from_millis(config.jitter_ms),
            cap_attempt: config.cap_attempt,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Longest redelivery delay the backoff settings may produce before jitter.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(3600);

impl Config {
    /// Checks values that would make the processing loops misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backoff = &self.backoff;
        if !backoff.factor.is_finite() || backoff.factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.factor must be a finite number of at least 1.0, got {}",
                backoff.factor
            )));
        }
        let plateau = BackoffPolicy::from(backoff).base_delay(backoff.cap_attempt);
        if plateau > MAX_BACKOFF_DELAY {
            return Err(ConfigError::Invalid(format!(
                "backoff.cap_attempt {} gives a delay of {plateau:?}, above the {MAX_BACKOFF_DELAY:?} limit",
                backoff.cap_attempt
            )));
        }
        if self.outbound.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "outbound.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks the settings the long-running service cannot do without.
    pub fn validate_for_service(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.service.private_key.is_empty() {
            return Err(ConfigError::Invalid(
                "service.private_key must be set".to_string(),
            ));
        }
        if self.service.name.is_empty() {
            return Err(ConfigError::Invalid("service.name must be set".to_string()));
        }
        Ok(())
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `NATS_SERVER`, `NATS_USER`, `NATS_PASSWORD` override `[broker]`
/// - `SOAK_PRIVATE_KEY` overrides `service.private_key`
/// - `SOAK_LOG_LEVEL` overrides `logging.level`
/// - `SOAK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(server) = std::env::var("NATS_SERVER") {
        config.broker.server = server;
    }
    if let Ok(user) = std::env::var("NATS_USER") {
        config.broker.user = user;
    }
    if let Ok(password) = std::env::var("NATS_PASSWORD") {
        config.broker.password = password;
    }
    if let Ok(key) = std::env::var("SOAK_PRIVATE_KEY") {
        config.service.private_key = key;
    }
    if let Ok(level) = std::env::var("SOAK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("SOAK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
