use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Venue-A connection settings: authenticated REST plus the on-chain event
/// tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueAConfig {
    pub rest_url: String,
    pub chain_id: u64,
    pub block_events_ws_url: String,
    pub jwt_slack_ms: u64,
}

/// Venue-B connection settings: REST plus the market-data WS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueBConfig {
    pub rest_url: String,
    pub ws_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookCacheConfig {
    pub fresh_ms: u64,
    pub stale_ms: u64,
    pub max_stale_ms: u64,
}

impl Default for OrderbookCacheConfig {
    fn default() -> Self {
        Self {
            fresh_ms: 500,
            stale_ms: 1_000,
            max_stale_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub order_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_hedge_retries: u32,
    pub cost_check_throttle_ms: u64,
    pub min_hedge_shares: f64,
    pub min_hedge_notional_usd: f64,
    pub loss_hedge_max_deviation: f64,
    pub loss_hedge_max_wait_ms: u64,
    pub min_order_value_usd: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            order_timeout_ms: 20_000,
            poll_interval_ms: 500,
            max_hedge_retries: 3,
            cost_check_throttle_ms: 200,
            min_hedge_shares: 2.0,
            min_hedge_notional_usd: 1.0,
            loss_hedge_max_deviation: 0.02,
            loss_hedge_max_wait_ms: 1_800_000,
            min_order_value_usd: 0.90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    pub base_dir: String,
    pub retention_days: u32,
    pub queue_max_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            base_dir: "data/tasks".to_string(),
            retention_days: 7,
            queue_max_size: 1_000,
            flush_interval_ms: 500,
        }
    }
}

/// Top-level engine configuration, loaded from YAML with secrets sourced
/// from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub venue_a: VenueAConfig,
    pub venue_b: VenueBConfig,
    #[serde(default)]
    pub orderbook_cache: OrderbookCacheConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub log_sink: LogSinkConfig,

    /// Wallet private key, sourced from `.env` (never in the YAML file).
    #[serde(skip)]
    pub private_key: String,

    /// Wallet address, sourced from `.env`.
    #[serde(skip)]
    pub wallet_address: String,
}

impl EngineConfig {
    /// Load configuration from a YAML file and `.env`.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: EngineConfig = serde_yaml::from_str(&yaml_content)?;

        dotenv::dotenv().ok();

        config.private_key = std::env::var("PRIVATE_KEY")
            .map_err(|_| ConfigError::EnvVarMissing("PRIVATE_KEY".to_string()))?;
        config.wallet_address = std::env::var("WALLET_ADDRESS")
            .map_err(|_| ConfigError::EnvVarMissing("WALLET_ADDRESS".to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.executor.max_hedge_retries == 0 {
            return Err(ConfigError::ValidationError(
                "executor.max_hedge_retries must be >= 1".to_string(),
            ));
        }
        if self.executor.loss_hedge_max_deviation <= 0.0
            || self.executor.loss_hedge_max_deviation > 0.5
        {
            return Err(ConfigError::ValidationError(
                "executor.loss_hedge_max_deviation must be in (0, 0.5]".to_string(),
            ));
        }
        if self.orderbook_cache.fresh_ms >= self.orderbook_cache.stale_ms
            || self.orderbook_cache.stale_ms >= self.orderbook_cache.max_stale_ms
        {
            return Err(ConfigError::ValidationError(
                "orderbook_cache thresholds must satisfy fresh < stale < max_stale".to_string(),
            ));
        }
        if !self.private_key.starts_with("0x") || self.private_key.len() != 66 {
            return Err(ConfigError::ValidationError(
                "PRIVATE_KEY must be a valid hex string (0x followed by 64 hex characters)"
                    .to_string(),
            ));
        }
        if !self.wallet_address.starts_with("0x") || self.wallet_address.len() != 42 {
            return Err(ConfigError::ValidationError(
                "WALLET_ADDRESS must be a valid Ethereum address (0x followed by 40 hex characters)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineConfig {
        EngineConfig {
            venue_a: VenueAConfig {
                rest_url: "https://venue-a.example/api".to_string(),
                chain_id: 137,
                block_events_ws_url: "wss://venue-a.example/events".to_string(),
                jwt_slack_ms: 5_000,
            },
            venue_b: VenueBConfig {
                rest_url: "https://venue-b.example/api".to_string(),
                ws_url: "wss://venue-b.example/market".to_string(),
            },
            orderbook_cache: OrderbookCacheConfig::default(),
            executor: ExecutorConfig::default(),
            log_sink: LogSinkConfig::default(),
            private_key: "0x1234567890123456789012345678901234567890123456789012345678901234"
                .to_string(),
            wallet_address: "0x1234567890123456789012345678901234567890".to_string(),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = sample();
        assert!(config.validate().is_ok());

        config.executor.max_hedge_retries = 0;
        assert!(config.validate().is_err());
        config.executor.max_hedge_retries = 3;

        config.private_key = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_threshold_ordering_enforced() {
        let mut config = sample();
        config.orderbook_cache.stale_ms = config.orderbook_cache.fresh_ms;
        assert!(config.validate().is_err());
    }
}
