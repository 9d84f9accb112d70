//! Indexer configuration.

use alloy::primitives::Address;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_GETLOGS_MAX_RANGE: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// HTTP RPC URL (eth_blockNumber, eth_getLogs).
    pub http_url: String,
    /// DAO contract address.
    pub contract_address: Address,
    /// First block to backfill from on startup.
    pub start_block: u64,
    /// Period of the recurring poll.
    pub poll_interval: Duration,
    /// Max block range per eth_getLogs request.
    pub getlogs_max_range: u64,
    /// Per-request timeout of the HTTP client.
    pub request_timeout: Duration,
}

impl IndexerConfig {
    /// Config with defaults for everything but the RPC endpoint and contract.
    pub fn new(http_url: impl Into<String>, contract_address: Address) -> Self {
        Self {
            http_url: http_url.into(),
            contract_address,
            start_block: 0,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            getlogs_max_range: DEFAULT_GETLOGS_MAX_RANGE,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    /// Load from `RPC_URL`, `CONTRACT_ADDRESS`, `START_BLOCK`, `POLL_INTERVAL_MS`,
    /// `GETLOGS_MAX_RANGE` and `REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [IndexerConfig::from_env] with a caller-supplied variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let http_url = get("RPC_URL").ok_or(ConfigError::Missing("RPC_URL"))?;
        let raw_address = get("CONTRACT_ADDRESS").ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))?;
        let contract_address = raw_address
            .trim()
            .parse::<Address>()
            .map_err(|e| ConfigError::invalid("CONTRACT_ADDRESS", &raw_address, e))?;

        let mut config = Self::new(http_url.trim(), contract_address);
        if let Some(v) = get("START_BLOCK") {
            config.start_block = parse_u64("START_BLOCK", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_nonzero("POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("GETLOGS_MAX_RANGE") {
            config.getlogs_max_range = parse_nonzero("GETLOGS_MAX_RANGE", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(parse_nonzero("REQUEST_TIMEOUT_MS", &v)?);
        }
        Ok(config)
    }
}

/// Startup configuration failure. Fatal: the indexer cannot run without a source and origin block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(var, value, e))
}

fn parse_nonzero(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse_u64(var, value)? {
        0 => Err(ConfigError::invalid(var, value, "must be greater than zero")),
        n => Ok(n),
    }
}
