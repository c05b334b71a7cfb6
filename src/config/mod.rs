use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::convert::TryFrom;
use std::env;
use std::str::FromStr;

use crate::error::{EngineError, Result};

#[derive(Debug, Deserialize)]
pub struct Settings {
    // Solana configuration. Multiple RPC urls are round-robined by the
    // connection pool; the websocket url is optional and only enables the
    // push half of confirmation tracking.
    pub solana_rpc_urls: String,
    pub solana_ws_url: Option<String>,
    pub wallet_private_key: String,

    // Aggregator endpoints
    pub aggregator_url: String,

    // Platform fee
    pub fee_recipient: String,
    pub platform_fee_bps: u64,

    // Trading defaults
    pub default_slippage_bps: u16,
    pub prioritization_fee_lamports: Option<u64>,

    // Monitoring configuration
    pub log_level: String,
}

impl TryFrom<Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: Config) -> std::result::Result<Self, Self::Error> {
        Ok(Settings {
            solana_rpc_urls: config.get_string("solana_rpc_urls")?,
            solana_ws_url: config.get_string("solana_ws_url").ok(),
            wallet_private_key: config.get_string("wallet_private_key")?,
            aggregator_url: config.get_string("aggregator_url")?,
            fee_recipient: config.get_string("fee_recipient")?,
            platform_fee_bps: config.get_int("platform_fee_bps")? as u64,
            default_slippage_bps: config.get_int("default_slippage_bps").unwrap_or(50) as u16,
            prioritization_fee_lamports: config
                .get_int("prioritization_fee_lamports")
                .ok()
                .map(|v| v as u64),
            log_level: config
                .get_string("log_level")
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        let env = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = ConfigBuilder::<DefaultState>::default()
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::default())
            .build()?;

        Settings::try_from(config)
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let config = ConfigBuilder::<DefaultState>::default()
            .add_source(Environment::default())
            .build()?;

        Settings::try_from(config)
    }

    /// Comma-separated RPC url list, trimmed and de-emptied.
    pub fn rpc_urls(&self) -> Vec<String> {
        self.solana_rpc_urls
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Fail-fast validation of everything the engine needs parsed, so a bad
    /// deployment dies at startup rather than mid-trade.
    pub fn validate(&self) -> Result<ValidatedSettings> {
        let fee_recipient = Pubkey::from_str(&self.fee_recipient).map_err(|e| {
            EngineError::InvalidSettings(format!(
                "fee_recipient '{}' is not a valid pubkey: {}",
                self.fee_recipient, e
            ))
        })?;

        let rpc_urls = self.rpc_urls();
        if rpc_urls.is_empty() {
            return Err(EngineError::InvalidSettings(
                "solana_rpc_urls must contain at least one url".to_string(),
            ));
        }

        if self.platform_fee_bps >= 10_000 {
            return Err(EngineError::InvalidSettings(format!(
                "platform_fee_bps {} is not a sane fee rate",
                self.platform_fee_bps
            )));
        }

        Ok(ValidatedSettings {
            rpc_urls,
            ws_url: self.solana_ws_url.clone(),
            aggregator_url: self.aggregator_url.trim_end_matches('/').to_string(),
            fee_recipient,
            platform_fee_bps: self.platform_fee_bps,
            default_slippage_bps: self.default_slippage_bps,
            prioritization_fee_lamports: self.prioritization_fee_lamports,
        })
    }
}

/// Settings after fail-fast parsing; what the engine constructors consume.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    pub rpc_urls: Vec<String>,
    pub ws_url: Option<String>,
    pub aggregator_url: String,
    pub fee_recipient: Pubkey,
    pub platform_fee_bps: u64,
    pub default_slippage_bps: u16,
    pub prioritization_fee_lamports: Option<u64>,
}
