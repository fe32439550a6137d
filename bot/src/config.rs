//! Bot configuration: TOML file plus CLI overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use reelpot_engine::{FeeMode, PayoutTable};

use crate::oracle::{Fallback, PriceOracle, QuoteSource, StaticQuote, DEFAULT_SOURCE_TIMEOUT};

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Tips addressed to anyone else are ignored.
    pub receive_address: String,
    /// When set, 10% of every positive payout is withheld for this
    /// address.
    #[serde(default)]
    pub operator_address: Option<String>,
    #[serde(default = "default_ticker")]
    pub ticker: String,
    /// Smallest units per whole coin.
    #[serde(default = "default_unit_scale")]
    pub unit_scale: u64,
    pub fee_mode: FeeMode,
    #[serde(default = "PayoutTable::percentage_default")]
    pub payout_table: PayoutTable,
    #[serde(default)]
    pub ledger: LedgerPolicyConfig,
    #[serde(default)]
    pub delivery: PayoutDelivery,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LedgerPolicyConfig {
    /// Persisted pool balance is authoritative.
    #[default]
    Local,
    /// Pool balance mirrors a live external account.
    ExternalMirror { account: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutDelivery {
    /// Pay winnings at the end of the batch.
    #[default]
    Auto,
    /// Store winnings as a pending credit; a claim action pays on
    /// demand.
    Claim,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_source_timeout_secs")]
    pub per_source_timeout_secs: u64,
    #[serde(default = "default_fallback")]
    pub fallback: Fallback,
    /// Fixed-price sources, tried in order. Real HTTP sources are wired
    /// in by the deployment behind the `QuoteSource` trait.
    #[serde(default)]
    pub static_sources: Vec<StaticSourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticSourceConfig {
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_ticker() -> String {
    "COIN".to_string()
}

fn default_unit_scale() -> u64 {
    1_000_000_000
}

fn default_state_path() -> PathBuf {
    PathBuf::from("reelpot-state.json")
}

fn default_source_timeout_secs() -> u64 {
    DEFAULT_SOURCE_TIMEOUT.as_secs()
}

fn default_fallback() -> Fallback {
    Fallback::None
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            per_source_timeout_secs: default_source_timeout_secs(),
            fallback: default_fallback(),
            static_sources: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: default_retry_attempts(),
            base_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BotConfig {
    /// Load from a TOML file, or fall back to the dev defaults when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                toml::from_str(&data)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))?
            }
            None => Self::dev(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Local development defaults: exact fee mode, local ledger,
    /// auto-pay.
    pub fn dev() -> Self {
        BotConfig {
            receive_address: "reelpot-bank".to_string(),
            operator_address: None,
            ticker: default_ticker(),
            unit_scale: default_unit_scale(),
            fee_mode: FeeMode::Exact {
                fee_units: 1_000_000,
            },
            payout_table: PayoutTable::percentage_default(),
            ledger: LedgerPolicyConfig::Local,
            delivery: PayoutDelivery::Auto,
            oracle: OracleConfig::default(),
            state_path: default_state_path(),
            retry: RetryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.payout_table
            .validate()
            .context("invalid payout table")?;
        if self.fee_mode.needs_price()
            && self.oracle.static_sources.is_empty()
            && self.oracle.fallback == Fallback::None
        {
            anyhow::bail!(
                "usd-pegged fee mode needs at least one quote source or a fallback policy"
            );
        }
        Ok(())
    }

    /// Build the price oracle from the configured sources.
    pub fn build_oracle(&self) -> PriceOracle {
        let sources: Vec<Arc<dyn QuoteSource>> = self
            .oracle
            .static_sources
            .iter()
            .map(|s| Arc::new(StaticQuote::new(s.name.clone(), s.price)) as Arc<dyn QuoteSource>)
            .collect();
        PriceOracle::new(
            sources,
            Duration::from_secs(self.oracle.per_source_timeout_secs),
            self.oracle.fallback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_config_validates() {
        BotConfig::dev().validate().expect("valid");
    }

    #[test]
    fn parses_full_toml() {
        let toml = r#"
            receive_address = "bank"
            operator_address = "operator"
            ticker = "SOL"
            unit_scale = 1000000000
            state_path = "/var/lib/reelpot/state.json"

            [fee_mode]
            mode = "usd_pegged"
            usd_cents = 100

            [payout_table.triple]
            kind = "percentage"
            value = 50

            [payout_table.pair]
            kind = "percentage"
            value = 20

            [ledger]
            policy = "external_mirror"
            account = "pool-wallet"

            [oracle]
            per_source_timeout_secs = 8

            [oracle.fallback]
            policy = "cached_last"
            ttl_secs = 300

            [[oracle.static_sources]]
            name = "primary"
            price = 2.5

            [retry]
            attempts = 3
            base_delay_ms = 250
        "#;
        let config: BotConfig = toml::from_str(toml).expect("parses");
        config.validate().expect("valid");
        assert!(config.fee_mode.needs_price());
        assert_eq!(
            config.ledger,
            LedgerPolicyConfig::ExternalMirror {
                account: "pool-wallet".to_string()
            }
        );
        assert_eq!(config.retry.base_delay_ms, 250);
    }

    #[test]
    fn usd_mode_without_sources_is_rejected() {
        let mut config = BotConfig::dev();
        config.fee_mode = FeeMode::UsdPegged { usd_cents: 100 };
        assert!(config.validate().is_err());
    }
}
