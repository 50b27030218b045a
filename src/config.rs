use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::TraderError;
use crate::Result;

/// Runtime settings, layered: defaults, then `candle-trader.toml` (optional),
/// then `TRADER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bucket_secs: i64,
    pub warmup_candles: usize,
    pub pair: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub balance_fraction: Decimal,
    pub min_order_size: Decimal,
    pub order_granularity: Decimal,
    pub feed_url: String,
    pub poll_interval_ms: u64,
    pub requests_per_minute: u32,
    pub backfill_buckets: usize,
    pub fee_pct: f64,
    pub fee_fixed: f64,
    pub paper_quote_balance: Decimal,
    pub paper_base_balance: Decimal,
}

impl Settings {
    /// Load settings from the default file name and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("candle-trader")
    }

    /// Load settings from `<file_stem>.toml` (if present) and the environment
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("bucket_secs", 60)?
            .set_default("warmup_candles", 205)?
            .set_default("pair", "BTC/USD")?
            .set_default("base_currency", "BTC")?
            .set_default("quote_currency", "USD")?
            .set_default("balance_fraction", "0.95")?
            .set_default("min_order_size", "0.01")?
            .set_default("order_granularity", "0.0001")?
            .set_default("feed_url", "https://api.bitfinex.com/v1/trades/btcusd")?
            .set_default("poll_interval_ms", 5_000)?
            .set_default("requests_per_minute", 30)?
            .set_default("backfill_buckets", 0)?
            .set_default("fee_pct", 0.002)?
            .set_default("fee_fixed", 0.0)?
            .set_default("paper_quote_balance", "10000")?
            .set_default("paper_base_balance", "0")?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("TRADER"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_secs <= 0 {
            return Err(TraderError::Config(format!(
                "bucket_secs must be positive, got {}",
                self.bucket_secs
            )));
        }
        if self.warmup_candles == 0 {
            return Err(TraderError::Config("warmup_candles must be at least 1".into()));
        }
        if self.balance_fraction <= Decimal::ZERO || self.balance_fraction > Decimal::ONE {
            return Err(TraderError::Config(format!(
                "balance_fraction must be in (0, 1], got {}",
                self.balance_fraction
            )));
        }
        if self.min_order_size < Decimal::ZERO {
            return Err(TraderError::Config("min_order_size must not be negative".into()));
        }
        if self.order_granularity <= Decimal::ZERO {
            return Err(TraderError::Config("order_granularity must be positive".into()));
        }
        if self.requests_per_minute == 0 {
            return Err(TraderError::Config("requests_per_minute must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn defaults() -> Settings {
        Settings::load_from("does-not-exist").unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = defaults();
        assert_eq!(settings.warmup_candles, 205);
        assert_eq!(settings.balance_fraction, Decimal::from_str("0.95").unwrap());
        assert_eq!(settings.min_order_size, Decimal::from_str("0.01").unwrap());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_bucket() {
        let settings = Settings {
            bucket_secs: 0,
            ..defaults()
        };
        assert!(matches!(settings.validate(), Err(TraderError::Config(_))));
    }

    #[test]
    fn test_rejects_fraction_above_one() {
        let settings = Settings {
            balance_fraction: Decimal::from_str("1.5").unwrap(),
            ..defaults()
        };
        assert!(settings.validate().is_err());
    }
}
