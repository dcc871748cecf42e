use std::collections::HashMap;
use thiserror::Error;

use crate::domain::Decimal;

/// Runtime configuration for the batch job.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub kline_api_url: String,
    pub holders_api_url: String,
    /// Instrument codes to ingest and reconcile.
    pub instruments: Vec<String>,
    /// Substrings selecting which disclosed holder names to ingest; empty
    /// keeps every holder. Canonical holder-id resolution stays upstream.
    pub holder_keywords: Vec<String>,
    /// Bounded worker pool size for the reconciliation fan-out.
    pub worker_count: usize,
    /// How far back to fetch bars on first ingestion of an instrument.
    pub bar_lookback_days: i64,
    pub engine: EngineParams,
}

/// Tunable modeling constants for the reconstruction engine.
///
/// These are empirical choices tied to a quarterly disclosure cadence, not
/// laws; they travel as an explicit value so test suites can vary them per
/// scenario.
#[derive(Debug, Clone)]
pub struct EngineParams {
    /// Shares per exchange lot; converts lot-denominated bar volume into a
    /// per-share VWAP denominator. Depends on the bar feed's unit convention.
    pub lot_size: Decimal,
    /// Length of the accumulation window priced behind each increase.
    pub window_days: i64,
    /// Disclosure gap beyond which the old basis is discarded as stale.
    pub gap_days: i64,
    /// Discount applied to a single-window VWAP when no reconstructed basis
    /// exists; large buyers tend to accumulate below the period's VWAP.
    pub cost_discount: Decimal,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            lot_size: Decimal::from_i64(100),
            window_days: 90,
            gap_days: 180,
            cost_discount: Decimal::from_scaled(95, 2),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_KLINE_API_URL: &str = "http://push2his.eastmoney.com/api/qt/stock/kline/get";
const DEFAULT_HOLDERS_API_URL: &str = "https://datacenter.eastmoney.com/securities/api/data/get";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let kline_api_url = env_map
            .get("KLINE_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_KLINE_API_URL.to_string());

        let holders_api_url = env_map
            .get("HOLDERS_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HOLDERS_API_URL.to_string());

        let instruments = parse_instruments_from_map(&env_map)?;
        let holder_keywords = parse_list(&env_map, "HOLDER_KEYWORDS");

        let worker_count = parse_with_default(&env_map, "WORKER_COUNT", 8usize)?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue(
                "WORKER_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let bar_lookback_days = parse_with_default(&env_map, "BAR_LOOKBACK_DAYS", 1095i64)?;

        let engine = EngineParams {
            lot_size: parse_decimal_with_default(&env_map, "LOT_SIZE", "100")?,
            window_days: parse_with_default(&env_map, "WINDOW_DAYS", 90i64)?,
            gap_days: parse_with_default(&env_map, "GAP_DAYS", 180i64)?,
            cost_discount: parse_decimal_with_default(&env_map, "COST_DISCOUNT", "0.95")?,
        };

        Ok(Config {
            database_path,
            kline_api_url,
            holders_api_url,
            instruments,
            holder_keywords,
            worker_count,
            bar_lookback_days,
            engine,
        })
    }
}

fn parse_with_default<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse {:?}", raw))
        }),
    }
}

fn parse_decimal_with_default(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Decimal::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("cannot parse {:?} as decimal", raw))
    })
}

fn parse_list(env_map: &HashMap<String, String>, key: &str) -> Vec<String> {
    env_map
        .get(key)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_instruments_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<String>, ConfigError> {
    if let Some(codes_str) = env_map.get("INSTRUMENTS") {
        Ok(codes_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else if let Some(file_path) = env_map.get("INSTRUMENTS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "INSTRUMENTS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else {
        Ok(Vec::new())
    }
}
