//! Runtime configuration, loaded from `config.json` in the working
//! directory and overridable flag-by-flag on the command line.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

fn default_strategy() -> String {
    "marketmaker".to_string()
}

fn default_file() -> String {
    "data/ticks.csv".to_string()
}

fn default_spread() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_size() -> u32 {
    10
}

fn default_risk() -> Decimal {
    Decimal::new(-500, 0)
}

/// Simulator run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Strategy to run: "marketmaker", "momentum", or "arbitrage".
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Path of the tick CSV file to replay.
    #[serde(default = "default_file")]
    pub file: String,

    /// Arbitrage spread threshold parameter.
    #[serde(default = "default_spread")]
    pub spread: Decimal,

    /// Arbitrage order size parameter.
    #[serde(default = "default_size")]
    pub size: u32,

    /// Max-loss floor: a strategy whose realized PnL falls to this level
    /// latches its risk flag and stops.
    #[serde(default = "default_risk")]
    pub risk: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            file: default_file(),
            spread: default_spread(),
            size: default_size(),
            risk: default_risk(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load configuration, falling back to defaults (with a warning) when
    /// the file is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.as_ref().display(), %err, "using default configuration");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.strategy, "marketmaker");
        assert_eq!(config.file, "data/ticks.csv");
        assert_eq!(config.spread, dec!(0.02));
        assert_eq!(config.size, 10);
        assert_eq!(config.risk, dec!(-500));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"strategy": "momentum", "risk": -75.5}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.strategy, "momentum");
        assert_eq!(config.risk, dec!(-75.5));
        assert_eq!(config.size, 10);
        assert_eq!(config.spread, dec!(0.02));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default("/nonexistent/config.json");
        assert_eq!(config.strategy, "marketmaker");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
