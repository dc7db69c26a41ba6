//! CLI argument parsing and run-configuration merging.

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tradeit_core::Config;

/// Command-line arguments. Anything not given falls back to
/// `config.json` in the working directory, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "tradeit", version, about = "CLOB trading simulator")]
pub struct Args {
    /// Strategy to run: marketmaker, momentum, or arbitrage
    #[arg(long)]
    pub strategy: Option<String>,

    /// Tick CSV file to replay
    #[arg(long)]
    pub file: Option<String>,

    /// Arbitrage spread threshold
    #[arg(long, allow_hyphen_values = true)]
    pub spread: Option<f64>,

    /// Arbitrage order size
    #[arg(long)]
    pub size: Option<u32>,

    /// Max-loss floor (a negative number)
    #[arg(long, allow_hyphen_values = true)]
    pub risk: Option<f64>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Overlay these arguments onto a loaded configuration.
    pub fn merge_into(self, mut config: Config) -> Result<Config> {
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(file) = self.file {
            config.file = file;
        }
        if let Some(spread) = self.spread {
            config.spread = Decimal::try_from(spread).context("invalid --spread value")?;
        }
        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(risk) = self.risk {
            config.risk = Decimal::try_from(risk).context("invalid --risk value")?;
        }
        Ok(config)
    }
}
