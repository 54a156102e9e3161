//! Layered settings for the CLI and the server.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`split-ledger.toml` unless another path is given), and environment
//! variables such as `SPLIT_LEDGER__DATABASE__PATH`.
use crate::calculator::{
    RemainderPolicy, SplitCalculator, DEFAULT_RECORD_TOLERANCE, DEFAULT_TOLERANCE,
};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "split-ledger.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Split {
    pub tolerance: f64,
    pub record_tolerance: f64,
    pub remainder: RemainderPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub server: Server,
    pub split: Split,
}

impl Settings {
    /// Load settings from the default file name
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(DEFAULT_CONFIG_FILE)
    }

    pub fn load(config_file: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("database.path", "split-ledger.db")?
            .set_default("server.bind", "0.0.0.0:3000")?
            .set_default("split.tolerance", DEFAULT_TOLERANCE)?
            .set_default("split.record_tolerance", DEFAULT_RECORD_TOLERANCE)?
            .set_default("split.remainder", "none")?
            .add_source(File::with_name(config_file).required(false))
            .add_source(Environment::with_prefix("SPLIT_LEDGER").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn calculator(&self) -> SplitCalculator {
        SplitCalculator {
            tolerance: self.split.tolerance,
            record_tolerance: self.split.record_tolerance,
            remainder: self.split.remainder,
        }
    }
}
