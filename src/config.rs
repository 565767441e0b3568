//! Client configuration.
//!
//! Values start from built-in defaults, are replaced by an optional JSON file
//! named in `CLI_CONFIG_FILE`, and finally by `CLI_*` environment variables.
//! A `.env` file in the working directory is loaded first.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchLimits;
use crate::error::{ClientError, Result};
use crate::session::Timeouts;

/// Env var naming an optional JSON config file.
pub const CONFIG_FILE_ENV: &str = "CLI_CONFIG_FILE";

/// Placeholder in `data_path` replaced by the agency id.
const AGENCY_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agency_id: String,
    pub server_address: String,
    pub batch_max_amount: usize,
    pub batch_max_size: usize,
    pub data_path: String,
    pub log_level: String,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub winners_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agency_id: String::new(),
            server_address: "server:12345".to_string(),
            batch_max_amount: 100,
            batch_max_size: 8000,
            data_path: "/.data/agency-{id}.csv".to_string(),
            log_level: "info".to_string(),
            connect_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            winners_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Defaults, then the JSON file named by `CLI_CONFIG_FILE`, then `CLI_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ClientError::Config(format!("invalid config file {}: {}", path.display(), e))
        })
    }

    /// Override fields from `lookup`, which maps `CLI_*` keys to values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLI_ID") {
            self.agency_id = v;
        }
        if let Some(v) = lookup("CLI_SERVER_ADDRESS") {
            self.server_address = v;
        }
        if let Some(v) = lookup("CLI_DATA_PATH") {
            self.data_path = v;
        }
        if let Some(v) = lookup("CLI_LOG_LEVEL") {
            self.log_level = v;
        }
        parse_into(&lookup, "CLI_BATCH_MAXAMOUNT", &mut self.batch_max_amount)?;
        parse_into(&lookup, "CLI_BATCH_MAXSIZE", &mut self.batch_max_size)?;
        parse_into(&lookup, "CLI_CONNECT_TIMEOUT_MS", &mut self.connect_timeout_ms)?;
        parse_into(&lookup, "CLI_WRITE_TIMEOUT_MS", &mut self.write_timeout_ms)?;
        parse_into(&lookup, "CLI_READ_TIMEOUT_MS", &mut self.read_timeout_ms)?;
        parse_into(&lookup, "CLI_WINNERS_TIMEOUT_MS", &mut self.winners_timeout_ms)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.agency_id.trim().is_empty() {
            return Err(ClientError::Config("agency id must be set (CLI_ID)".to_string()));
        }
        if self.server_address.trim().is_empty() {
            return Err(ClientError::Config("server address must be set".to_string()));
        }
        if self.batch_max_amount == 0 {
            return Err(ClientError::Config("batch max amount must be positive".to_string()));
        }
        if self.batch_max_size == 0 {
            return Err(ClientError::Config("batch max size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            write: Duration::from_millis(self.write_timeout_ms),
            read: Duration::from_millis(self.read_timeout_ms),
            winners: Duration::from_millis(self.winners_timeout_ms),
        }
    }

    pub fn limits(&self) -> BatchLimits {
        BatchLimits::new(self.batch_max_size, self.batch_max_amount)
    }

    /// Data file path with `{id}` replaced by the agency id.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(self.data_path.replace(AGENCY_PLACEHOLDER, &self.agency_id))
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("{} = '{}': {}", key, raw, e)))?;
    }
    Ok(())
}
