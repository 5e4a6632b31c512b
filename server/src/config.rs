//! `KEY=VALUE` server configuration.
//!
//! Keys are upper-cased on load, so `port=9000` and `PORT=9000` are the
//! same setting. Lines without `=` and `#` comments are skipped.

use crate::error::{Result, ServerError};
use log::info;
use serde::de::value::{Error as ValueError, MapDeserializer};
use serde::{de, Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "server.config";
pub const DEFAULT_DB_FILE: &str = ".db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ServerConfig {
    pub host: String,
    #[serde(deserialize_with = "parse_value")]
    pub port: u16,
    #[serde(rename = "MAXCLIENTS", deserialize_with = "parse_value")]
    pub max_clients: usize,
    #[serde(rename = "GAMESESSIONS", deserialize_with = "parse_value")]
    pub game_sessions: usize,
    #[serde(rename = "DBFILE", default = "default_db_file")]
    pub db_file: PathBuf,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Start reading the config {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ServerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        info!("Config loaded: {:?}", config);
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let pairs = parse_pairs(contents);
        let deserializer = MapDeserializer::<_, ValueError>::new(pairs.into_iter());
        let config =
            Self::deserialize(deserializer).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `host:port` for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(ServerError::Config("MAXCLIENTS must be at least 1".into()));
        }
        if self.game_sessions == 0 {
            return Err(ServerError::Config("GAMESESSIONS must be at least 1".into()));
        }
        Ok(())
    }
}

/// Splits `KEY=VALUE` lines on the first `=`. Later keys win.
pub fn parse_pairs(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_uppercase(), value.trim().to_string()))
        .collect()
}

fn default_db_file() -> PathBuf {
    PathBuf::from(DEFAULT_DB_FILE)
}

fn parse_value<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse()
        .map_err(|e| de::Error::custom(format!("`{}`: {}", raw, e)))
}
