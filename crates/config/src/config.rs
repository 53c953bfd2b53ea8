use std::path::PathBuf;

use bitcoin::Network;
use serde::{Deserialize, Deserializer};

/// Where the Chain Monitor Task starts scanning: either resume from the
/// persisted cursor (`"last"`) or a non-positive offset from the tip,
/// interpreted per §4.3's edge case as `tip + offset + 1`.
#[derive(Debug, Clone, Copy)]
pub enum StartBlock {
    Last,
    Offset(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStartBlock {
    Keyword(String),
    Offset(i64),
}

impl<'de> Deserialize<'de> for StartBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawStartBlock::deserialize(deserializer)? {
            RawStartBlock::Keyword(s) if s == "last" => Ok(StartBlock::Last),
            RawStartBlock::Keyword(s) => Err(serde::de::Error::custom(format!(
                "start_block: unrecognized keyword {s:?}, expected \"last\""
            ))),
            RawStartBlock::Offset(n) if n <= 0 => Ok(StartBlock::Offset(n)),
            RawStartBlock::Offset(n) => Err(serde::de::Error::custom(format!(
                "start_block: offset must be non-positive, got {n}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitcoindConfig {
    pub url: String,
    pub rpc_user: String,
    pub rpc_password: String,
    pub chain: Network,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
    pub start_block: StartBlock,
    #[serde(default)]
    pub reload_subscriptions: bool,
    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: u64,
    #[serde(default = "default_command_queue_size")]
    pub command_queue_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: std::num::NonZeroUsize,
}

fn default_confirmations() -> u32 {
    3
}

fn default_poll_period_secs() -> u64 {
    5
}

fn default_command_queue_size() -> usize {
    4_000
}

fn default_cache_capacity() -> std::num::NonZeroUsize {
    std::num::NonZeroUsize::new(10_000).unwrap()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_period_secs")]
    pub retry_period_secs: u64,
    #[serde(default = "default_nthreads")]
    pub nthreads: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub recover: bool,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_period_secs() -> u64 {
    120
}

fn default_nthreads() -> usize {
    4
}

fn default_queue_size() -> usize {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub signkey_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bitcoind: BitcoindConfig,
    pub monitor: MonitorConfig,
    pub dispatch: DispatchConfig,
    pub signing: SigningConfig,
    pub store: StoreConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [bitcoind]
            url = "http://localhost:18332"
            rpc_user = "txmon"
            rpc_password = "txmon"
            chain = "regtest"

            [monitor]
            confirmations = 3
            start_block = "last"
            reload_subscriptions = true

            [dispatch]
            retries = 3
            retry_period_secs = 120
            nthreads = 4

            [signing]
            signkey_path = "/path/to/signkey.pem"

            [store]
            database_path = "/path/to/txmon.sqlite3"
        "#;

        let config = toml::from_str::<Config>(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );
    }

    #[test]
    fn test_start_block_offset_must_be_non_positive() {
        let config_string = r#"
            [bitcoind]
            url = "http://localhost:18332"
            rpc_user = "txmon"
            rpc_password = "txmon"
            chain = "regtest"

            [monitor]
            start_block = 5

            [dispatch]

            [signing]
            signkey_path = "/path/to/signkey.pem"

            [store]
            database_path = "/path/to/txmon.sqlite3"
        "#;

        assert!(toml::from_str::<Config>(config_string).is_err());
    }
}
