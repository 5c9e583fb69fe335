//! Explorer configuration: file plus `EXPLORER_*` environment overrides

use crate::error::Result;
use block_indexer::IndexerConfig;
use config::{Config, Environment, File};
use ledger_store::DatabaseConfig;
use node_rpc::NodeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "EXPLORER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub explorer: ExplorerSettings,
}

impl ExplorerConfig {
    /// Load defaults, then the optional TOML file at `path`, then the environment.
    ///
    /// Nested keys use `__`, e.g. `EXPLORER_NODE__HOST` or `EXPLORER_INDEXER__POLL_INTERVAL_SECONDS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Presentation-independent knobs of the read side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerSettings {
    #[serde(default = "default_coin_name")]
    pub coin_name: String,

    #[serde(default = "default_coin_ticker")]
    pub coin_ticker: String,

    /// A search query starting with one of these is taken as an address.
    #[serde(default = "default_address_prefixes")]
    pub address_prefixes: Vec<String>,

    #[serde(default = "default_history_page_size")]
    pub history_page_size: u64,

    #[serde(default = "default_blocks_per_page")]
    pub blocks_per_page: u64,

    #[serde(default = "default_recent_block_count")]
    pub recent_block_count: u64,

    #[serde(default = "default_mempool_limit")]
    pub mempool_limit: usize,
}

fn default_coin_name() -> String {
    "Nyancoin".to_string()
}

fn default_coin_ticker() -> String {
    "NYAN".to_string()
}

fn default_address_prefixes() -> Vec<String> {
    vec!["N".to_string()]
}

fn default_history_page_size() -> u64 {
    20
}

fn default_blocks_per_page() -> u64 {
    10
}

fn default_recent_block_count() -> u64 {
    5
}

fn default_mempool_limit() -> usize {
    10
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            coin_name: default_coin_name(),
            coin_ticker: default_coin_ticker(),
            address_prefixes: default_address_prefixes(),
            history_page_size: default_history_page_size(),
            blocks_per_page: default_blocks_per_page(),
            recent_block_count: default_recent_block_count(),
            mempool_limit: default_mempool_limit(),
        }
    }
}

impl ExplorerSettings {
    pub fn looks_like_address(&self, query: &str) -> bool {
        !query.is_empty()
            && self
                .address_prefixes
                .iter()
                .any(|prefix| query.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.node.port, 33751);
        assert_eq!(config.indexer.poll_interval_seconds, 10);
        assert_eq!(config.explorer.history_page_size, 20);
        assert!(config.explorer.looks_like_address("NKx9"));
        assert!(!config.explorer.looks_like_address("Kx9"));
        assert!(!config.explorer.looks_like_address(""));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("explorer-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[node]
host = "10.0.0.5"
user = "rpc"
password = "secret"

[database]
sqlite_path = ":memory:"

[indexer]
max_fetch_attempts = 5

[explorer]
coin_name = "Dogecoin"
address_prefixes = ["D", "A"]
"#
        )
        .unwrap();

        let config = ExplorerConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.node.host, "10.0.0.5");
        assert_eq!(config.node.port, 33751);
        assert_eq!(config.node.user.as_deref(), Some("rpc"));
        assert!(config.database.is_in_memory());
        assert_eq!(config.indexer.max_fetch_attempts, 5);
        assert_eq!(config.indexer.retry_delay_ms, 5000);
        assert_eq!(config.explorer.coin_name, "Dogecoin");
        assert!(config.explorer.looks_like_address("A1b2"));
        assert_eq!(config.explorer.mempool_limit, 10);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("explorer-config-does-not-exist.toml");
        assert!(ExplorerConfig::load(Some(&missing)).is_err());
    }
}
