use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::env::expand_env;
use crate::export::allowlist::AllowlistRuleConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {0} is required but not set")]
    MissingEnv(String),
}

#[derive(Debug, Deserialize)]
pub struct IndexerConfig {
    /// Resolved from the node or the indexer state row when absent.
    #[serde(default)]
    pub chain_id: Option<String>,
    pub bech32_prefix: String,
    pub rpc_endpoint: String,
    pub database_url: String,
    pub trace_pipe: PathBuf,
    #[serde(default)]
    pub send_webhooks: bool,
    #[serde(default = "default_batch_size")]
    pub export_batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub rpc_requests_per_second: Option<u32>,
    /// Chain id → allowlist rules.
    #[serde(default)]
    pub state_event_allowlist: HashMap<String, Vec<AllowlistRuleConfig>>,
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_ms() -> u64 {
    500
}

impl IndexerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let mut value: JsonValue = serde_json::from_str(content)?;
        expand_env(&mut value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn allowlist_for_chain(&self, chain_id: &str) -> &[AllowlistRuleConfig] {
        self.state_event_allowlist
            .get(chain_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        std::env::set_var("CW_TRACE_TEST_DB", "postgres://indexer@localhost/indexer");

        let config = IndexerConfig::from_json_str(
            r#"{
                "chain_id": "osmosis-1",
                "bech32_prefix": "osmo",
                "rpc_endpoint": "http://localhost:26657",
                "database_url": "env:CW_TRACE_TEST_DB",
                "trace_pipe": "/tmp/trace.pipe",
                "send_webhooks": true,
                "state_event_allowlist": {
                    "osmosis-1": [
                        {"code_ids_keys": ["cl-vault"], "state_keys": ["contract_info"]}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.chain_id.as_deref(), Some("osmosis-1"));
        assert_eq!(config.database_url, "postgres://indexer@localhost/indexer");
        assert!(config.send_webhooks);
        assert_eq!(config.export_batch_size, 1000);
        assert_eq!(config.flush_interval_ms, 500);
        assert_eq!(config.allowlist_for_chain("osmosis-1").len(), 1);
        assert!(config.allowlist_for_chain("juno-1").is_empty());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = IndexerConfig::from_json_str(
            r#"{
                "bech32_prefix": "juno",
                "rpc_endpoint": "http://localhost:26657",
                "database_url": "postgres://localhost/indexer",
                "trace_pipe": "/tmp/trace.pipe"
            }"#,
        )
        .unwrap();

        assert!(config.chain_id.is_none());
        assert!(!config.send_webhooks);
        assert!(config.rpc_requests_per_second.is_none());
        assert!(config.state_event_allowlist.is_empty());
    }
}
