use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for a Solr core or collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolrConfig {
    /// Base Solr URL, e.g. `http://localhost:8983/solr`.
    pub url: String,
    /// Core or collection name queries are issued against.
    pub collection: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr".to_string(),
            collection: String::new(),
            timeout_secs: 30,
        }
    }
}

impl SolrConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `~/.config/solrkit/config.toml`, then apply
    /// `SOLR_URL` / `SOLR_COLLECTION` / `SOLR_TIMEOUT_SECS` environment
    /// overrides. Returns defaults if the file is missing or unparseable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to parse config at {}: {e}; using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "no config file at {}; using defaults",
                    config_path.display()
                );
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SOLR_URL") {
            self.url = url;
        }
        if let Ok(collection) = std::env::var("SOLR_COLLECTION") {
            self.collection = collection;
        }
        if let Ok(timeout) = std::env::var("SOLR_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => tracing::warn!("ignoring non-numeric SOLR_TIMEOUT_SECS: {timeout}"),
            }
        }
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("solrkit").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
