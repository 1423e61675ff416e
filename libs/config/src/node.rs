//! Configuration for one actor process

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::loader::{expand_env, load_layered, ENV_PREFIX};

/// Connection and timing settings for an actor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Actor identity, e.g. `org.i2ec:air-quality-led`
    pub thing_id: String,
    /// Bus endpoint; `$VAR` references are expanded on load
    pub url: String,
    pub ask_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Text frames sent right after the handshake
    pub handshake_frames: Vec<String>,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            thing_id: String::new(),
            url: "ws://localhost:8080/ws/2".to_string(),
            ask_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            handshake_frames: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Layered values under `env_prefix`, before [`NodeConfig::resolve`]
    pub fn layered(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        load_layered(path, env_prefix)
    }

    /// Expand environment references in the URL, then validate
    pub fn resolve(mut self) -> Result<Self> {
        self.url = expand_env(&self.url)?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thing_id.trim().is_empty() {
            bail!("thing_id must not be empty");
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            bail!("url must use ws:// or wss://, got '{}'", self.url);
        }
        if self.ask_timeout_ms == 0 {
            bail!("ask_timeout_ms must be greater than zero");
        }
        if self.connect_timeout_ms == 0 {
            bail!("connect_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Render as TOML, e.g. for `--print-config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize node configuration")
    }
}

/// Layered [`NodeConfig`] from an optional file plus `DITTO_*` variables.
/// Apply command-line overrides, then call [`NodeConfig::resolve`].
pub fn load_node_config(path: Option<&Path>) -> Result<NodeConfig> {
    NodeConfig::layered(path, ENV_PREFIX)
}
