//! Configuration for the relay service

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::loader::{load_layered, ENV_PREFIX};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_address: String,
    pub log_level: String,
    /// Larger inbound frames are dropped
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl RelayConfig {
    /// Layered values under `env_prefix`, not yet validated
    pub fn layered(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        load_layered(path, env_prefix)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.max_frame_bytes == 0 {
            bail!("max_frame_bytes must be greater than zero");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("Invalid bind_address '{}'", self.bind_address))
    }
}

/// Layered [`RelayConfig`] from an optional file plus `DITTO_*` variables.
/// Apply command-line overrides, then call [`RelayConfig::validate`].
pub fn load_relay_config(path: Option<&Path>) -> Result<RelayConfig> {
    RelayConfig::layered(path, ENV_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn test_rejects_bad_bind_address() {
        let config = RelayConfig {
            bind_address: "localhost".to_string(),
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "bind_address = \"127.0.0.1:9100\"\n").unwrap();

        let config = RelayConfig::layered(Some(&path), "DITTO_RELAY_FILE").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address, "127.0.0.1:9100");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_environment_only() {
        std::env::set_var("DITTO_RELAY_ENV_MAX_FRAME_BYTES", "4096");
        let config = RelayConfig::layered(None, "DITTO_RELAY_ENV").unwrap();
        std::env::remove_var("DITTO_RELAY_ENV_MAX_FRAME_BYTES");
        assert_eq!(config.max_frame_bytes, 4096);
    }
}
