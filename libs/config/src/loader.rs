//! Layered loading
//!
//! Serde defaults, then an optional TOML file, then environment variables
//! (`<PREFIX>_FIELD`, nested keys separated by `__`).

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix used by the default loaders
pub const ENV_PREFIX: &str = "DITTO";

/// Keys whose environment values are comma-separated lists
const LIST_KEYS: &[&str] = &["handshake_frames"];

/// Build `T` from an optional file and prefixed environment variables
pub fn load_layered<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        info!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    } else {
        debug!("No configuration file given, using defaults and environment");
    }

    let mut environment = Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .try_parsing(true);
    for key in LIST_KEYS {
        environment = environment.with_list_parse_key(key);
    }
    builder = builder.add_source(environment);

    let config = builder.build().context("Failed to build configuration")?;
    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Expand `$VAR` / `${VAR}` references (credentials in bus URLs)
pub fn expand_env(value: &str) -> Result<String> {
    let expanded = shellexpand::env(value)
        .with_context(|| format!("Failed to expand environment variables in '{value}'"))?;
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct Sample {
        name: String,
        retries: u32,
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_layered::<Sample>(Some(&missing), "DITTO_LOADER_MISSING").is_err());
    }

    #[test]
    fn test_file_values_are_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        fs::write(&path, "name = \"relay\"\nretries = 3\n").unwrap();

        let sample: Sample = load_layered(Some(&path), "DITTO_LOADER_FILE").unwrap();
        assert_eq!(sample.name, "relay");
        assert_eq!(sample.retries, 3);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        fs::write(&path, "name = \"relay\"\nretries = 3\n").unwrap();

        std::env::set_var("DITTO_LOADER_ENV_RETRIES", "9");
        let sample: Sample = load_layered(Some(&path), "DITTO_LOADER_ENV").unwrap();
        std::env::remove_var("DITTO_LOADER_ENV_RETRIES");

        assert_eq!(sample.name, "relay");
        assert_eq!(sample.retries, 9);
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("DITTO_LOADER_EXPAND_USER", "ditto");
        let url = expand_env("ws://${DITTO_LOADER_EXPAND_USER}@localhost/ws/2").unwrap();
        std::env::remove_var("DITTO_LOADER_EXPAND_USER");
        assert_eq!(url, "ws://ditto@localhost/ws/2");

        assert!(expand_env("ws://${DITTO_LOADER_EXPAND_UNSET_VAR}/").is_err());
    }
}
