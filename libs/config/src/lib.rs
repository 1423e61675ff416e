//! Layered configuration for actor nodes and the relay
//!
//! Values come from serde defaults, then an optional TOML file, then
//! `DITTO_*` environment variables.

pub mod loader;
pub mod node;
pub mod relay;

pub use loader::{expand_env, load_layered, ENV_PREFIX};
pub use node::{load_node_config, NodeConfig};
pub use relay::{load_relay_config, RelayConfig, DEFAULT_MAX_FRAME_BYTES};
