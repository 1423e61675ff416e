//! Network Infrastructure
//!
//! Connection boundary for the actor runtime. Actors talk to the message bus
//! through the [`Connection`] trait; this crate provides a WebSocket client,
//! an in-process bus for tests and single-process deployments, and the
//! addressed [`Hub`] that the relay service forwards through.

pub mod connection;
pub mod error;
pub mod hub;
pub mod local;
pub mod test_utils;
pub mod websocket;

pub use connection::{Connection, InboundFrames};
pub use error::{ConnectionError, Result};
pub use hub::{Delivery, Hub, HubStats};
pub use local::{LocalBus, LocalConnection};
pub use websocket::{WebSocketConnection, DEFAULT_CONNECT_TIMEOUT};
