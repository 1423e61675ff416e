//! WebSocket relay for actor envelopes
//!
//! Clients connect at `/ws/{namespace}/{name}` and are registered as
//! `namespace:name`. Every text frame is forwarded to the client named in
//! its `to` field. Unknown destinations are dead letters.

pub mod path;
pub mod server;

pub use path::client_identity;
pub use server::RelayServer;
