//! Addressed forwarding hub
//!
//! Maps an actor identity to the outbound channel of the client that
//! registered it. Frames are parsed only far enough to read `to`; the body
//! is forwarded untouched. Delivery is best effort: an unknown or
//! disconnected destination is a dead letter.

use crate::{ConnectionError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outcome of forwarding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the client registered under `to`
    Delivered { to: String },
    /// Nobody registered under `to`
    DeadLetter { to: String },
}

/// Hub counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub clients: usize,
    pub forwarded: u64,
    pub dead_letters: u64,
    pub rejected: u64,
}

/// Identity → client channel table
#[derive(Debug, Default)]
pub struct Hub {
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
    forwarded: AtomicU64,
    dead_letters: AtomicU64,
    rejected: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. A previous client with the same identity is
    /// replaced.
    pub fn attach(&self, name: impl Into<String>, sender: mpsc::UnboundedSender<String>) {
        let name = name.into();
        if self.clients.write().insert(name.clone(), sender).is_some() {
            debug!(client = %name, "Replaced existing client registration");
        } else {
            debug!(client = %name, "Client attached");
        }
    }

    /// Remove a client, but only if `sender` is still the registered channel
    /// for that identity. Returns whether an entry was removed.
    pub fn detach(&self, name: &str, sender: &mpsc::UnboundedSender<String>) -> bool {
        let mut clients = self.clients.write();
        match clients.get(name) {
            Some(current) if current.same_channel(sender) => {
                clients.remove(name);
                debug!(client = %name, "Client detached");
                true
            }
            _ => false,
        }
    }

    /// Forward one frame to the client named by its `to` field
    pub fn forward(&self, frame: &str) -> Result<Delivery> {
        let to = match destination(frame) {
            Some(to) => to,
            None => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(ConnectionError::unroutable("Message has no destination"));
            }
        };

        let sender = self.clients.read().get(&to).cloned();
        match sender {
            Some(sender) if sender.send(frame.to_string()).is_ok() => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                trace!(to = %to, "Frame forwarded");
                Ok(Delivery::Delivered { to })
            }
            Some(sender) => {
                // Receiver is gone; drop the stale registration
                self.detach(&to, &sender);
                self.dead_letters.fetch_add(1, Ordering::Relaxed);
                debug!(to = %to, "Received dead letter (client disconnected)");
                Ok(Delivery::DeadLetter { to })
            }
            None => {
                self.dead_letters.fetch_add(1, Ordering::Relaxed);
                debug!(to = %to, "Received dead letter");
                Ok(Delivery::DeadLetter { to })
            }
        }
    }

    /// Registered identities
    pub fn clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.read().contains_key(name)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            clients: self.clients.read().len(),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Read the `to` field of a frame without decoding the rest of the schema
fn destination(frame: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(frame).ok()?;
    match value.get("to")?.as_str()? {
        "" => None,
        to => Some(to.to_string()),
    }
}
