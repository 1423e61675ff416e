//! In-process bus
//!
//! Connections attached to a shared [`Hub`], so actors living in one
//! process exchange frames without a socket. Same forwarding rules as the
//! relay service: by `to`, best effort.

use crate::connection::{Connection, InboundFrames, InboundSlot};
use crate::hub::{Delivery, Hub};
use crate::{ConnectionError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Factory for in-process connections sharing one hub
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    hub: Arc<Hub>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connection that will register as `name` on `start()`
    pub fn connect(&self, name: impl Into<String>) -> LocalConnection {
        let name = name.into();
        LocalConnection {
            inbound: InboundSlot::new(name.clone()),
            name,
            hub: Arc::clone(&self.hub),
            open: AtomicBool::new(false),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

/// One endpoint on a [`LocalBus`]
#[derive(Debug)]
pub struct LocalConnection {
    name: String,
    hub: Arc<Hub>,
    inbound: InboundSlot,
    open: AtomicBool,
}

impl LocalConnection {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn start(&self) -> Result<()> {
        if !self.open.swap(true, Ordering::Relaxed) {
            self.hub.attach(self.name.clone(), self.inbound.sender());
        }
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        if !self.is_open() {
            return Err(ConnectionError::closed(&self.name));
        }
        if let Delivery::DeadLetter { to } = self.hub.forward(&frame)? {
            debug!(from = %self.name, to = %to, "Frame not delivered");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::Relaxed) {
            self.hub.detach(&self.name, &self.inbound.sender());
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<InboundFrames> {
        self.inbound.take()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
