//! Connection boundary consumed by actors
//!
//! A connection carries UTF-8 text frames to and from the message bus. It
//! is exclusively owned by one actor; inbound frames are handed out as a
//! single ordered stream.

use crate::{ConnectionError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use tokio::sync::mpsc;

/// Ordered stream of inbound text frames
pub type InboundFrames = mpsc::UnboundedReceiver<String>;

/// Text-frame connection to the message bus
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Perform the handshake. Fails without retrying.
    async fn start(&self) -> Result<()>;

    /// Send one text frame
    async fn send(&self, frame: String) -> Result<()>;

    /// Close the connection; closing twice is a no-op
    async fn close(&self) -> Result<()>;

    /// Take the inbound frame stream. Only the first call succeeds.
    fn subscribe(&self) -> Result<InboundFrames>;

    /// Name used in log fields
    fn name(&self) -> &str;
}

/// Holds the receiving half of an inbound channel until someone subscribes
#[derive(Debug)]
pub(crate) struct InboundSlot {
    name: String,
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<Option<InboundFrames>>,
}

impl InboundSlot {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.sender.clone()
    }

    pub(crate) fn take(&self) -> Result<InboundFrames> {
        self.receiver
            .lock()
            .take()
            .ok_or_else(|| ConnectionError::AlreadySubscribed(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_hands_out_receiver_once() {
        let slot = InboundSlot::new("actor-a");
        assert!(slot.take().is_ok());
        assert!(matches!(
            slot.take(),
            Err(ConnectionError::AlreadySubscribed(name)) if name == "actor-a"
        ));
    }

    #[tokio::test]
    async fn test_slot_preserves_order() {
        let slot = InboundSlot::new("actor-a");
        let tx = slot.sender();
        let mut rx = slot.take().unwrap();

        for i in 0..5 {
            tx.send(format!("frame-{i}")).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), format!("frame-{i}"));
        }
    }
}
