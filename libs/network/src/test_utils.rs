use crate::connection::{Connection, InboundFrames, InboundSlot};
use crate::{ConnectionError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// A connection that records outbound frames and lets tests inject inbound
/// ones
#[derive(Debug)]
pub struct RecordingConnection {
    name: String,
    sent: Mutex<Vec<String>>,
    sent_notify: Notify,
    inbound: InboundSlot,
    inbound_tx: mpsc::UnboundedSender<String>,
    started: AtomicBool,
    closed: AtomicBool,
    fail_on_start: AtomicBool,
    fail_on_send: AtomicBool,
    sends_failed: AtomicU64,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::with_name("test-recorder")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let inbound = InboundSlot::new(name.clone());
        let inbound_tx = inbound.sender();
        Self {
            name,
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            inbound,
            inbound_tx,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_on_start: AtomicBool::new(false),
            fail_on_send: AtomicBool::new(false),
            sends_failed: AtomicU64::new(0),
        }
    }

    /// Deliver a frame as if it arrived from the bus
    pub fn inject(&self, frame: impl Into<String>) {
        // Receiver may already be gone after the actor stopped
        let _ = self.inbound_tx.send(frame.into());
    }

    /// Deliver a JSON value as a frame
    pub fn inject_json(&self, value: &serde_json::Value) {
        self.inject(value.to_string());
    }

    /// All frames sent so far
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Sent frames decoded as JSON; undecodable frames are skipped
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Wait until at least `count` frames were sent, or `timeout` elapses.
    /// Returns whether the count was reached.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.sent_notify.notified();
                if self.sent_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Configure the next `start()` to fail
    pub fn fail_next_start(&self) {
        self.fail_on_start.store(true, Ordering::Relaxed);
    }

    /// Configure the next `send()` to fail
    pub fn fail_next_send(&self) {
        self.fail_on_send.store(true, Ordering::Relaxed);
    }

    pub fn sends_failed(&self) -> u64 {
        self.sends_failed.load(Ordering::Relaxed)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn start(&self) -> Result<()> {
        if self.fail_on_start.swap(false, Ordering::Relaxed) {
            return Err(ConnectionError::handshake(&self.name, "Simulated handshake failure"));
        }
        self.started.store(true, Ordering::Relaxed);
        self.closed.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        if !self.is_started() || self.is_closed() {
            self.sends_failed.fetch_add(1, Ordering::Relaxed);
            return Err(ConnectionError::closed(&self.name));
        }
        if self.fail_on_send.swap(false, Ordering::Relaxed) {
            self.sends_failed.fetch_add(1, Ordering::Relaxed);
            return Err(ConnectionError::send("Simulated send failure"));
        }
        self.sent.lock().push(frame);
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> Result<InboundFrames> {
        self.inbound.take()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
