//! LED output
//!
//! Stands in for a GPIO pin: the level is kept in memory and logged.

use async_trait::async_trait;
use ditto_actors::{Capacity, CapacityError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug)]
pub struct Led {
    name: String,
    level: AtomicBool,
    present: AtomicBool,
}

impl Led {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: AtomicBool::new(false),
            present: AtomicBool::new(true),
        }
    }

    pub fn is_on(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }

    /// Simulate the pin going away (or coming back)
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::Relaxed);
    }
}

#[async_trait]
impl Capacity for Led {
    type Input = bool;
    type Output = bool;

    fn name(&self) -> &str {
        &self.name
    }

    fn pre_check(&self) -> bool {
        self.present.load(Ordering::Relaxed)
    }

    /// Drive the pin; returns the previous level
    async fn handle(&self, on: bool) -> Result<bool, CapacityError> {
        let previous = self.level.swap(on, Ordering::Relaxed);
        info!(led = %self.name, level = if on { "on" } else { "off" }, "LED set");
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_switches_level() {
        let led = Led::new("status-led");
        assert!(!led.is_on());
        assert!(!led.handle(true).await.unwrap());
        assert!(led.is_on());
        assert!(led.handle(false).await.unwrap());
        assert!(!led.is_on());
    }

    #[test]
    fn test_presence_drives_pre_check() {
        let led = Led::new("status-led");
        assert!(led.pre_check());
        led.set_present(false);
        assert!(!led.pre_check());
    }
}
