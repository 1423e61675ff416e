//! Indicator actor
//!
//! `update` frames carry an air-quality index; the LED is lit while the
//! index is above [`AQI_THRESHOLD`]. A `status` ask is answered with the
//! current level.

use crate::led::Led;
use ditto_actors::{Actor, ActorError, Context, Envelope, Transition};
use network::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const AQI_THRESHOLD: f64 = 100.0;
pub const DEFAULT_THING_ID: &str = "org.i2ec:led-indicator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AqiUpdate {
    pub aqi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub led: LedState,
}

fn switch(led: &Arc<Led>, on: bool, target: LedState) -> Transition<LedState> {
    let led = Arc::clone(led);
    Transition::new("update")
        .typed_guard(move |update: &AqiUpdate| (update.aqi > AQI_THRESHOLD) == on)
        .to(target)
        .handler(move |ctx: Context, _envelope: Envelope| {
            let led = Arc::clone(&led);
            async move {
                ctx.call(&*led, on).await?;
                Ok::<(), ActorError>(())
            }
        })
}

/// Build the indicator actor around `led`
pub fn indicator(id: impl Into<String>, connection: Arc<dyn Connection>, led: Arc<Led>) -> Actor<LedState> {
    let mut actor = Actor::new(id, connection, LedState::Off);

    actor.add_transitions([
        switch(&led, true, LedState::On),
        switch(&led, false, LedState::Off),
    ]);

    let status_led = Arc::clone(&led);
    actor.add_transition(
        Transition::new("status")
            .guard(|envelope: &Envelope| envelope.topic == "status" && envelope.corr_id().is_some())
            .handler(move |ctx: Context, envelope: Envelope| {
                let level = if status_led.is_on() { LedState::On } else { LedState::Off };
                async move { ctx.respond(&envelope, StatusReply { led: level }, None).await }
            }),
    );

    actor
}
