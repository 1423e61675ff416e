//! Air-quality LED indicator

pub mod indicator;
pub mod led;

pub use indicator::{indicator, AqiUpdate, LedState, StatusReply, AQI_THRESHOLD, DEFAULT_THING_ID};
pub use led::Led;
