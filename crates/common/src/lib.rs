//! Shared types for the tick scheduler: tick ids, the network time record and
//! tick-rate configuration.
//!
//! # Invariants
//! - Tick ordering is always relative (`ticks_since`), never absolute.
//! - `server_tick_fraction` stays in `(0, 1]`.

pub mod config;
pub mod tick;
pub mod time;
pub mod types;

pub use config::{ConfigError, FrameRateMode, TickRateConfig};
pub use tick::{ConfirmedTick, NetworkTick};
pub use time::{NetworkTime, NetworkTimeFlags};
pub use types::{EntityId, FrameTime};
