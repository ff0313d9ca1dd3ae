//! Tick kernel: fixed-timestep accumulation, bracket state machines, scoped
//! time windows and arenas, and the authoritative server driver.
//!
//! # Invariants
//! - Every scope opened by a driver is closed before the frame ends.
//! - Batches in one frame never exceed `max_batch_length` ticks; excess time
//!   is dropped rather than carried.
//! - All driver decisions are recorded in the world's event log.

pub mod arena;
pub mod scope;
pub mod server;
pub mod step;
pub mod strategy;
pub mod validate;
pub mod world;

pub use arena::{DoubleRewindArena, RewindArena, WORLD_ARENA};
pub use scope::{ArenaSwapper, ArenaToken, RecordingHost, ScopeError, ScopeHost, TimeWindow};
pub use server::ServerTickDriver;
pub use step::{FixedStepAccumulator, StepCount, compute_steps, peek_steps};
pub use strategy::{Bracket, BracketHooks, BracketMode};
pub use world::{DriverKind, Invocation, SkipReason, TickEvent, TickWorld};

pub fn crate_info() -> &'static str {
    "netstep-kernel v0.1.0"
}
