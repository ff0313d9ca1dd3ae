//! Client-side prediction: rollback scheduling for predicted entities and
//! presentation time for per-frame systems.
//!
//! # Invariants
//! - Replayed ticks within a burst are strictly ascending and the burst ends
//!   on the confirmed tick and fraction.
//! - Exactly one invocation per burst is flagged final.
//! - The replay budget switches from repeat to first-time at most once per
//!   burst, on reaching the last fully predicted tick.

pub mod ghost;
pub mod history;
pub mod prediction;
pub mod presentation;

pub use ghost::{GhostError, GhostRegistry, PredictedGhost, SimulationEligibility};
pub use history::{AppliedTickSet, RollbackHistory, TickSet, UniqueInputTickSet};
pub use prediction::{ClientPredictionScheduler, PredictionCx};
pub use presentation::{ClientPresentationTimeDriver, clamp_partial_tick};
