//! Fixed-timestep accumulator.
//!
//! Converts elapsed real time into a plan of whole simulation steps. When a
//! frame owes more steps than `max_steps`, the steps are merged into at most
//! `max_steps` batches of `length_long_steps` ticks, with the last
//! `short_step_count` batches one tick shorter. If even that exceeds
//! `max_batch_length`, the plan is clamped and the missing ticks are dropped:
//! the simulation falls behind instead of spiraling.

use netstep_common::TickRateConfig;
use serde::{Deserialize, Serialize};

/// One frame's step plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCount {
    /// Invocations to run this frame.
    pub total_steps: u32,
    /// How many of those invocations use `length_long_steps - 1` ticks.
    pub short_step_count: u32,
    /// Ticks covered by a long invocation.
    pub length_long_steps: u32,
}

impl Default for StepCount {
    fn default() -> Self {
        Self {
            total_steps: 0,
            short_step_count: 0,
            length_long_steps: 1,
        }
    }
}

impl StepCount {
    /// Total ticks the plan advances the simulation by.
    pub fn ticks(&self) -> u64 {
        u64::from(self.total_steps) * u64::from(self.length_long_steps)
            - u64::from(self.short_step_count)
    }

    /// Per-invocation batch lengths in execution order: long batches first.
    pub fn batch_lengths(&self) -> impl Iterator<Item = u32> + '_ {
        let long = self.total_steps - self.short_step_count;
        (0..self.total_steps).map(move |i| {
            if i < long {
                self.length_long_steps
            } else {
                self.length_long_steps - 1
            }
        })
    }
}

/// Compute this frame's step plan, consuming whole ticks from `residual`.
///
/// `max_steps` and `max_batch_length` below 1 are treated as 1. Non-finite or
/// negative `delta_time` contributes nothing; a non-positive
/// `fixed_time_step` yields an empty plan and leaves `residual` untouched.
pub fn compute_steps(
    delta_time: f64,
    fixed_time_step: f64,
    max_steps: i32,
    max_batch_length: i32,
    residual: &mut f64,
) -> StepCount {
    if !(fixed_time_step.is_finite() && fixed_time_step > 0.0) {
        tracing::debug!(fixed_time_step, "ignoring frame with unusable time step");
        return StepCount::default();
    }
    let max_steps = max_steps.max(1) as u64;
    let max_batch_length = max_batch_length.max(1) as u64;

    if delta_time.is_finite() && delta_time > 0.0 {
        *residual += delta_time;
    }
    let whole = (*residual / fixed_time_step).floor().max(0.0) as u64;
    *residual %= fixed_time_step;

    if whole <= max_steps {
        return StepCount {
            total_steps: whole as u32,
            short_step_count: 0,
            length_long_steps: 1,
        };
    }

    let length = whole.div_ceil(max_steps);
    if length > max_batch_length {
        let dropped = whole - max_steps * max_batch_length;
        tracing::debug!(whole, dropped, "catch-up clamped, simulation falls behind");
        return StepCount {
            total_steps: max_steps as u32,
            short_step_count: 0,
            length_long_steps: max_batch_length as u32,
        };
    }
    StepCount {
        total_steps: max_steps as u32,
        short_step_count: (length * max_steps - whole) as u32,
        length_long_steps: length as u32,
    }
}

/// Read-only variant of [`compute_steps`]: works on a copy of `residual`.
pub fn peek_steps(
    delta_time: f64,
    fixed_time_step: f64,
    max_steps: i32,
    max_batch_length: i32,
    residual: f64,
) -> StepCount {
    let mut scratch = residual;
    compute_steps(
        delta_time,
        fixed_time_step,
        max_steps,
        max_batch_length,
        &mut scratch,
    )
}

/// Owns the residual time carried between frames.
#[derive(Debug, Clone, Default)]
pub struct FixedStepAccumulator {
    residual: f64,
}

impl FixedStepAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds carried over that have not yet formed a whole tick.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    pub fn reset(&mut self) {
        self.residual = 0.0;
    }

    /// Consume `delta_time` and produce the frame's plan.
    pub fn advance(&mut self, delta_time: f64, config: &TickRateConfig) -> StepCount {
        compute_steps(
            delta_time,
            config.fixed_time_step,
            config.max_steps_per_frame,
            config.max_batch_length,
            &mut self.residual,
        )
    }

    /// The plan `advance` would produce, without consuming anything.
    pub fn peek(&self, delta_time: f64, config: &TickRateConfig) -> StepCount {
        peek_steps(
            delta_time,
            config.fixed_time_step,
            config.max_steps_per_frame,
            config.max_batch_length,
            self.residual,
        )
    }
}
