//! Client-side rollback scheduler.
//!
//! Once per frame, after authoritative snapshots have been applied, the
//! scheduler decides which past ticks must be re-simulated to bring predicted
//! entities from their snapshot ticks up to the confirmed tick:
//!
//! 1. Ticks with applied state, the last fully predicted tick and the tick
//!    before every new input become replay points.
//! 2. Replay points are sorted oldest first; each invocation advances from one
//!    point to the next in a single batch, split when the batch would exceed
//!    the active budget.
//! 3. Replaying ticks that were already predicted uses
//!    `max_batch_size_repeat`; from the last fully predicted tick onwards the
//!    budget is `max_batch_size_first_time`.
//! 4. A fractional confirmed tick is replayed up to the whole tick before it,
//!    then finished by one partial invocation.

use crate::ghost::SimulationEligibility;
use crate::history::RollbackHistory;
use netstep_common::{ConfirmedTick, NetworkTick, NetworkTimeFlags};
use netstep_kernel::{
    Bracket, BracketHooks, DriverKind, Invocation, ScopeHost, SkipReason, TickEvent, TickWorld,
    TimeWindow,
};

/// Everything a prediction invocation can touch.
pub struct PredictionCx<'w, H, G> {
    pub world: &'w mut TickWorld<H>,
    pub ghosts: &'w mut G,
}

/// Bracket hooks for one frame's rollback burst.
#[derive(Debug)]
pub struct PredictionHooks {
    history: RollbackHistory,
    last_full: NetworkTick,
    ticks: Vec<NetworkTick>,
    cursor: usize,
    confirmed: ConfirmedTick,
    target: NetworkTick,
    baseline: f64,
    budget: u32,
    partial_done: bool,
    saved_batch_size: u32,
    invocations: u32,
    finals: u32,
}

impl Default for PredictionHooks {
    fn default() -> Self {
        Self {
            history: RollbackHistory::new(),
            last_full: NetworkTick::INVALID,
            ticks: Vec::new(),
            cursor: 0,
            confirmed: ConfirmedTick::INVALID,
            target: NetworkTick::INVALID,
            baseline: 0.0,
            budget: 1,
            partial_done: false,
            saved_batch_size: 1,
            invocations: 0,
            finals: 0,
        }
    }
}

impl PredictionHooks {
    fn skip<H: ScopeHost>(world: &mut TickWorld<H>, reason: SkipReason) {
        tracing::debug!(?reason, "prediction skipped");
        world.record(TickEvent::Skipped {
            driver: DriverKind::Prediction,
            reason,
        });
    }

    fn has_partial_step(&self) -> bool {
        self.confirmed.is_partial() && !self.partial_done
    }

    /// Burst setup. Returns the replay points, oldest first, or `None` when
    /// there is nothing to run.
    fn plan<H: ScopeHost, G: SimulationEligibility>(
        &mut self,
        cx: &mut PredictionCx<'_, H, G>,
    ) -> Option<Vec<NetworkTick>> {
        let confirmed = cx.world.confirmed();
        if !confirmed.is_valid() {
            Self::skip(cx.world, SkipReason::NoConfirmedTick);
            return None;
        }
        let config = cx.world.config();
        let fixed_time_step = config.fixed_time_step;
        let history_ticks = config.input_history();
        let require_ghost = config.require_predicted_ghost;
        let (repeat_budget, first_time_budget) =
            (config.batch_size_repeat(), config.batch_size_first_time());

        if !cx.ghosts.has_predicted() {
            self.history.clear();
            if require_ghost {
                self.last_full = NetworkTick::INVALID;
                Self::skip(cx.world, SkipReason::NoPredictedGhost);
                return None;
            }
        }
        let mut first_time = !self.last_full.is_valid();

        let mut target = confirmed.tick;
        let mut baseline = cx.world.frame().elapsed;
        if confirmed.is_partial() {
            target = target.prev();
            baseline -= fixed_time_step * f64::from(confirmed.fraction);
        }

        let applied = self.history.applied_mut();
        applied.insert(target);
        if !self.last_full.is_valid() {
            self.last_full = target;
        } else if target.is_newer_than(self.last_full) {
            applied.insert(self.last_full);
        }

        let Some(oldest) = applied.oldest_relative_to(confirmed.tick) else {
            self.history.clear();
            Self::skip(cx.world, SkipReason::NothingToReplay);
            return None;
        };

        // Input for tick N changes the outcome of simulating N, so replay must
        // start from N - 1. Ticks past the history window are dropped below.
        let horizon = history_ticks.min(i32::MAX as u32) as i32;
        let mut next = if confirmed.tick.ticks_since(oldest) > horizon {
            confirmed.tick - history_ticks
        } else {
            oldest
        }
        .next();
        while !next.is_newer_than(target) {
            if self.history.inputs().contains(next) {
                self.history.applied_mut().insert(next.prev());
            }
            next = next.next();
        }
        self.history.inputs_mut().clear();

        let all = self.history.applied().sorted_oldest_first(confirmed.tick);
        self.history.applied_mut().clear();
        let before = all.len();
        let ticks: Vec<NetworkTick> = all
            .into_iter()
            .filter(|t| {
                !t.is_newer_than(target)
                    && (*t == target || confirmed.tick.ticks_since(*t) <= horizon)
            })
            .collect();
        if ticks.len() < before {
            tracing::debug!(dropped = before - ticks.len(), "dropped stale replay points");
        }
        if confirmed.tick.ticks_since(self.last_full) > horizon {
            tracing::debug!(last_full = %self.last_full, "last full prediction tick is stale");
            self.last_full = target;
            first_time = true;
        }

        if ticks.len() < 2 && !confirmed.is_partial() {
            Self::skip(cx.world, SkipReason::NothingToReplay);
            return None;
        }

        let expected = target.ticks_since(ticks[0]) as u32 + u32::from(confirmed.is_partial());
        cx.world.time_mut().num_predicted_ticks_expected = expected;
        cx.ghosts.disable_all();

        self.budget = if first_time {
            first_time_budget
        } else {
            repeat_budget
        };
        self.confirmed = confirmed;
        self.target = target;
        self.baseline = baseline;
        Some(ticks)
    }

    /// Open the next invocation.
    fn step<H: ScopeHost, G: SimulationEligibility>(
        &mut self,
        cx: &mut PredictionCx<'_, H, G>,
    ) {
        let fixed_time_step = cx.world.config().fixed_time_step;
        let first = self.invocations == 0;
        self.invocations += 1;

        let (tick, fraction, batch, window) = if self.cursor < self.ticks.len() {
            let prev = self.ticks[self.cursor - 1];
            let mut predicting = self.ticks[self.cursor];
            let mut split = false;
            if prev == self.last_full {
                let first_time_budget = cx.world.config().batch_size_first_time();
                if self.budget != first_time_budget {
                    tracing::trace!(%prev, "caught up with last full prediction");
                }
                self.budget = first_time_budget;
            } else if self.last_full.is_newer_than(prev) && predicting.is_newer_than(self.last_full)
            {
                // A repeat batch never runs past the last fully predicted tick.
                predicting = self.last_full;
                split = true;
            }
            let mut batch = predicting.ticks_since(prev).max(1) as u32;
            if batch > self.budget {
                batch = self.budget;
                predicting = prev + batch;
                split = true;
            }
            if split {
                self.ticks[self.cursor - 1] = predicting;
            } else {
                self.cursor += 1;
            }

            let flags = &mut cx.world.time_mut().flags;
            flags.remove(NetworkTimeFlags::FIRST_TIME_FULLY_PREDICTING_TICK);
            if !self.last_full.is_valid() || predicting.is_newer_than(self.last_full) {
                flags.insert(NetworkTimeFlags::FIRST_TIME_FULLY_PREDICTING_TICK);
                self.last_full = predicting;
            }
            let flags = &mut cx.world.time_mut().flags;
            flags.set(
                NetworkTimeFlags::FINAL_PREDICTION_TICK,
                predicting == self.confirmed.tick,
            );
            flags.set(
                NetworkTimeFlags::FINAL_FULL_PREDICTION_TICK,
                predicting == self.target,
            );

            cx.ghosts.enable_from(prev);
            let age = self.target.ticks_since(predicting);
            let window = TimeWindow::new(
                self.baseline - fixed_time_step * f64::from(age),
                fixed_time_step * f64::from(batch),
            );
            (predicting, 1.0, batch, window)
        } else {
            self.partial_done = true;
            let flags = &mut cx.world.time_mut().flags;
            flags.insert(NetworkTimeFlags::FINAL_PREDICTION_TICK);
            flags.remove(
                NetworkTimeFlags::FINAL_FULL_PREDICTION_TICK
                    | NetworkTimeFlags::FIRST_TIME_FULLY_PREDICTING_TICK,
            );
            cx.ghosts.enable_all();
            let fraction = self.confirmed.fraction;
            let window = TimeWindow::new(
                cx.world.frame().elapsed,
                fixed_time_step * f64::from(fraction),
            );
            (self.confirmed.tick, fraction, 1, window)
        };

        let time = cx.world.time_mut();
        time.flags
            .set(NetworkTimeFlags::FIRST_PREDICTION_TICK, first);
        time.server_tick = tick;
        time.server_tick_fraction = fraction;
        time.simulation_step_batch_size = batch;
        time.predicted_tick_index += 1;
        time.elapsed_network_time = window.elapsed;
        if time.flags.is_final_prediction_tick() {
            self.finals += 1;
        }
        let invocation = Invocation {
            driver: DriverKind::Prediction,
            tick,
            fraction,
            batch,
            flags: time.flags,
            window,
        };
        tracing::trace!(%tick, fraction, batch, flags = %invocation.flags, "prediction tick");
        cx.world.enter_scope(window);
        cx.world.record(TickEvent::Invoked(invocation));
    }
}

impl<'w, H: ScopeHost, G: SimulationEligibility> BracketHooks<PredictionCx<'w, H, G>>
    for PredictionHooks
{
    fn should_enter(&mut self, cx: &mut PredictionCx<'w, H, G>) -> bool {
        let Some(ticks) = self.plan(cx) else {
            return false;
        };
        self.ticks = ticks;
        self.cursor = 1;
        self.partial_done = false;
        self.invocations = 0;
        self.finals = 0;
        tracing::debug!(
            confirmed = %self.confirmed.tick,
            fraction = self.confirmed.fraction,
            replay_points = self.ticks.len(),
            budget = self.budget,
            "rollback burst"
        );
        let tick = self.confirmed.tick;
        cx.world.record(TickEvent::BurstEntered {
            driver: DriverKind::Prediction,
            tick,
        });
        true
    }

    fn on_enter(&mut self, cx: &mut PredictionCx<'w, H, G>) {
        let time = cx.world.time_mut();
        self.saved_batch_size = time.simulation_step_batch_size;
        time.predicted_tick_index = 0;
        time.flags.insert(NetworkTimeFlags::IN_PREDICTION_LOOP);
        self.step(cx);
    }

    fn should_continue(&mut self, _cx: &mut PredictionCx<'w, H, G>) -> bool {
        self.cursor < self.ticks.len() || self.has_partial_step()
    }

    fn on_continue(&mut self, cx: &mut PredictionCx<'w, H, G>) {
        cx.world.exit_scope();
        self.step(cx);
    }

    fn on_exit(&mut self, cx: &mut PredictionCx<'w, H, G>) {
        cx.world.exit_scope();
        let confirmed = self.confirmed;
        let time = cx.world.time_mut();
        netstep_kernel::check_invariant!(
            time.server_tick == confirmed.tick && time.server_tick_fraction == confirmed.fraction,
            "prediction ended at {}@{} instead of confirmed {}@{}",
            time.server_tick,
            time.server_tick_fraction,
            confirmed.tick,
            confirmed.fraction
        );
        netstep_kernel::check_invariant!(
            self.finals == 1,
            "{} invocations flagged final in one burst",
            self.finals
        );
        time.server_tick = confirmed.tick;
        time.server_tick_fraction = confirmed.fraction;
        time.simulation_step_batch_size = self.saved_batch_size;
        time.clear_prediction_flags();
        cx.ghosts.enable_all();

        cx.world.record(TickEvent::BurstExited {
            driver: DriverKind::Prediction,
            invocations: self.invocations,
        });
        self.ticks.clear();
        self.cursor = 0;
    }
}

/// Schedules rollback and replay of predicted entities on the client.
#[derive(Debug)]
pub struct ClientPredictionScheduler {
    bracket: Bracket<PredictionHooks>,
}

impl Default for ClientPredictionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPredictionScheduler {
    pub fn new() -> Self {
        Self {
            bracket: Bracket::repeat_while(PredictionHooks::default()),
        }
    }

    /// Applied and input ticks to be consumed by the next burst.
    pub fn history(&self) -> &RollbackHistory {
        &self.bracket.hooks().history
    }

    pub fn history_mut(&mut self) -> &mut RollbackHistory {
        &mut self.bracket.hooks_mut().history
    }

    /// The newest tick that has been fully predicted at least once.
    pub fn last_full_prediction_tick(&self) -> NetworkTick {
        self.bracket.hooks().last_full
    }

    /// Ask whether the predicted group should run (again) this frame.
    pub fn should_run<H: ScopeHost, G: SimulationEligibility>(
        &mut self,
        world: &mut TickWorld<H>,
        ghosts: &mut G,
    ) -> bool {
        self.bracket.should_run(&mut PredictionCx { world, ghosts })
    }

    /// Run the whole burst for this frame, calling `simulate` inside each
    /// invocation. Returns the number of invocations.
    pub fn run_burst<H: ScopeHost, G: SimulationEligibility>(
        &mut self,
        world: &mut TickWorld<H>,
        ghosts: &mut G,
        mut simulate: impl FnMut(&mut TickWorld<H>, &mut G),
    ) -> u32 {
        let confirmed = world.confirmed();
        let _span = tracing::debug_span!("prediction_burst", confirmed = %confirmed.tick).entered();
        let mut cx = PredictionCx { world, ghosts };
        self.bracket
            .run(&mut cx, |cx| simulate(&mut *cx.world, &mut *cx.ghosts))
    }
}
