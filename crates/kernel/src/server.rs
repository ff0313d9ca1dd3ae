//! Authoritative fixed-timestep driver.
//!
//! Each frame the accumulator produces a [`StepCount`]; the driver then runs
//! `total_steps` invocations, the first `total_steps - short_step_count` of
//! them advancing `length_long_steps` ticks and the rest one tick fewer.
//! Every invocation except the last is flagged as a catch-up tick.

use crate::scope::{ScopeHost, TimeWindow};
use crate::step::{FixedStepAccumulator, StepCount};
use crate::strategy::{Bracket, BracketHooks};
use crate::world::{DriverKind, Invocation, SkipReason, TickEvent, TickWorld};
use netstep_common::{FrameRateMode, NetworkTick, NetworkTimeFlags, TickRateConfig};
use std::time::Duration;

/// Bracket hooks for the server catch-up loop.
#[derive(Debug, Default)]
pub struct ServerHooks {
    accumulator: FixedStepAccumulator,
    plan: StepCount,
    remaining: u32,
    length: u32,
    invocations: u32,
}

impl ServerHooks {
    /// Open the next invocation of the current plan.
    fn step<H: ScopeHost>(&mut self, world: &mut TickWorld<H>) {
        if self.remaining == self.plan.short_step_count {
            self.length -= 1;
        }
        self.remaining -= 1;
        self.invocations += 1;

        let length = self.length;
        let delta = world.config().fixed_time_step * f64::from(length);
        let time = world.time_mut();
        // Counting starts at tick 0, so the first batch lands on its length.
        if time.server_tick.is_valid() {
            time.server_tick += length;
        } else {
            time.server_tick = NetworkTick::new(length);
        }
        time.server_tick_fraction = 1.0;
        time.simulation_step_batch_size = length;
        time.flags
            .set(NetworkTimeFlags::CATCH_UP_TICK, self.remaining > 0);
        time.elapsed_network_time += delta;

        let window = TimeWindow::new(time.elapsed_network_time, delta);
        let invocation = Invocation {
            driver: DriverKind::Server,
            tick: time.server_tick,
            fraction: 1.0,
            batch: length,
            flags: time.flags,
            window,
        };
        tracing::trace!(
            tick = %invocation.tick,
            batch = length,
            catch_up = self.remaining > 0,
            "server tick"
        );
        world.enter_scope(window);
        world.record(TickEvent::Invoked(invocation));
    }
}

impl<H: ScopeHost> BracketHooks<TickWorld<H>> for ServerHooks {
    fn should_enter(&mut self, world: &mut TickWorld<H>) -> bool {
        let delta = world.frame().delta;
        self.plan = self.accumulator.advance(delta, world.config());
        if self.plan.total_steps == 0 {
            world.record(TickEvent::Skipped {
                driver: DriverKind::Server,
                reason: SkipReason::NoSteps,
            });
            return false;
        }
        self.remaining = self.plan.total_steps;
        self.length = self.plan.length_long_steps;
        self.invocations = 0;
        tracing::debug!(
            steps = self.plan.total_steps,
            long = self.plan.length_long_steps,
            short = self.plan.short_step_count,
            "server catch-up plan"
        );
        let tick = world.time().server_tick;
        world.record(TickEvent::BurstEntered {
            driver: DriverKind::Server,
            tick,
        });
        true
    }

    fn on_enter(&mut self, world: &mut TickWorld<H>) {
        self.step(world);
    }

    fn should_continue(&mut self, _world: &mut TickWorld<H>) -> bool {
        self.remaining > 0
    }

    fn on_continue(&mut self, world: &mut TickWorld<H>) {
        world.exit_scope();
        self.step(world);
    }

    fn on_exit(&mut self, world: &mut TickWorld<H>) {
        world.exit_scope();
        world.time_mut().flags.remove(NetworkTimeFlags::CATCH_UP_TICK);
        world.record(TickEvent::BurstExited {
            driver: DriverKind::Server,
            invocations: self.invocations,
        });
    }
}

/// Drives the authoritative simulation group at a fixed tick rate.
#[derive(Debug)]
pub struct ServerTickDriver {
    bracket: Bracket<ServerHooks>,
}

impl Default for ServerTickDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerTickDriver {
    pub fn new() -> Self {
        Self {
            bracket: Bracket::repeat_while(ServerHooks::default()),
        }
    }

    /// Ask whether the simulation group should run (again) this frame.
    pub fn should_run<H: ScopeHost>(&mut self, world: &mut TickWorld<H>) -> bool {
        self.bracket.should_run(world)
    }

    /// Run every invocation for the current frame, calling `simulate` inside
    /// each one. Returns the number of invocations.
    pub fn run_frame<H: ScopeHost>(
        &mut self,
        world: &mut TickWorld<H>,
        simulate: impl FnMut(&mut TickWorld<H>),
    ) -> u32 {
        let _span = tracing::debug_span!("server_frame", delta = world.frame().delta).entered();
        self.bracket.run(world, simulate)
    }

    /// The plan computed for the most recent frame.
    pub fn last_plan(&self) -> StepCount {
        self.bracket.hooks().plan
    }

    pub fn residual(&self) -> f64 {
        self.bracket.hooks().accumulator.residual()
    }

    /// Whether a frame of `delta_time` would run at least one tick. Does not
    /// consume any accumulated time.
    pub fn would_tick(&self, delta_time: f64, config: &TickRateConfig) -> bool {
        self.bracket
            .hooks()
            .accumulator
            .peek(delta_time, config)
            .total_steps
            > 0
    }

    /// Time left until the next whole tick is due, when the host should
    /// sleep between frames. `None` in busy-wait mode.
    pub fn next_frame_delay(&self, config: &TickRateConfig) -> Option<Duration> {
        match config.frame_rate_mode {
            FrameRateMode::BusyWait => None,
            FrameRateMode::Sleep => {
                let elapsed = Duration::from_secs_f64(self.residual().max(0.0));
                Some(config.tick_duration().saturating_sub(elapsed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::RecordingHost;

    const STEP: f64 = 1.0 / 60.0;

    fn world() -> TickWorld<RecordingHost> {
        TickWorld::new(TickRateConfig::default(), RecordingHost::new())
    }

    fn batches(world: &TickWorld<RecordingHost>) -> Vec<u32> {
        world.invocations().map(|i| i.batch).collect()
    }

    #[test]
    fn single_tick_frame() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(1.2 * STEP);
        let runs = driver.run_frame(&mut w, |_| {});
        assert_eq!(runs, 1);
        assert_eq!(w.time().server_tick, NetworkTick::new(1));
        assert!(!w.time().flags.is_catch_up_tick());
        assert_eq!(w.host().pushed(), 1);
        assert_eq!(w.host().popped(), 1);
    }

    #[test]
    fn first_batch_starts_from_tick_zero() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(0.183);
        driver.run_frame(&mut w, |_| {});
        let ticks: Vec<u32> = w.invocations().map(|i| i.tick.index()).collect();
        assert_eq!(ticks, vec![3, 6, 8, 10]);
        assert_eq!(w.time().server_tick, NetworkTick::new(10));
    }

    #[test]
    fn short_batches_follow_long_ones() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.time_mut().server_tick = NetworkTick::new(100);
        w.begin_frame(0.183);
        assert_eq!(driver.run_frame(&mut w, |_| {}), 4);
        assert_eq!(batches(&w), vec![3, 3, 2, 2]);
        assert_eq!(w.time().server_tick, NetworkTick::new(110));
        assert_eq!(driver.last_plan().ticks(), 10);
    }

    #[test]
    fn catch_up_flag_on_all_but_last() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(3.5 * STEP);
        let mut seen = Vec::new();
        driver.run_frame(&mut w, |w| seen.push(w.time().flags.is_catch_up_tick()));
        assert_eq!(seen, vec![true, true, false]);
        assert!(!w.time().flags.is_catch_up_tick());
    }

    #[test]
    fn window_is_open_only_during_invocation() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(2.0 * STEP + 1e-6);
        let mut depths = Vec::new();
        driver.run_frame(&mut w, |w| {
            depths.push(w.scope_depth());
            assert_eq!(w.host().windows().len(), 1);
        });
        assert_eq!(depths, vec![1, 1]);
        assert_eq!(w.scope_depth(), 0);
        w.end_frame();
    }

    #[test]
    fn windows_cover_fixed_step_times_batch() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(0.2);
        let mut deltas = Vec::new();
        driver.run_frame(&mut w, |w| deltas.push(w.host().windows()[0].delta));
        assert_eq!(deltas.len(), 4);
        for d in deltas {
            assert!((d - 3.0 * STEP).abs() < 1e-12);
        }
        assert!((w.time().elapsed_network_time - 12.0 * STEP).abs() < 1e-9);
    }

    #[test]
    fn idle_frame_is_skipped() {
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(0.25 * STEP);
        assert!(!driver.should_run(&mut w));
        assert_eq!(
            w.events(),
            &[TickEvent::Skipped {
                driver: DriverKind::Server,
                reason: SkipReason::NoSteps,
            }]
        );
        assert_eq!(w.host().pushed(), 0);
    }

    #[test]
    fn would_tick_does_not_consume_time() {
        let config = TickRateConfig::default();
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(0.5 * STEP);
        driver.run_frame(&mut w, |_| {});
        let residual = driver.residual();

        assert!(driver.would_tick(0.6 * STEP, &config));
        assert!(!driver.would_tick(0.4 * STEP, &config));
        assert_eq!(driver.residual(), residual);
    }

    #[test]
    fn sleep_mode_reports_time_to_next_tick() {
        let mut config = TickRateConfig::default();
        let mut w = world();
        let mut driver = ServerTickDriver::new();
        w.begin_frame(0.25 * STEP);
        driver.run_frame(&mut w, |_| {});

        assert_eq!(driver.next_frame_delay(&config), None);
        config.frame_rate_mode = FrameRateMode::Sleep;
        let delay = driver.next_frame_delay(&config).unwrap();
        assert!((delay.as_secs_f64() - 0.75 * STEP).abs() < 1e-6);
    }
}
