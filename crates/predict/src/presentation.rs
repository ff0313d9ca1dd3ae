//! Presentation time: a smoothed delta for systems that run once per frame
//! outside the simulation, derived from how far the confirmed tick moved.

use netstep_common::{ConfirmedTick, NetworkTick};
use netstep_kernel::{
    Bracket, BracketHooks, DriverKind, Invocation, ScopeHost, SkipReason, TickEvent, TickWorld,
    TimeWindow,
};

/// Snap a confirmed tick that is within `threshold` of a tick boundary.
///
/// Works on the "completed tick + progress" view: progress below the
/// threshold rounds down to the completed tick, progress above
/// `1 - threshold` rounds up to the next one. Both come back as whole ticks.
pub fn clamp_partial_tick(confirmed: ConfirmedTick, threshold: f32) -> ConfirmedTick {
    if !confirmed.is_valid() {
        return confirmed;
    }
    let (completed, progress) = if confirmed.is_partial() {
        (confirmed.tick.prev(), confirmed.fraction)
    } else {
        (confirmed.tick, 0.0)
    };
    if progress < threshold {
        ConfirmedTick::whole(completed)
    } else if progress > 1.0 - threshold {
        ConfirmedTick::whole(completed.next())
    } else {
        confirmed
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    tick: NetworkTick,
    fraction: f32,
    delta: f64,
    batch: u32,
}

#[derive(Debug)]
pub struct PresentationHooks {
    previous: ConfirmedTick,
    pending: Pending,
    saved_batch_size: u32,
}

impl Default for PresentationHooks {
    fn default() -> Self {
        Self {
            previous: ConfirmedTick::INVALID,
            pending: Pending {
                tick: NetworkTick::INVALID,
                fraction: 1.0,
                delta: 0.0,
                batch: 1,
            },
            saved_batch_size: 1,
        }
    }
}

impl PresentationHooks {
    fn plan<H: ScopeHost>(&mut self, world: &TickWorld<H>) -> Pending {
        let raw = Pending {
            tick: NetworkTick::INVALID,
            fraction: 1.0,
            delta: world.frame().delta,
            batch: 1,
        };
        let confirmed = world.confirmed();
        if !world.in_game() || !confirmed.is_valid() {
            self.previous = ConfirmedTick::INVALID;
            return raw;
        }

        let now = clamp_partial_tick(confirmed, world.config().partial_tick_clamp_threshold());
        let previous = std::mem::replace(&mut self.previous, now);
        if !previous.is_valid() {
            return Pending {
                tick: now.tick,
                fraction: now.fraction,
                ..raw
            };
        }

        let since = now.tick.ticks_since(previous.tick);
        let ticks = f64::from(since) + f64::from(now.fraction) - f64::from(previous.fraction);
        // A partial previous tick was thrown away and is simulated again.
        let batch = since.max(0) as u32 + u32::from(previous.is_partial());
        Pending {
            tick: now.tick,
            fraction: now.fraction,
            delta: ticks * world.config().fixed_time_step,
            batch,
        }
    }
}

impl<H: ScopeHost> BracketHooks<TickWorld<H>> for PresentationHooks {
    fn should_enter(&mut self, world: &mut TickWorld<H>) -> bool {
        let previous = self.previous;
        let pending = self.plan(world);
        if pending.delta.is_nan() || pending.delta <= 0.0 {
            // Keep the last presented tick so the next frame measures from it.
            // A raw-delta frame has already dropped it and must not bring it back.
            if pending.tick.is_valid() {
                self.previous = previous;
            }
            tracing::debug!(delta = pending.delta, "presentation time did not advance");
            world.record(TickEvent::Skipped {
                driver: DriverKind::Presentation,
                reason: SkipReason::NonPositiveDelta,
            });
            return false;
        }
        self.pending = pending;
        true
    }

    fn on_enter(&mut self, world: &mut TickWorld<H>) {
        let Pending {
            tick,
            fraction,
            delta,
            batch,
        } = self.pending;
        let time = world.time_mut();
        self.saved_batch_size = time.simulation_step_batch_size;
        time.simulation_step_batch_size = batch;

        let flags = time.flags;
        let window = TimeWindow::new(world.frame().elapsed, delta);
        tracing::trace!(%tick, fraction, delta, batch, "presentation frame");
        world.enter_scope(window);
        world.record(TickEvent::Invoked(Invocation {
            driver: DriverKind::Presentation,
            tick,
            fraction,
            batch,
            flags,
            window,
        }));
    }

    fn on_exit(&mut self, world: &mut TickWorld<H>) {
        world.exit_scope();
        world.time_mut().simulation_step_batch_size = self.saved_batch_size;
    }
}

/// Runs the presentation group once per frame with a delta derived from
/// confirmed-tick progress.
#[derive(Debug)]
pub struct ClientPresentationTimeDriver {
    bracket: Bracket<PresentationHooks>,
}

impl Default for ClientPresentationTimeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPresentationTimeDriver {
    pub fn new() -> Self {
        Self {
            bracket: Bracket::single_shot(PresentationHooks::default()),
        }
    }

    /// The confirmed tick the last presented frame measured up to.
    pub fn previous(&self) -> ConfirmedTick {
        self.bracket.hooks().previous
    }

    pub fn should_run<H: ScopeHost>(&mut self, world: &mut TickWorld<H>) -> bool {
        self.bracket.should_run(world)
    }

    /// Run the presentation group for this frame. Returns 1 if it ran.
    pub fn run_frame<H: ScopeHost>(
        &mut self,
        world: &mut TickWorld<H>,
        present: impl FnMut(&mut TickWorld<H>),
    ) -> u32 {
        self.bracket.run(world, present)
    }
}
