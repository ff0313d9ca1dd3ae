use crate::scope::{ArenaSwapper, ScopeHost, TimeWindow};
use netstep_common::{
    ConfirmedTick, FrameTime, NetworkTick, NetworkTime, NetworkTimeFlags, TickRateConfig,
};
use serde::{Deserialize, Serialize};

/// Which driver produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    Server,
    Prediction,
    Presentation,
}

/// Why a driver declined to run this frame. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Not enough time accumulated for a whole tick.
    NoSteps,
    /// No confirmed tick has been received yet.
    NoConfirmedTick,
    /// Prediction requires a predicted entity and none exists.
    NoPredictedGhost,
    /// Nothing in the rollback set is reachable.
    NothingToReplay,
    /// Presentation time did not move forward.
    NonPositiveDelta,
}

/// One driver invocation as seen by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub driver: DriverKind,
    pub tick: NetworkTick,
    pub fraction: f32,
    pub batch: u32,
    pub flags: NetworkTimeFlags,
    pub window: TimeWindow,
}

/// A record produced by every driver decision.
///
/// The log is append-only and only cleared by [`TickWorld::drain_events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TickEvent {
    BurstEntered { driver: DriverKind, tick: NetworkTick },
    Invoked(Invocation),
    BurstExited { driver: DriverKind, invocations: u32 },
    Skipped { driver: DriverKind, reason: SkipReason },
}

/// The per-world scheduling context.
///
/// Owns the shared [`NetworkTime`] record, the host's scope hooks and the
/// scope stack. Drivers receive it by `&mut` on every query; there is no
/// global time state.
#[derive(Debug)]
pub struct TickWorld<H> {
    config: TickRateConfig,
    time: NetworkTime,
    frame: FrameTime,
    confirmed: ConfirmedTick,
    in_game: bool,
    host: H,
    swapper: ArenaSwapper,
    event_log: Vec<TickEvent>,
}

impl<H: ScopeHost> TickWorld<H> {
    pub fn new(config: TickRateConfig, host: H) -> Self {
        Self {
            config,
            time: NetworkTime::default(),
            frame: FrameTime::default(),
            confirmed: ConfirmedTick::INVALID,
            in_game: true,
            host,
            swapper: ArenaSwapper::new(),
            event_log: Vec::new(),
        }
    }

    pub fn config(&self) -> &TickRateConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TickRateConfig) {
        self.config = config;
    }

    /// The shared network time record.
    pub fn time(&self) -> &NetworkTime {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut NetworkTime {
        &mut self.time
    }

    pub fn frame(&self) -> FrameTime {
        self.frame
    }

    /// Start a new frame that is `delta` real seconds after the previous one.
    pub fn begin_frame(&mut self, delta: f64) {
        self.frame = self.frame.advanced(delta);
    }

    /// Finish the frame. Every scope opened this frame must be closed.
    pub fn end_frame(&mut self) {
        if let Err(e) = self.swapper.ensure_balanced() {
            crate::validate::violation(format_args!("{e}"));
        }
    }

    /// Confirmed tick published by network time reconciliation this frame.
    pub fn confirmed(&self) -> ConfirmedTick {
        self.confirmed
    }

    pub fn set_confirmed(&mut self, confirmed: ConfirmedTick) {
        self.confirmed = confirmed;
    }

    /// Whether the world is connected and in game.
    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn set_in_game(&mut self, in_game: bool) {
        self.in_game = in_game;
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Open an invocation scope: push `window` and swap in a scoped arena.
    pub fn enter_scope(&mut self, window: TimeWindow) {
        self.swapper.enter(&mut self.host, window);
    }

    /// Close the innermost invocation scope.
    pub fn exit_scope(&mut self) {
        if let Err(e) = self.swapper.exit(&mut self.host) {
            crate::validate::violation(format_args!("{e}"));
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.swapper.depth()
    }

    pub fn record(&mut self, event: TickEvent) {
        self.event_log.push(event);
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[TickEvent] {
        &self.event_log
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<TickEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Invocations in the log, oldest first.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.event_log.iter().filter_map(|e| match e {
            TickEvent::Invoked(inv) => Some(inv),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::RecordingHost;

    fn world() -> TickWorld<RecordingHost> {
        TickWorld::new(TickRateConfig::default(), RecordingHost::new())
    }

    #[test]
    fn world_starts_without_confirmed_tick() {
        let w = world();
        assert!(!w.confirmed().is_valid());
        assert!(!w.time().server_tick.is_valid());
        assert!(w.in_game());
        assert!(w.events().is_empty());
    }

    #[test]
    fn begin_frame_accumulates_elapsed() {
        let mut w = world();
        w.begin_frame(0.25);
        w.begin_frame(0.5);
        assert_eq!(w.frame().elapsed, 0.75);
        assert_eq!(w.frame().delta, 0.5);
    }

    #[test]
    fn scopes_are_forwarded_to_host() {
        let mut w = world();
        w.enter_scope(TimeWindow::new(1.0, 0.1));
        assert_eq!(w.scope_depth(), 1);
        assert_eq!(w.host().windows().len(), 1);
        w.exit_scope();
        w.end_frame();
        assert_eq!(w.host().pushed(), w.host().popped());
    }

    #[test]
    #[cfg_attr(not(any(debug_assertions, feature = "validation")), ignore)]
    #[should_panic(expected = "scope stack underflow")]
    fn unmatched_exit_is_an_invariant_violation() {
        let mut w = world();
        w.exit_scope();
    }

    #[test]
    #[cfg_attr(not(any(debug_assertions, feature = "validation")), ignore)]
    #[should_panic(expected = "still open at frame end")]
    fn leaked_scope_is_caught_at_frame_end() {
        let mut w = world();
        w.enter_scope(TimeWindow::new(0.0, 0.1));
        w.end_frame();
    }

    #[test]
    fn drain_events_clears_log() {
        let mut w = world();
        w.record(TickEvent::Skipped {
            driver: DriverKind::Server,
            reason: SkipReason::NoSteps,
        });
        assert_eq!(w.drain_events().len(), 1);
        assert!(w.events().is_empty());
    }

    #[test]
    fn invocations_filters_the_log() {
        let mut w = world();
        w.record(TickEvent::BurstEntered {
            driver: DriverKind::Server,
            tick: NetworkTick::new(1),
        });
        w.record(TickEvent::Invoked(Invocation {
            driver: DriverKind::Server,
            tick: NetworkTick::new(1),
            fraction: 1.0,
            batch: 1,
            flags: NetworkTimeFlags::NONE,
            window: TimeWindow::new(0.0, 1.0 / 60.0),
        }));
        assert_eq!(w.invocations().count(), 1);
    }
}
