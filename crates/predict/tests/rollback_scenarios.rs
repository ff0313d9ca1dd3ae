use netstep_common::{ConfirmedTick, NetworkTick, TickRateConfig};
use netstep_kernel::{
    DriverKind, Invocation, RecordingHost, SkipReason, TickEvent, TickWorld,
};
use netstep_predict::{ClientPredictionScheduler, GhostRegistry};
use proptest::prelude::*;

const STEP: f64 = 1.0 / 60.0;

struct Client {
    world: TickWorld<RecordingHost>,
    ghosts: GhostRegistry,
    scheduler: ClientPredictionScheduler,
}

impl Client {
    fn new(config: TickRateConfig) -> Self {
        Self {
            world: TickWorld::new(config, RecordingHost::new()),
            ghosts: GhostRegistry::new(),
            scheduler: ClientPredictionScheduler::new(),
        }
    }

    fn frame(&mut self, confirmed: ConfirmedTick) -> Vec<Invocation> {
        self.world.begin_frame(STEP);
        self.world.set_confirmed(confirmed);
        self.world.drain_events();
        self.scheduler
            .run_burst(&mut self.world, &mut self.ghosts, |_, _| {});
        self.world.end_frame();
        self.world.invocations().copied().collect()
    }
}

#[test]
fn fresh_scheduler_only_seeds_last_full_tick() {
    let mut client = Client::new(TickRateConfig::default());
    let runs = client.frame(ConfirmedTick::whole(NetworkTick::new(100)));

    assert!(runs.is_empty());
    assert!(client.world.events().contains(&TickEvent::Skipped {
        driver: DriverKind::Prediction,
        reason: SkipReason::NothingToReplay,
    }));
    assert_eq!(
        client.scheduler.last_full_prediction_tick(),
        NetworkTick::new(100)
    );
}

#[test]
fn fresh_scheduler_runs_only_partial_step() {
    let mut client = Client::new(TickRateConfig::default());
    let runs = client.frame(ConfirmedTick::partial(NetworkTick::new(100), 0.5));

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tick, NetworkTick::new(100));
    assert_eq!(runs[0].fraction, 0.5);
    assert!(runs[0].flags.is_final_prediction_tick());
    assert_eq!(
        client.scheduler.last_full_prediction_tick(),
        NetworkTick::new(99)
    );
}

#[test]
fn whole_confirmed_tick_without_history_runs_once() {
    let mut client = Client::new(TickRateConfig::default());
    client.frame(ConfirmedTick::whole(NetworkTick::new(99)));

    let runs = client.frame(ConfirmedTick::whole(NetworkTick::new(100)));
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tick, NetworkTick::new(100));
    assert_eq!(runs[0].batch, 1);
    assert!(runs[0].flags.is_final_prediction_tick());
}

#[test]
fn partial_confirmed_tick_ends_with_partial_step() {
    let mut client = Client::new(TickRateConfig::default());
    client.frame(ConfirmedTick::partial(NetworkTick::new(99), 0.5));

    let runs = client.frame(ConfirmedTick::partial(NetworkTick::new(100), 0.5));
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].tick, NetworkTick::new(99));
    assert_eq!(runs[0].fraction, 1.0);
    assert!(runs[0].flags.is_final_full_prediction_tick());
    assert_eq!(runs[1].tick, NetworkTick::new(100));
    assert_eq!(runs[1].fraction, 0.5);
    assert_eq!(runs[1].batch, 1);
    assert!(runs[1].flags.is_final_prediction_tick());
}

#[test]
fn windows_end_at_frame_time() {
    let mut config = TickRateConfig::default();
    config.max_batch_size_repeat = 8;
    let mut client = Client::new(config);
    let id = client.ghosts.spawn();
    client.frame(ConfirmedTick::whole(NetworkTick::new(50)));
    let history = client.scheduler.history_mut();
    client
        .ghosts
        .apply_snapshot(id, NetworkTick::new(47), history)
        .unwrap();

    let runs = client.frame(ConfirmedTick::whole(NetworkTick::new(51)));
    let elapsed = client.world.frame().elapsed;
    let last = runs.last().unwrap();
    assert!((last.window.elapsed - elapsed).abs() < 1e-9);
    // 47 -> 50 replays three ticks, ending one tick before the frame.
    assert!((runs[0].window.elapsed - (elapsed - STEP)).abs() < 1e-9);
    assert!((runs[0].window.delta - 3.0 * STEP).abs() < 1e-9);
}

#[derive(Debug, Clone)]
struct Frame {
    advance: u32,
    fraction: f32,
    snapshot_age: Option<u32>,
    input_age: Option<u32>,
}

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (
        1u32..4,
        prop_oneof![Just(1.0f32), Just(0.25), Just(0.5), Just(0.75)],
        proptest::option::of(0u32..12),
        proptest::option::of(0u32..12),
    )
        .prop_map(|(advance, fraction, snapshot_age, input_age)| Frame {
            advance,
            fraction,
            snapshot_age,
            input_age,
        })
}

proptest! {
    #[test]
    fn bursts_are_ordered_and_end_on_confirmed_tick(
        repeat in 1i32..5,
        first_time in 1i32..5,
        frames in proptest::collection::vec(frame_strategy(), 1..24),
    ) {
        let mut config = TickRateConfig::default();
        config.max_batch_size_repeat = repeat;
        config.max_batch_size_first_time = first_time;
        let mut client = Client::new(config);
        let ghost = client.ghosts.spawn();
        let mut tick = NetworkTick::new(1000);

        for frame in frames {
            tick += frame.advance;
            let confirmed = ConfirmedTick::partial(tick, frame.fraction);
            if let Some(age) = frame.snapshot_age {
                let history = client.scheduler.history_mut();
                client.ghosts.apply_snapshot(ghost, tick - age, history).unwrap();
            }
            if let Some(age) = frame.input_age {
                client.scheduler.history_mut().record_input(tick - age);
            }
            let last_full = client.scheduler.last_full_prediction_tick();
            let target = if confirmed.is_partial() { tick.prev() } else { tick };

            let runs = client.frame(confirmed);
            prop_assert_eq!(client.world.host().pushed(), client.world.host().popped());
            if runs.is_empty() {
                continue;
            }

            for pair in runs.windows(2) {
                prop_assert!(pair[1].tick.is_newer_than(pair[0].tick));
            }
            let last = runs.last().unwrap();
            prop_assert_eq!(last.tick, confirmed.tick);
            prop_assert_eq!(last.fraction, confirmed.fraction);
            prop_assert_eq!(
                runs.iter().filter(|r| r.flags.is_final_prediction_tick()).count(),
                1
            );
            prop_assert!(runs[0].flags.is_first_prediction_tick());
            prop_assert_eq!(
                runs.iter().filter(|r| r.flags.is_first_prediction_tick()).count(),
                1
            );

            let budget = repeat.max(first_time) as u32;
            prop_assert!(runs.iter().all(|r| r.batch >= 1 && r.batch <= budget));

            if last_full.is_valid() && target.is_newer_than(last_full) {
                // Whole ticks up to the last full tick replay with the repeat
                // budget; every batch starting at or after it is new.
                for run in runs.iter().filter(|r| r.fraction == 1.0) {
                    let start = run.tick - run.batch;
                    if last_full.is_newer_than(start) {
                        prop_assert!(!run.tick.is_newer_than(last_full));
                        prop_assert!(run.batch <= repeat as u32);
                        prop_assert!(!run.flags.is_first_time_fully_predicting_tick());
                    } else {
                        prop_assert!(run.batch <= first_time as u32);
                        prop_assert!(run.flags.is_first_time_fully_predicting_tick());
                    }
                }
                prop_assert_eq!(client.scheduler.last_full_prediction_tick(), target);
            }
        }
    }
}
