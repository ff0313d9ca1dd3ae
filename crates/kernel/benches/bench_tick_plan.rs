use std::hint::black_box;
use std::time::Instant;

use netstep_common::TickRateConfig;
use netstep_kernel::{
    FixedStepAccumulator, RecordingHost, ServerTickDriver, TickWorld, compute_steps,
};

fn bench_compute_steps(delta: f64, iterations: usize) {
    let config = TickRateConfig::default();
    let mut residual = 0.0;

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(compute_steps(
            black_box(delta),
            config.fixed_time_step,
            config.max_steps_per_frame,
            config.max_batch_length,
            &mut residual,
        ));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  compute_steps (dt={delta:.4}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_peek(iterations: usize) {
    let config = TickRateConfig::default();
    let mut acc = FixedStepAccumulator::new();
    acc.advance(0.5 * config.fixed_time_step, &config);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(acc.peek(black_box(0.05), &config));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  peek ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_server_frames(delta: f64, frames: usize) {
    let mut world = TickWorld::new(TickRateConfig::default(), RecordingHost::new());
    let mut driver = ServerTickDriver::new();

    let start = Instant::now();
    let mut ticks = 0u64;
    for _ in 0..frames {
        world.begin_frame(black_box(delta));
        ticks += u64::from(driver.run_frame(&mut world, |w| {
            black_box(w.time().server_tick);
        }));
        world.end_frame();
        world.drain_events();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / frames as u32;
    println!(
        "  server frames (dt={delta:.4}, {frames} frames, {ticks} invocations): {per_iter:?}/frame, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Tick Plan Benchmarks ===\n");

    println!("Accumulator:");
    bench_compute_steps(1.0 / 60.0, 100_000);
    bench_compute_steps(0.183, 100_000);
    bench_compute_steps(2.0, 100_000);
    bench_peek(100_000);

    println!("\nServer driver:");
    bench_server_frames(1.0 / 144.0, 10_000);
    bench_server_frames(1.0 / 30.0, 10_000);
    bench_server_frames(0.25, 10_000);

    println!("\n=== Done ===");
}
