mod host;

use clap::{Parser, Subcommand};
use host::SimHost;
use netstep_common::{ConfirmedTick, NetworkTick, TickRateConfig};
use netstep_kernel::{ServerTickDriver, TickEvent, TickWorld};
use netstep_predict::{ClientPredictionScheduler, ClientPresentationTimeDriver, GhostRegistry};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "netstep-cli",
    about = "Run the netstep tick drivers against a synthetic frame loop"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Tick-rate configuration (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective configuration
    Info,
    /// Run the authoritative catch-up loop
    Server {
        /// Number of frames to run
        #[arg(short, long, default_value = "10")]
        frames: u32,
        /// Real seconds per frame
        #[arg(long, default_value = "0.05")]
        frame_dt: f64,
    },
    /// Run the client rollback scheduler against a synthetic server
    Predict {
        /// Number of frames to run
        #[arg(short, long, default_value = "10")]
        frames: u32,
        /// Snapshot latency in ticks
        #[arg(long, default_value = "4")]
        rtt_ticks: u32,
        /// Real seconds per frame
        #[arg(long, default_value = "0.0125")]
        frame_dt: f64,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<TickRateConfig> {
    Ok(match path {
        Some(path) => TickRateConfig::load(path)?,
        None => TickRateConfig::default(),
    })
}

fn print_events(frame: u32, world: &mut TickWorld<SimHost>) {
    for event in world.drain_events() {
        match event {
            TickEvent::Invoked(inv) => println!(
                "  [{frame:>3}] {:?} tick={} fraction={:.2} batch={} flags={} window=({:.4}, {:.4})",
                inv.driver,
                inv.tick,
                inv.fraction,
                inv.batch,
                inv.flags,
                inv.window.elapsed,
                inv.window.delta
            ),
            TickEvent::Skipped { driver, reason } => {
                println!("  [{frame:>3}] {driver:?} skipped: {reason:?}")
            }
            TickEvent::BurstEntered { .. } | TickEvent::BurstExited { .. } => {}
        }
    }
}

fn run_server(config: TickRateConfig, frames: u32, frame_dt: f64) {
    println!(
        "Server: {frames} frames of {frame_dt}s at {:.1} Hz",
        1.0 / config.fixed_time_step
    );
    let mut world = TickWorld::new(config, SimHost::new());
    let mut driver = ServerTickDriver::new();
    let mut total = 0;

    for frame in 0..frames {
        world.begin_frame(frame_dt);
        total += driver.run_frame(&mut world, |w| {
            // Stand-in for simulation work that uses scoped scratch memory.
            if let Some(buf) = w.host_mut().scratch(256) {
                buf[0] = 1;
            }
        });
        world.end_frame();
        print_events(frame, &mut world);
        if let Some(delay) = driver.next_frame_delay(world.config()) {
            println!("  [{frame:>3}] next tick due in {delay:?}");
        }
    }
    println!(
        "Done: {total} invocations, server tick {}, residual {:.4}s",
        world.time().server_tick,
        driver.residual()
    );
}

fn run_predict(config: TickRateConfig, frames: u32, rtt_ticks: u32, frame_dt: f64) {
    println!("Predict: {frames} frames of {frame_dt}s, snapshots {rtt_ticks} ticks behind");
    let fixed_time_step = config.fixed_time_step;
    let mut world = TickWorld::new(config, SimHost::new());
    let mut ghosts = GhostRegistry::new();
    let mut scheduler = ClientPredictionScheduler::new();
    let mut presentation = ClientPresentationTimeDriver::new();
    let ghost = ghosts.spawn();

    // Server time in ticks, as network time reconciliation would report it.
    let mut server_time = 100.0f64;
    for frame in 0..frames {
        server_time += frame_dt / fixed_time_step;
        let whole = server_time.ceil();
        let fraction = (server_time - (whole - 1.0)) as f32;
        let confirmed = ConfirmedTick::partial(NetworkTick::new(whole as u32), fraction);

        let snapshot = confirmed.tick - rtt_ticks.max(1);
        if ghosts.get(ghost).map(|g| g.base_tick) != Some(snapshot) {
            let applied = ghosts.apply_snapshot(ghost, snapshot, scheduler.history_mut());
            if let Err(e) = applied {
                tracing::warn!(error = %e, "snapshot rejected");
            }
        }
        scheduler.history_mut().record_input(confirmed.tick);

        world.begin_frame(frame_dt);
        world.set_confirmed(confirmed);
        scheduler.run_burst(&mut world, &mut ghosts, |w, g| {
            tracing::trace!(
                tick = %w.time().server_tick,
                window = ?w.host().window(),
                simulating = g.simulating().count(),
                "simulate"
            );
        });
        presentation.run_frame(&mut world, |_| {});
        world.end_frame();
        print_events(frame, &mut world);
    }
    println!(
        "Done: last full prediction tick {}",
        scheduler.last_full_prediction_tick()
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Info => {
            println!("netstep-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: {}", netstep_kernel::crate_info());
            println!("fixed_time_step: {}s", config.fixed_time_step);
            println!(
                "server: max_steps={} max_batch={} frame_rate_mode={:?}",
                config.max_steps(),
                config.max_batch(),
                config.frame_rate_mode
            );
            println!(
                "prediction: batch_repeat={} batch_first_time={} history={} require_ghost={}",
                config.batch_size_repeat(),
                config.batch_size_first_time(),
                config.input_history(),
                config.require_predicted_ghost
            );
            println!(
                "presentation: clamp_threshold={:.3}",
                config.partial_tick_clamp_threshold()
            );
        }
        Commands::Server { frames, frame_dt } => run_server(config, frames, frame_dt),
        Commands::Predict {
            frames,
            rtt_ticks,
            frame_dt,
        } => run_predict(config, frames, rtt_ticks, frame_dt),
    }

    Ok(())
}
