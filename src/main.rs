/*
 * Mirrored Flock
 *
 * Headless entry point. A primary runs the flocking simulation at a fixed
 * tick rate and serves every tick's snapshot over TCP. A replica connects to
 * a primary and mirrors the flock without simulating it.
 *
 * Typing `r` (or `reset`) followed by enter on the primary resets the flock
 * at the start of the next tick.
 */

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use mirrored_flock::cli::{init_tracing, CliArgs};
use mirrored_flock::net::{SnapshotClient, SnapshotServer};
use mirrored_flock::{
    Mirror, Result, Role, SimConfig, Simulation, SnapshotSink, SnapshotSlot, SyncStatus,
};

fn main() -> ExitCode {
    init_tracing();
    let args = CliArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::info!(role = %config.role, agents = config.agent_count, "starting");
    match config.role {
        Role::Primary => run_primary(&config, args.ticks),
        Role::Replica => run_replica(&config, args.ticks),
    }
}

// Fixed-rate loop; sleeps off whatever is left of each period
struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
        }
    }

    fn wait(&mut self) {
        self.next += self.period;
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        } else {
            // Running behind, do not try to catch up
            self.next = now;
        }
    }
}

fn spawn_reset_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let trigger = flag.clone();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim(), "r" | "reset") {
                trigger.store(true, Ordering::Relaxed);
            }
        }
    });
    flag
}

fn run_primary(config: &SimConfig, ticks: Option<u64>) -> Result<()> {
    let slot = SnapshotSlot::new();
    let server = SnapshotServer::bind(config.listen, slot.clone())?;
    let mut sim = Simulation::new(config)?;
    let reset = spawn_reset_listener();

    let dt = 1.0 / config.tick_rate_hz;
    let report_every = (config.tick_rate_hz.round() as u64).max(1);
    let mut pacer = Pacer::new(config.tick_period()?);
    tracing::info!(addr = %server.local_addr(), rate = config.tick_rate_hz, "primary running");

    while ticks.map_or(true, |limit| sim.tick_count() < limit) {
        if reset.swap(false, Ordering::Relaxed) {
            sim.request_reset();
        }
        let started = Instant::now();
        let snapshot = sim.step(dt);
        let tick = snapshot.tick;
        slot.publish(snapshot);

        if tick % report_every == 0 {
            tracing::info!(
                tick,
                agents = sim.flock().len(),
                step_ms = started.elapsed().as_secs_f64() * 1000.0,
                "primary tick"
            );
        }
        pacer.wait();
    }
    Ok(())
}

fn run_replica(config: &SimConfig, ticks: Option<u64>) -> Result<()> {
    let client = SnapshotClient::connect(config.connect)?;
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut mirror = Mirror::new(config.agent_count, &config.bounds(), &mut rng);

    let report_every = (config.tick_rate_hz.round() as u64).max(1);
    let mut pacer = Pacer::new(config.tick_period()?);
    let mut frames = 0u64;

    while ticks.map_or(true, |limit| frames < limit) {
        match mirror.sync(&client) {
            SyncStatus::Applied { tick } => tracing::debug!(tick, "snapshot applied"),
            SyncStatus::Unchanged { tick } => tracing::trace!(tick, "no new snapshot"),
            SyncStatus::NoSnapshot => tracing::trace!("waiting for first snapshot"),
            SyncStatus::Rejected { tick } => tracing::debug!(tick, "snapshot rejected"),
        }

        frames += 1;
        if frames % report_every == 0 {
            tracing::info!(
                last_tick = ?mirror.last_tick(),
                agents = mirror.flock().len(),
                center = ?mirror.center_of_mass(),
                "replica frame"
            );
        }
        pacer.wait();
    }
    Ok(())
}
