/*
 * Command Line Module
 *
 * Flags shared by the headless binary and the viewer. Anything given on the
 * command line overrides the value from the config file.
 */

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{Role, SimConfig};
use crate::error::Result;

#[derive(Parser, Debug, Clone, Default)]
#[command(about = "3D boid flock with one authoritative primary and mirrored replicas")]
pub struct CliArgs {
    /// TOML config file; every field in it is optional
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// primary runs the simulation, replica mirrors it
    #[arg(long, short = 'r')]
    pub role: Option<Role>,

    /// Number of boids (capped at the static capacity)
    #[arg(long, short = 'n')]
    pub agents: Option<usize>,

    /// Seed for deterministic runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Ticks per second
    #[arg(long)]
    pub rate: Option<f32>,

    /// Address the primary serves snapshots on
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Address a replica reads snapshots from
    #[arg(long)]
    pub connect: Option<SocketAddr>,

    /// Run the per-agent phases on one thread
    #[arg(long)]
    pub sequential: bool,

    /// Stop after this many ticks (runs forever when omitted)
    #[arg(long)]
    pub ticks: Option<u64>,
}

impl CliArgs {
    // Config file first, then flag overrides, then validation
    pub fn resolve(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };

        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(agents) = self.agents {
            config.agent_count = agents;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(rate) = self.rate {
            config.tick_rate_hz = rate;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(connect) = self.connect {
            config.connect = connect;
        }
        if self.sequential {
            config.parallel = false;
        }

        config.validate()?;
        Ok(config)
    }
}

// Install the fmt subscriber; RUST_LOG overrides the default filter
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mirrored_flock=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
