/*
 * Configuration Module
 *
 * Startup configuration read once from a TOML file. Every field is optional
 * and falls back to its default. Invalid volumes or rates fail fast here so a
 * misconfigured process never starts simulating.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::boid::Bounds;
use crate::error::{FlockError, Result};
use crate::octree::OctreeConfig;
use crate::params::SimulationParams;
use crate::MAX_BOIDS;

pub const DEFAULT_ADDR: &str = "127.0.0.1:7878";

// Which side of the replication boundary this process is on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Primary,
    Replica,
}

impl Role {
    pub fn is_primary(self) -> bool {
        self == Role::Primary
    }
}

impl FromStr for Role {
    type Err = FlockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Role::Primary),
            "replica" => Ok(Role::Replica),
            other => Err(FlockError::Config(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Replica => write!(f, "replica"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub role: Role,
    pub agent_count: usize,
    // None draws a fresh seed from the OS
    pub seed: Option<u64>,
    pub tick_rate_hz: f32,
    pub parallel: bool,
    pub listen: SocketAddr,
    pub connect: SocketAddr,
    pub octree: OctreeConfig,
    pub params: SimulationParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        let addr: SocketAddr = DEFAULT_ADDR
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 7878)));
        Self {
            role: Role::Primary,
            agent_count: MAX_BOIDS,
            seed: None,
            tick_rate_hz: 60.0,
            parallel: true,
            listen: addr,
            connect: addr,
            octree: OctreeConfig::default(),
            params: SimulationParams::default(),
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    // Parse, clamp the tunables and validate
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: SimConfig = toml::from_str(contents)?;
        config.params = config.params.clamped();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.octree.validate()?;
        self.tick_period()?;
        Ok(())
    }

    // Wall-clock length of one tick; the rate must give a representable, non-zero period
    pub fn tick_period(&self) -> Result<Duration> {
        let rate = self.tick_rate_hz;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(FlockError::Config(format!(
                "tick rate must be positive, got {rate}"
            )));
        }
        match Duration::try_from_secs_f32(1.0 / rate) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(FlockError::Config(format!(
                "tick rate {rate} Hz has no usable tick period"
            ))),
        }
    }

    // The flock lives in the same cube the octree is rooted at
    pub fn bounds(&self) -> Bounds {
        Bounds {
            center: self.octree.center,
            half_extent: self.octree.half_extent,
        }
    }
}
