/*
 * Mirrored Flock - Module Definitions
 *
 * This file defines the module structure for the 3D flocking simulation.
 * One authoritative process runs the simulation and publishes a snapshot
 * every tick; replica processes mirror that snapshot without simulating.
 */

// Re-export key components for easier access
pub use boid::{Boid, Flock, Pose};
pub use config::{Role, SimConfig};
pub use error::{FlockError, Result};
pub use net::{SnapshotClient, SnapshotServer};
pub use octree::{Octree, OctreeConfig};
pub use params::{SimulationParams, SpeciesParams, TickParams};
pub use replication::{Mirror, SnapshotSink, SnapshotSlot, SnapshotSource, SyncStatus};
pub use simulation::{Simulation, TickPhase};
pub use snapshot::{PoseRecord, SharedSnapshot};
pub use species::Species;

// Define modules
pub mod boid;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod octree;
pub mod params;
pub mod replication;
pub mod simulation;
pub mod snapshot;
pub mod species;

#[cfg(feature = "viewer")]
pub mod viewer;

// Constants
pub const CUBE_SIZE: f32 = 20.0;
pub const MAX_BOIDS: usize = 2000;
pub const NEIGHBOR_LIMIT: usize = 100;

// Marks an unused slot in a snapshot neighbor row
pub const NO_NEIGHBOR: u16 = u16::MAX;
