/*
 * Simulation Module
 *
 * This module runs the authoritative side of the flock. Every tick walks the
 * same fixed sequence of phases:
 *
 *   Idle -> Building -> Querying -> Integrating -> Publishing -> Idle
 *
 * Building rebuilds the octree from the positions captured at tick start.
 * Querying caches each boid's neighbor list and sums the center of mass.
 * Integrating steers and moves every boid against the captured positions,
 * so the result does not depend on the order boids are visited in.
 * Publishing writes the SharedSnapshot that replicas mirror.
 *
 * Optimized for performance by:
 * - Reusing the octree and capture buffers across ticks
 * - Parallel processing of the query and integration phases with rayon
 */

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::boid::{center_of_mass, Boid, Bounds, Flock, FlockView, Pose};
use crate::config::SimConfig;
use crate::error::Result;
use crate::octree::Octree;
use crate::params::{SimulationParams, TickParams};
use crate::snapshot::SharedSnapshot;
use crate::NEIGHBOR_LIMIT;

// Fraction of the way the viewer turns towards the flock each tick
pub const VIEWER_TURN: f32 = 0.2;

// Where the viewer sits when the simulation starts
pub const VIEWER_START: Vec3 = Vec3::new(5.0, 0.0, 0.0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickPhase {
    #[default]
    Idle,
    Building,
    Querying,
    Integrating,
    Publishing,
}

impl TickPhase {
    fn next(self) -> Self {
        match self {
            TickPhase::Idle => TickPhase::Building,
            TickPhase::Building => TickPhase::Querying,
            TickPhase::Querying => TickPhase::Integrating,
            TickPhase::Integrating => TickPhase::Publishing,
            TickPhase::Publishing => TickPhase::Idle,
        }
    }
}

pub struct Simulation {
    flock: Flock,
    octree: Octree,
    pub params: SimulationParams,
    bounds: Bounds,
    agent_count: usize,
    parallel: bool,
    viewer: Pose,
    tick: u64,
    phase: TickPhase,
    reset_pending: bool,
    rng: ChaCha8Rng,
    // Tick-start capture, reused between ticks
    positions: Vec<Vec3>,
    headings: Vec<Vec3>,
}

impl Simulation {
    pub fn new(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        let octree = Octree::new(config.octree)?;
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let bounds = config.bounds();
        let flock = Flock::spawn(config.agent_count, &bounds, &mut rng);

        tracing::info!(
            agents = flock.len(),
            parallel = config.parallel,
            "simulation ready"
        );

        Ok(Self {
            flock,
            octree,
            params: config.params,
            bounds,
            agent_count: config.agent_count,
            parallel: config.parallel,
            viewer: Pose::looking_at(VIEWER_START, bounds.center, Vec3::Y),
            tick: 0,
            phase: TickPhase::Idle,
            reset_pending: false,
            rng,
            positions: Vec::new(),
            headings: Vec::new(),
        })
    }

    pub fn flock(&self) -> &Flock {
        &self.flock
    }

    // Direct access for scenarios that place boids by hand between ticks
    pub fn flock_mut(&mut self) -> &mut Flock {
        &mut self.flock
    }

    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    pub fn viewer(&self) -> Pose {
        self.viewer
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    // Tunables from the parameter source, clamped before the next tick freezes them
    pub fn set_params(&mut self, params: SimulationParams) {
        self.params = params.clamped();
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    // External reset trigger, honored when the next tick starts
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    // Reinitialize every boid with a fresh random pose and species
    pub fn reset(&mut self) {
        self.flock = Flock::spawn(self.agent_count, &self.bounds, &mut self.rng);
        self.octree.clear();
        self.reset_pending = false;
        tracing::info!(agents = self.flock.len(), tick = self.tick, "flock reset");
    }

    fn enter(&mut self, phase: TickPhase) {
        debug_assert_eq!(self.phase.next(), phase, "tick phases out of order");
        tracing::trace!(?phase, tick = self.tick, "phase");
        self.phase = phase;
    }

    // Run one full tick and return the snapshot to publish
    pub fn step(&mut self, dt: f32) -> SharedSnapshot {
        // Idle -> Building
        if self.reset_pending {
            self.reset();
        }
        self.enter(TickPhase::Building);
        let params = self.params.freeze();
        self.flock.capture(&mut self.positions, &mut self.headings);
        self.octree.build(&self.positions);

        // Building -> Querying
        self.enter(TickPhase::Querying);
        self.query_neighbors(&params);
        let center = center_of_mass(&self.positions).unwrap_or(self.bounds.center);

        // Querying -> Integrating
        self.enter(TickPhase::Integrating);
        self.integrate(&params, dt);

        // Integrating -> Publishing
        self.enter(TickPhase::Publishing);
        self.viewer.face_toward(center, Vec3::Y, VIEWER_TURN);
        self.tick += 1;
        let snapshot = SharedSnapshot::capture(
            &self.flock,
            self.tick,
            params.point_size,
            self.viewer,
            center,
        );

        // Publishing -> Idle
        self.enter(TickPhase::Idle);
        tracing::debug!(
            tick = self.tick,
            agents = self.flock.len(),
            center = ?center,
            "tick complete"
        );
        snapshot
    }

    fn query_neighbors(&mut self, params: &TickParams) {
        let octree = &self.octree;
        let positions = &self.positions;
        let query = |scratch: &mut Vec<usize>, (i, boid): (usize, &mut Boid)| {
            let radius = params.for_species(boid.species).vision_radius;
            octree.query_neighbors(i, positions[i], radius, scratch);
            boid.set_neighbors(i, scratch.iter().copied());
        };

        if self.parallel {
            self.flock
                .boids_mut()
                .par_iter_mut()
                .enumerate()
                .for_each_init(|| Vec::with_capacity(NEIGHBOR_LIMIT), query);
        } else {
            let mut scratch = Vec::with_capacity(NEIGHBOR_LIMIT);
            for entry in self.flock.boids_mut().iter_mut().enumerate() {
                query(&mut scratch, entry);
            }
        }
    }

    fn integrate(&mut self, params: &TickParams, dt: f32) {
        let view = FlockView {
            positions: &self.positions,
            headings: &self.headings,
        };
        let bounds = self.bounds;

        if self.parallel {
            self.flock
                .boids_mut()
                .par_iter_mut()
                .for_each(|boid| boid.advance(&view, params, &bounds, dt));
        } else {
            for boid in self.flock.boids_mut() {
                boid.advance(&view, params, &bounds, dt);
            }
        }
    }
}
