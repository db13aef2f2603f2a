/*
 * Simulation Parameters Module
 *
 * This module defines the live-tunable parameters of the flock: one bundle per
 * species plus a few global scalars. The parameter source (config file or UI)
 * clamps every value into its documented range; the simulation freezes a copy
 * at the start of each tick so a tick never sees a half-edited set.
 */

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::species::Species;

// Per-species flocking parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParams {
    pub vision_radius: f32,
    pub cohesion: f32,
    pub separation: f32,
    pub alignment: f32,
    pub turn_rate: f32,
}

impl SpeciesParams {
    pub fn defaults_for(species: Species) -> Self {
        match species {
            Species::DarkBlue => Self {
                vision_radius: 0.7,
                cohesion: 0.625,
                separation: 0.65,
                alignment: 0.8,
                turn_rate: 0.3,
            },
            Species::Yellow => Self {
                vision_radius: 0.7,
                cohesion: 0.625,
                separation: 0.75,
                alignment: 1.0,
                turn_rate: 0.6,
            },
            Species::White => Self {
                vision_radius: 0.7,
                cohesion: 0.625,
                separation: 0.65,
                alignment: 0.75,
                turn_rate: 0.3,
            },
        }
    }

    fn clamped(self) -> Self {
        Self {
            vision_radius: clamp_to(self.vision_radius, SimulationParams::get_vision_radius_range()),
            cohesion: clamp_to(self.cohesion, SimulationParams::get_weight_range()),
            separation: clamp_to(self.separation, SimulationParams::get_weight_range()),
            alignment: clamp_to(self.alignment, SimulationParams::get_weight_range()),
            turn_rate: clamp_to(self.turn_rate, SimulationParams::get_turn_rate_range()),
        }
    }
}

// Steering bias that keeps boids from piling up at the origin
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginAvoidance {
    pub distance: f32,
    pub strength: f32,
}

impl Default for OriginAvoidance {
    fn default() -> Self {
        Self {
            distance: 2.0,
            strength: 2.0,
        }
    }
}

// Parameters for the simulation that can be adjusted via config or UI
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub time_step: f32,
    pub point_size: f32,
    pub dark_blue: SpeciesParams,
    pub yellow: SpeciesParams,
    pub white: SpeciesParams,
    pub origin_avoidance: OriginAvoidance,
    pub boundary_handling: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            time_step: 3.0,
            point_size: 0.5,
            dark_blue: SpeciesParams::defaults_for(Species::DarkBlue),
            yellow: SpeciesParams::defaults_for(Species::Yellow),
            white: SpeciesParams::defaults_for(Species::White),
            origin_avoidance: OriginAvoidance::default(),
            boundary_handling: true,
        }
    }
}

impl SimulationParams {
    pub fn species(&self, species: Species) -> &SpeciesParams {
        match species {
            Species::DarkBlue => &self.dark_blue,
            Species::Yellow => &self.yellow,
            Species::White => &self.white,
        }
    }

    pub fn species_mut(&mut self, species: Species) -> &mut SpeciesParams {
        match species {
            Species::DarkBlue => &mut self.dark_blue,
            Species::Yellow => &mut self.yellow,
            Species::White => &mut self.white,
        }
    }

    // Set every species to the same bundle (handy for scenarios and tests)
    pub fn with_all_species(mut self, bundle: SpeciesParams) -> Self {
        self.dark_blue = bundle;
        self.yellow = bundle;
        self.white = bundle;
        self
    }

    // Clamp every value into its documented range. Called by the parameter source.
    pub fn clamped(self) -> Self {
        Self {
            time_step: clamp_to(self.time_step, Self::get_time_step_range()),
            point_size: clamp_to(self.point_size, Self::get_point_size_range()),
            dark_blue: self.dark_blue.clamped(),
            yellow: self.yellow.clamped(),
            white: self.white.clamped(),
            origin_avoidance: OriginAvoidance {
                distance: self.origin_avoidance.distance.max(0.0),
                strength: self.origin_avoidance.strength.max(0.0),
            },
            boundary_handling: self.boundary_handling,
        }
    }

    // Immutable copy read once at the start of a tick
    pub fn freeze(&self) -> TickParams {
        TickParams {
            time_step: self.time_step,
            point_size: self.point_size,
            species: Species::ALL.map(|s| *self.species(s)),
            origin_avoidance: self.origin_avoidance,
            boundary_handling: self.boundary_handling,
        }
    }

    // Get parameter ranges for UI sliders
    pub fn get_time_step_range() -> RangeInclusive<f32> {
        0.0333..=3.0
    }

    pub fn get_point_size_range() -> RangeInclusive<f32> {
        0.05..=6.0
    }

    pub fn get_vision_radius_range() -> RangeInclusive<f32> {
        0.05..=1.5
    }

    pub fn get_weight_range() -> RangeInclusive<f32> {
        0.0..=1.0
    }

    pub fn get_turn_rate_range() -> RangeInclusive<f32> {
        0.0001..=1.0
    }
}

// Frozen parameter set for one tick, indexed by species ordinal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickParams {
    pub time_step: f32,
    pub point_size: f32,
    pub species: [SpeciesParams; 3],
    pub origin_avoidance: OriginAvoidance,
    pub boundary_handling: bool,
}

impl TickParams {
    #[inline]
    pub fn for_species(&self, species: Species) -> &SpeciesParams {
        &self.species[species.ordinal()]
    }
}

// NaN is pulled to the lower bound
fn clamp_to(value: f32, range: RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}
