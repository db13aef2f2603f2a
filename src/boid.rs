/*
 * Boid Module
 *
 * This module defines the Boid struct and its behavior in 3D.
 * Each boid flies along its forward heading and steers by:
 * 1. Cohesion: Steer towards the average position of neighbors
 * 2. Separation: Avoid crowding neighbors, closer ones push harder
 * 3. Alignment: Steer towards the average heading of neighbors
 * 4. Origin avoidance: Keep away from the center of the cube
 * 5. Boundary handling: Turn back into the cube instead of escaping
 *
 * Steering is limited by the species turn rate, so a boid never reverses
 * direction instantly. Only a boundary reflection bypasses that limit.
 */

use glam::{DVec3, Mat3, Quat, Vec3};
use rand::Rng;

use crate::params::{OriginAvoidance, SpeciesParams, TickParams};
use crate::species::Species;
use crate::{CUBE_SIZE, MAX_BOIDS, NEIGHBOR_LIMIT};

// Boids spawn a little inside the cube walls
pub const SPAWN_FRACTION: f32 = 0.95;

// Neighbors closer than this fraction of the vision radius push the boid away
pub const SEPARATION_FRACTION: f32 = 0.5;

// Weight of the inward pull for a boid outside the cube
pub const BOUNDARY_STEER: f32 = 1.0;

// Position plus orientation. Forward is -Z, up is +Y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    // Orientation whose forward points along `direction`, keeping `up` as close to vertical as possible
    pub fn look_rotation(direction: Vec3, up: Vec3) -> Option<Quat> {
        let forward = direction.try_normalize()?;
        let right = forward.cross(up).try_normalize()?;
        let true_up = right.cross(forward);
        Some(Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward)).normalize())
    }

    pub fn looking_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let orientation = Self::look_rotation(target - position, up).unwrap_or(Quat::IDENTITY);
        Self::new(position, orientation)
    }

    // Turn a fraction `amount` of the way towards facing `target`.
    // A target straight along `up` has no roll reference, so the shortest arc is used instead.
    pub fn face_toward(&mut self, target: Vec3, up: Vec3, amount: f32) {
        let Some(direction) = (target - self.position).try_normalize() else {
            return;
        };
        let goal = Self::look_rotation(direction, up).unwrap_or_else(|| {
            (Quat::from_rotation_arc(self.forward().normalize(), direction) * self.orientation)
                .normalize()
        });
        self.orientation = self.orientation.slerp(goal, amount.clamp(0.0, 1.0)).normalize();
    }
}

// Axis-aligned cube the flock lives in
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub half_extent: f32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            half_extent: CUBE_SIZE,
        }
    }
}

impl Bounds {
    pub fn contains(&self, point: Vec3) -> bool {
        (point - self.center).abs().cmple(Vec3::splat(self.half_extent)).all()
    }
}

// Read-only view of the flock as it was at the start of the tick
pub struct FlockView<'a> {
    pub positions: &'a [Vec3],
    pub headings: &'a [Vec3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Boid {
    pub pose: Pose,
    pub species: Species,
    pub speed_multiplier: f32,
    // Indices of the neighbors found this tick, never our own, at most NEIGHBOR_LIMIT
    neighbors: Vec<u16>,
}

impl Boid {
    pub fn new(pose: Pose, species: Species) -> Self {
        Self {
            pose,
            species,
            speed_multiplier: species.speed_multiplier(),
            neighbors: Vec::with_capacity(NEIGHBOR_LIMIT),
        }
    }

    // Random position inside the bounds and a random orientation
    pub fn randomized<R: Rng + ?Sized>(rng: &mut R, species: Species, bounds: &Bounds) -> Self {
        let reach = bounds.half_extent * SPAWN_FRACTION;
        let offset = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        ) * reach;

        let q = Quat::from_xyzw(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let orientation = if q.length_squared() > 1e-6 {
            q.normalize()
        } else {
            Quat::IDENTITY
        };

        Self::new(Pose::new(bounds.center + offset, orientation), species)
    }

    pub fn neighbors(&self) -> &[u16] {
        &self.neighbors
    }

    // Replace the neighbor list; drops our own index and anything past the limit
    pub fn set_neighbors(&mut self, own_index: usize, neighbors: impl IntoIterator<Item = usize>) {
        self.neighbors.clear();
        for n in neighbors {
            if self.neighbors.len() >= NEIGHBOR_LIMIT {
                break;
            }
            if n != own_index && n < MAX_BOIDS {
                self.neighbors.push(n as u16);
            }
        }
    }

    // Push away from the origin once within `distance`, fading out at the edge
    pub fn origin_avoidance(&self, avoidance: &OriginAvoidance) -> Vec3 {
        let d = self.pose.position.length();
        if d <= 0.0 || d >= avoidance.distance {
            return Vec3::ZERO;
        }
        self.pose.position / d * avoidance.strength * (1.0 - d / avoidance.distance)
    }

    // Pull back towards the interior on every axis where we are outside the cube
    pub fn boundary_steering(&self, bounds: &Bounds) -> Vec3 {
        let local = self.pose.position - bounds.center;
        let mut steer = Vec3::ZERO;
        for axis in 0..3 {
            if local[axis] > bounds.half_extent {
                steer[axis] = -BOUNDARY_STEER;
            } else if local[axis] < -bounds.half_extent {
                steer[axis] = BOUNDARY_STEER;
            }
        }
        steer
    }

    // Weighted sum of cohesion, separation and alignment for the cached neighbor list
    pub fn flocking_forces(&self, view: &FlockView, params: &SpeciesParams) -> Vec3 {
        if self.neighbors.is_empty() {
            return Vec3::ZERO;
        }

        let position = self.pose.position;
        let separation_radius = params.vision_radius * SEPARATION_FRACTION;

        let mut centroid = Vec3::ZERO;
        let mut heading = Vec3::ZERO;
        let mut separation = Vec3::ZERO;
        let mut separation_count = 0;

        for &n in &self.neighbors {
            let n = n as usize;
            let other = view.positions[n];
            centroid += other;
            heading += view.headings[n];

            let offset = position - other;
            let d = offset.length();
            if d > 0.0 && d < separation_radius {
                // Weight by distance (closer boids have more influence)
                separation += offset / (d * d);
                separation_count += 1;
            }
        }

        let count = self.neighbors.len() as f32;
        let cohesion = (centroid / count - position).normalize_or_zero() * params.cohesion;
        let alignment = (heading / count).normalize_or_zero() * params.alignment;
        let separation = if separation_count > 0 {
            (separation / separation_count as f32).clamp_length_max(1.0) * params.separation
        } else {
            Vec3::ZERO
        };

        cohesion + separation + alignment
    }

    // Rotate towards `desired` by at most `max_angle` radians
    pub fn turn_toward(&mut self, desired: Vec3, max_angle: f32) {
        let Some(target) = desired.try_normalize() else {
            return;
        };
        let forward = self.pose.forward();
        let angle = forward.angle_between(target);
        if !(angle > 1e-6) {
            return;
        }

        let full = Quat::from_rotation_arc(forward, target);
        let rotation = if angle > max_angle {
            Quat::IDENTITY.slerp(full, max_angle / angle)
        } else {
            full
        };
        self.pose.orientation = (rotation * self.pose.orientation).normalize();
    }

    // Mirror the heading on every axis where the next step would carry us out of the cube
    pub fn reflect_at_boundary(&mut self, bounds: &Bounds, step: f32) {
        let forward = self.pose.forward();
        let next = self.pose.position - bounds.center + forward * step;

        let mut mirrored = forward;
        for axis in 0..3 {
            let leaving_high = next[axis] > bounds.half_extent && forward[axis] > 0.0;
            let leaving_low = next[axis] < -bounds.half_extent && forward[axis] < 0.0;
            if leaving_high || leaving_low {
                mirrored[axis] = -mirrored[axis];
            }
        }

        if mirrored != forward {
            let rotation = Quat::from_rotation_arc(forward, mirrored.normalize());
            self.pose.orientation = (rotation * self.pose.orientation).normalize();
        }
    }

    // Advance along the forward heading
    pub fn update_position(&mut self, step: f32) {
        self.pose.position += self.pose.forward() * step;
    }

    // One full update: steering, turn limit, boundary, integration
    pub fn advance(&mut self, view: &FlockView, params: &TickParams, bounds: &Bounds, dt: f32) {
        let species = params.for_species(self.species);

        let mut steering = self.origin_avoidance(&params.origin_avoidance);
        if params.boundary_handling {
            steering += self.boundary_steering(bounds);
        }
        steering += self.flocking_forces(view, species);

        if steering != Vec3::ZERO {
            let forward = self.pose.forward();
            self.turn_toward(forward + steering, species.turn_rate);
        }

        let step = params.time_step * dt * self.speed_multiplier;
        let before = self.pose.position;
        if params.boundary_handling {
            self.reflect_at_boundary(bounds, step);
        }
        self.update_position(step);

        if params.boundary_handling {
            // Snaps back an axis that started inside: rounding after a reflection,
            // or a step longer than the cube that crosses the opposite wall
            let local_before = before - bounds.center;
            let local = self.pose.position - bounds.center;
            for axis in 0..3 {
                if local_before[axis].abs() <= bounds.half_extent
                    && local[axis].abs() > bounds.half_extent
                {
                    self.pose.position[axis] =
                        bounds.center[axis] + bounds.half_extent * local[axis].signum();
                }
            }
        }
    }
}

pub struct Flock {
    boids: Vec<Boid>,
}

impl Flock {
    // Spawn `count` boids with random poses and species by index bucket. Counts above MAX_BOIDS are truncated.
    pub fn spawn<R: Rng + ?Sized>(count: usize, bounds: &Bounds, rng: &mut R) -> Self {
        if count > MAX_BOIDS {
            tracing::warn!(requested = count, capacity = MAX_BOIDS, "agent count truncated");
        }
        let count = count.min(MAX_BOIDS);
        let boids: Vec<Boid> = (0..count)
            .map(|i| Boid::randomized(&mut *rng, Species::for_slot(i, count), bounds))
            .collect();
        for species in Species::ALL {
            let members = boids.iter().filter(|b| b.species == species).count();
            tracing::debug!(%species, members, "spawned");
        }
        Self { boids }
    }

    pub fn from_boids(mut boids: Vec<Boid>) -> Self {
        boids.truncate(MAX_BOIDS);
        Self { boids }
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn boids_mut(&mut self) -> &mut [Boid] {
        &mut self.boids
    }

    pub fn get(&self, index: usize) -> Option<&Boid> {
        self.boids.get(index)
    }

    // Positions and headings copied into the caller's buffers
    pub fn capture(&self, positions: &mut Vec<Vec3>, headings: &mut Vec<Vec3>) {
        positions.clear();
        headings.clear();
        positions.extend(self.boids.iter().map(|b| b.pose.position));
        headings.extend(self.boids.iter().map(|b| b.pose.forward()));
    }

    pub fn center_of_mass(&self) -> Option<Vec3> {
        let positions: Vec<Vec3> = self.boids.iter().map(|b| b.pose.position).collect();
        center_of_mass(&positions)
    }

    // Pose and species per boid, for whoever draws the flock
    pub fn render_items(&self) -> impl Iterator<Item = (Pose, Species)> + '_ {
        self.boids.iter().map(|b| (b.pose, b.species))
    }

    // Each neighbor relation once, as (lower, higher) index, for debug lines
    pub fn neighbor_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, boid) in self.boids.iter().enumerate() {
            for &j in boid.neighbors() {
                let j = j as usize;
                if j != i && j < self.boids.len() {
                    pairs.push((i.min(j), i.max(j)));
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

// Sum then divide, in f64, so the result does not depend on visiting order beyond rounding
pub fn center_of_mass(points: &[Vec3]) -> Option<Vec3> {
    if points.is_empty() {
        return None;
    }
    let sum: DVec3 = points.iter().map(|p| p.as_dvec3()).sum();
    Some((sum / points.len() as f64).as_vec3())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SimulationParams;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn facing(position: Vec3, direction: Vec3) -> Boid {
        Boid::new(Pose::looking_at(position, position + direction, Vec3::Y), Species::DarkBlue)
    }

    #[test]
    fn face_toward_target_straight_above() {
        let start = Vec3::new(5.0, 0.0, 0.0);
        let mut pose = Pose::looking_at(start, Vec3::ZERO, Vec3::Y);
        let target = Vec3::new(5.0, 10.0, 0.0);
        assert!(Pose::look_rotation(target - start, Vec3::Y).is_none());

        let before = pose.forward().dot(Vec3::Y);
        pose.face_toward(target, Vec3::Y, 0.2);
        assert!(pose.forward().dot(Vec3::Y) > before);
        assert!((pose.orientation.length() - 1.0).abs() < 1e-5);

        for _ in 0..60 {
            pose.face_toward(target, Vec3::Y, 0.2);
        }
        assert!(pose.forward().dot(Vec3::Y) > 0.999);
    }

    #[test]
    fn face_toward_own_position_is_a_no_op() {
        let mut pose = Pose::looking_at(Vec3::X, Vec3::ZERO, Vec3::Y);
        let before = pose;
        pose.face_toward(Vec3::X, Vec3::Y, 0.5);
        assert_eq!(pose, before);
    }

    #[test]
    fn looking_at_points_forward_at_target() {
        let pose = Pose::looking_at(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, Vec3::Y);
        assert!(pose.forward().abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(pose.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn set_neighbors_drops_self_and_caps() {
        let mut boid = facing(Vec3::ZERO, Vec3::X);
        boid.set_neighbors(3, 0..(NEIGHBOR_LIMIT + 50));
        assert_eq!(boid.neighbors().len(), NEIGHBOR_LIMIT);
        assert!(!boid.neighbors().contains(&3));
    }

    #[test]
    fn origin_avoidance_pushes_outward_and_fades() {
        let avoidance = OriginAvoidance::default();
        let near = facing(Vec3::new(0.5, 0.0, 0.0), Vec3::Y);
        let push = near.origin_avoidance(&avoidance);
        assert!(push.x > 0.0);
        assert_eq!(push.y, 0.0);

        let far = facing(Vec3::new(3.0, 0.0, 0.0), Vec3::Y);
        assert_eq!(far.origin_avoidance(&avoidance), Vec3::ZERO);
    }

    #[test]
    fn cohesion_steers_towards_centroid() {
        let positions = [Vec3::ZERO, Vec3::new(0.4, 0.0, 0.0), Vec3::new(0.4, 0.2, 0.0)];
        let headings = [Vec3::NEG_Z; 3];
        let view = FlockView {
            positions: &positions,
            headings: &headings,
        };
        let mut boid = facing(Vec3::ZERO, Vec3::NEG_Z);
        boid.set_neighbors(0, [1, 2]);

        let params = SpeciesParams {
            vision_radius: 1.0,
            cohesion: 1.0,
            separation: 0.0,
            alignment: 0.0,
            turn_rate: 1.0,
        };
        let force = boid.flocking_forces(&view, &params);
        assert!(force.x > 0.0);
        assert!(force.y > 0.0);
        assert!((force.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn separation_prefers_closer_neighbors() {
        let positions = [Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.0, -0.3, 0.0)];
        let headings = [Vec3::NEG_Z; 3];
        let view = FlockView {
            positions: &positions,
            headings: &headings,
        };
        let mut boid = facing(Vec3::ZERO, Vec3::NEG_Z);
        boid.set_neighbors(0, [1, 2]);

        let params = SpeciesParams {
            vision_radius: 1.0,
            cohesion: 0.0,
            separation: 1.0,
            alignment: 0.0,
            turn_rate: 1.0,
        };
        let force = boid.flocking_forces(&view, &params);
        // Away from both, but mostly away from the closer one on +x
        assert!(force.x < 0.0);
        assert!(force.y > 0.0);
        assert!(force.x.abs() > force.y.abs());
    }

    #[test]
    fn turn_rate_caps_rotation() {
        let mut boid = facing(Vec3::ZERO, Vec3::NEG_Z);
        boid.turn_toward(Vec3::X, 0.1);
        let angle = boid.pose.forward().angle_between(Vec3::NEG_Z);
        assert!((angle - 0.1).abs() < 1e-4, "turned {angle}");
    }

    #[test]
    fn reflection_turns_outward_heading_inward() {
        let bounds = Bounds::default();
        let mut boid = facing(Vec3::new(CUBE_SIZE, 0.0, 0.0), Vec3::new(1.0, 0.5, 0.0));
        boid.reflect_at_boundary(&bounds, 0.1);
        let forward = boid.pose.forward();
        assert!(forward.x < 0.0);
        assert!(forward.y > 0.0);
    }

    #[test]
    fn center_of_mass_of_nothing_is_none() {
        assert_eq!(center_of_mass(&[]), None);
        assert_eq!(
            center_of_mass(&[Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)]),
            Some(Vec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn spawn_truncates_and_stays_inside() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let bounds = Bounds::default();
        let flock = Flock::spawn(MAX_BOIDS + 10, &bounds, &mut rng);
        assert_eq!(flock.len(), MAX_BOIDS);
        assert!(flock.boids().iter().all(|b| bounds.contains(b.pose.position)));
        assert!(flock.boids().iter().all(|b| b.neighbors().is_empty()));
        assert_eq!(flock.boids()[0].species, Species::Yellow);
        assert_eq!(flock.boids()[MAX_BOIDS - 1].species, Species::DarkBlue);
    }

    #[test]
    fn step_longer_than_cube_lands_on_opposite_wall() {
        let bounds = Bounds::default();
        let mut params = SimulationParams::default().with_all_species(SpeciesParams {
            vision_radius: 0.7,
            cohesion: 0.0,
            separation: 0.0,
            alignment: 0.0,
            turn_rate: 0.3,
        });
        params.origin_avoidance.strength = 0.0;
        let params = params.freeze();
        let view = FlockView { positions: &[], headings: &[] };

        let mut boid = facing(Vec3::new(CUBE_SIZE - 0.1, 0.0, 0.0), Vec3::X);
        let dt = 3.0 * CUBE_SIZE / (params.time_step * boid.speed_multiplier);
        boid.advance(&view, &params, &bounds, dt);

        let p = boid.pose.position;
        assert!(bounds.contains(p), "escaped to {p:?}");
        assert!((p.x + CUBE_SIZE).abs() < 1e-4);
        assert!(boid.pose.forward().x < 0.0);
    }

    #[test]
    fn neighbor_pairs_are_unique_and_ordered() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut flock = Flock::spawn(4, &Bounds::default(), &mut rng);
        flock.boids_mut()[0].set_neighbors(0, [1, 2]);
        flock.boids_mut()[1].set_neighbors(1, [0]);
        flock.boids_mut()[3].set_neighbors(3, [2]);
        assert_eq!(flock.neighbor_pairs(), vec![(0, 1), (0, 2), (2, 3)]);
    }

    proptest! {
        #[test]
        fn proptest_center_of_mass_ignores_order(
            points in proptest::collection::vec(
                (-20.0f32..20.0, -20.0f32..20.0, -20.0f32..20.0).prop_map(|(x, y, z)| Vec3::new(x, y, z)),
                1..300,
            ),
            seed in any::<u64>(),
        ) {
            let mut shuffled = points.clone();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rand::seq::SliceRandom::shuffle(shuffled.as_mut_slice(), &mut rng);

            let a = center_of_mass(&points).expect("non-empty");
            let b = center_of_mass(&shuffled).expect("non-empty");
            prop_assert!(a.abs_diff_eq(b, 1e-5));
        }

        #[test]
        fn proptest_boundary_keeps_boid_inside(
            (x, y, z) in (-20.0f32..=20.0, -20.0f32..=20.0, -20.0f32..=20.0),
            (qx, qy, qz, qw) in (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, 0.1f32..1.0),
            ticks in 1usize..200,
        ) {
            let bounds = Bounds::default();
            let mut params = SimulationParams::default().with_all_species(SpeciesParams {
                vision_radius: 0.7,
                cohesion: 0.0,
                separation: 0.0,
                alignment: 0.0,
                turn_rate: 0.3,
            });
            params.origin_avoidance.strength = 0.0;
            let params = params.freeze();
            let view = FlockView { positions: &[], headings: &[] };
            let mut boid = Boid::new(
                Pose::new(Vec3::new(x, y, z), Quat::from_xyzw(qx, qy, qz, qw).normalize()),
                Species::Yellow,
            );
            for _ in 0..ticks {
                boid.advance(&view, &params, &bounds, 1.0 / 60.0);
                prop_assert!(bounds.contains(boid.pose.position), "escaped to {:?}", boid.pose.position);
            }
        }
    }
}
