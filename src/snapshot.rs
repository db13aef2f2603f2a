/*
 * Snapshot Module
 *
 * SharedSnapshot is the only data that crosses from the primary to its
 * replicas. It always has room for MAX_BOIDS poses and a full
 * MAX_BOIDS x NEIGHBOR_LIMIT neighbor table, whatever the live agent count.
 * Unused neighbor slots hold NO_NEIGHBOR.
 */

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};

use crate::boid::{Flock, Pose};
use crate::{MAX_BOIDS, NEIGHBOR_LIMIT, NO_NEIGHBOR};

// Flat, plain-old-data pose: position then orientation as x, y, z, w
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PoseRecord {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl PoseRecord {
    pub const IDENTITY: PoseRecord = PoseRecord {
        position: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };
}

impl From<Pose> for PoseRecord {
    fn from(pose: Pose) -> Self {
        Self {
            position: pose.position.to_array(),
            orientation: pose.orientation.to_array(),
        }
    }
}

impl From<PoseRecord> for Pose {
    fn from(record: PoseRecord) -> Self {
        Pose::new(
            Vec3::from_array(record.position),
            Quat::from_array(record.orientation),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SharedSnapshot {
    pub tick: u64,
    pub point_size: f32,
    // Number of logically active agents, the remaining slots are padding
    pub active: u32,
    pub poses: Vec<PoseRecord>,
    // Row-major, NEIGHBOR_LIMIT entries per agent
    pub neighbors: Vec<u16>,
    pub viewer: PoseRecord,
    pub center_of_mass: [f32; 3],
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            point_size: 0.0,
            active: 0,
            poses: vec![PoseRecord::IDENTITY; MAX_BOIDS],
            neighbors: vec![NO_NEIGHBOR; MAX_BOIDS * NEIGHBOR_LIMIT],
            viewer: PoseRecord::IDENTITY,
            center_of_mass: [0.0; 3],
        }
    }
}

impl SharedSnapshot {
    // Fill every slot from the flock; slots past the flock keep identity poses and empty rows
    pub fn capture(
        flock: &Flock,
        tick: u64,
        point_size: f32,
        viewer: Pose,
        center_of_mass: Vec3,
    ) -> Self {
        let mut snapshot = Self {
            tick,
            point_size,
            active: flock.len() as u32,
            viewer: viewer.into(),
            center_of_mass: center_of_mass.to_array(),
            ..Self::default()
        };

        for (i, boid) in flock.boids().iter().enumerate() {
            snapshot.poses[i] = boid.pose.into();
            let row = snapshot.neighbor_row_mut(i);
            for (slot, &n) in row.iter_mut().zip(boid.neighbors()) {
                *slot = n;
            }
        }
        snapshot
    }

    // True when the pose and neighbor tables have rows for every active agent
    pub fn holds_active(&self) -> bool {
        let active = self.active as usize;
        active <= MAX_BOIDS
            && self.poses.len() >= active
            && self.neighbors.len() >= active * NEIGHBOR_LIMIT
    }

    pub fn neighbor_row(&self, index: usize) -> &[u16] {
        &self.neighbors[index * NEIGHBOR_LIMIT..(index + 1) * NEIGHBOR_LIMIT]
    }

    fn neighbor_row_mut(&mut self, index: usize) -> &mut [u16] {
        &mut self.neighbors[index * NEIGHBOR_LIMIT..(index + 1) * NEIGHBOR_LIMIT]
    }

    // Live entries of a row, stopping at the first sentinel
    pub fn neighbors_of(&self, index: usize) -> impl Iterator<Item = u16> + '_ {
        self.neighbor_row(index)
            .iter()
            .copied()
            .take_while(|&n| n != NO_NEIGHBOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boid::Bounds;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn default_is_full_capacity_and_padded() {
        let snapshot = SharedSnapshot::default();
        assert_eq!(snapshot.poses.len(), MAX_BOIDS);
        assert_eq!(snapshot.neighbors.len(), MAX_BOIDS * NEIGHBOR_LIMIT);
        assert!(snapshot.neighbors.iter().all(|&n| n == NO_NEIGHBOR));
    }

    #[test]
    fn capture_pads_rows_after_live_neighbors() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut flock = Flock::spawn(10, &Bounds::default(), &mut rng);
        flock.boids_mut()[2].set_neighbors(2, [4, 7]);

        let snapshot = SharedSnapshot::capture(&flock, 5, 0.5, Pose::IDENTITY, Vec3::ZERO);
        assert_eq!(snapshot.active, 10);
        assert_eq!(snapshot.neighbors_of(2).collect::<Vec<_>>(), vec![4, 7]);
        assert_eq!(snapshot.neighbor_row(2)[2], NO_NEIGHBOR);
        assert_eq!(snapshot.neighbors_of(3).count(), 0);
        assert_eq!(snapshot.poses[9], PoseRecord::from(flock.boids()[9].pose));
        assert_eq!(snapshot.poses[10], PoseRecord::IDENTITY);
    }

    #[test]
    fn truncated_tables_do_not_hold_active() {
        assert!(SharedSnapshot::default().holds_active());

        let short = SharedSnapshot {
            active: 10,
            poses: vec![PoseRecord::IDENTITY; 4],
            ..SharedSnapshot::default()
        };
        assert!(!short.holds_active());

        let over = SharedSnapshot {
            active: MAX_BOIDS as u32 + 1,
            ..SharedSnapshot::default()
        };
        assert!(!over.holds_active());
    }

    #[test]
    fn pose_record_conversion_is_lossless() {
        let pose = Pose::new(Vec3::new(1.5, -2.25, 3.0), Quat::from_rotation_y(0.7));
        let back: Pose = PoseRecord::from(pose).into();
        assert_eq!(back, pose);
    }
}
