/*
 * Replication Module
 *
 * The primary publishes one SharedSnapshot per tick into a slot that only
 * ever holds the latest value. Replicas fetch whatever is current and copy it
 * into their Mirror; they never run the flocking rules themselves.
 *
 * Publishing replaces the slot content with a new Arc, so a reader sees either
 * the previous snapshot or the new one in full. Nothing is queued and a slow
 * reader simply skips ticks.
 */

use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use tokio::sync::watch;

use crate::boid::{Boid, Bounds, Flock, Pose};
use crate::snapshot::SharedSnapshot;
use crate::species::Species;

pub trait SnapshotSink {
    // Never blocks; replaces whatever was published before
    fn publish(&self, snapshot: SharedSnapshot);
}

pub trait SnapshotSource {
    // Latest snapshot, or None if nothing was ever published
    fn fetch(&self) -> Option<Arc<SharedSnapshot>>;
}

// In-process slot. Clones share the same value.
#[derive(Clone)]
pub struct SnapshotSlot {
    sender: Arc<watch::Sender<Option<Arc<SharedSnapshot>>>>,
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSlot {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    // Receiver that wakes whenever a new snapshot lands
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SharedSnapshot>>> {
        self.sender.subscribe()
    }

    pub fn publish_shared(&self, snapshot: Arc<SharedSnapshot>) {
        // send_replace succeeds even when nobody is subscribed
        self.sender.send_replace(Some(snapshot));
    }

    pub fn latest_tick(&self) -> Option<u64> {
        self.sender.borrow().as_ref().map(|s| s.tick)
    }
}

impl SnapshotSink for SnapshotSlot {
    fn publish(&self, snapshot: SharedSnapshot) {
        self.publish_shared(Arc::new(snapshot));
    }
}

impl SnapshotSource for SnapshotSlot {
    fn fetch(&self) -> Option<Arc<SharedSnapshot>> {
        self.sender.borrow().clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    // A newer snapshot was copied into the mirror
    Applied { tick: u64 },
    // The latest snapshot was already applied
    Unchanged { tick: u64 },
    // Nothing published yet, the mirror keeps its initial state
    NoSnapshot,
    // The snapshot lacks rows for its active agents; the mirror keeps its last state
    Rejected { tick: u64 },
}

// Replica-side copy of the flock
pub struct Mirror {
    flock: Flock,
    viewer: Pose,
    point_size: f32,
    center_of_mass: Vec3,
    last_tick: Option<u64>,
    rejected_tick: Option<u64>,
}

impl Mirror {
    // Randomized like the primary's flock until the first snapshot arrives
    pub fn new<R: Rng + ?Sized>(count: usize, bounds: &Bounds, rng: &mut R) -> Self {
        Self {
            flock: Flock::spawn(count, bounds, rng),
            viewer: Pose::IDENTITY,
            point_size: 0.0,
            center_of_mass: bounds.center,
            last_tick: None,
            rejected_tick: None,
        }
    }

    pub fn flock(&self) -> &Flock {
        &self.flock
    }

    pub fn viewer(&self) -> Pose {
        self.viewer
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    pub fn sync(&mut self, source: &impl SnapshotSource) -> SyncStatus {
        let Some(snapshot) = source.fetch() else {
            return SyncStatus::NoSnapshot;
        };
        if self.last_tick == Some(snapshot.tick) {
            return SyncStatus::Unchanged {
                tick: snapshot.tick,
            };
        }
        if self.rejected_tick == Some(snapshot.tick) {
            return SyncStatus::Rejected {
                tick: snapshot.tick,
            };
        }
        self.apply(&snapshot)
    }

    // Overwrite poses and neighbor lists in place
    pub fn apply(&mut self, snapshot: &SharedSnapshot) -> SyncStatus {
        if !snapshot.holds_active() {
            tracing::warn!(
                tick = snapshot.tick,
                active = snapshot.active,
                poses = snapshot.poses.len(),
                neighbors = snapshot.neighbors.len(),
                "snapshot tables too short, keeping last state"
            );
            self.rejected_tick = Some(snapshot.tick);
            return SyncStatus::Rejected {
                tick: snapshot.tick,
            };
        }

        let active = snapshot.active as usize;
        if active != self.flock.len() {
            tracing::debug!(
                from = self.flock.len(),
                to = active,
                "mirror resized to match primary"
            );
            self.flock = Flock::from_boids(
                (0..active)
                    .map(|i| Boid::new(Pose::IDENTITY, Species::for_slot(i, active)))
                    .collect(),
            );
        }

        for ((i, boid), record) in self
            .flock
            .boids_mut()
            .iter_mut()
            .enumerate()
            .zip(&snapshot.poses)
        {
            boid.pose = (*record).into();
            boid.set_neighbors(i, snapshot.neighbors_of(i).map(usize::from));
        }

        self.viewer = snapshot.viewer.into();
        self.point_size = snapshot.point_size;
        self.center_of_mass = Vec3::from_array(snapshot.center_of_mass);
        self.last_tick = Some(snapshot.tick);
        self.rejected_tick = None;
        SyncStatus::Applied {
            tick: snapshot.tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::simulation::Simulation;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mirror(count: usize) -> Mirror {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        Mirror::new(count, &Bounds::default(), &mut rng)
    }

    #[test]
    fn empty_slot_leaves_mirror_alone() {
        let slot = SnapshotSlot::new();
        let mut replica = mirror(20);
        let before: Vec<Pose> = replica.flock().render_items().map(|(p, _)| p).collect();

        assert_eq!(replica.sync(&slot), SyncStatus::NoSnapshot);
        let after: Vec<Pose> = replica.flock().render_items().map(|(p, _)| p).collect();
        assert_eq!(before, after);
        assert_eq!(replica.last_tick(), None);
    }

    #[test]
    fn last_write_wins() {
        let slot = SnapshotSlot::new();
        let reader = slot.clone();
        for tick in 1..=3 {
            slot.publish(SharedSnapshot {
                tick,
                ..SharedSnapshot::default()
            });
        }
        assert_eq!(reader.fetch().map(|s| s.tick), Some(3));
        assert_eq!(reader.latest_tick(), Some(3));
    }

    #[test]
    fn sync_reports_unchanged_for_same_tick() {
        let slot = SnapshotSlot::new();
        slot.publish(SharedSnapshot {
            tick: 7,
            ..SharedSnapshot::default()
        });
        let mut replica = mirror(0);
        assert_eq!(replica.sync(&slot), SyncStatus::Applied { tick: 7 });
        assert_eq!(replica.sync(&slot), SyncStatus::Unchanged { tick: 7 });
    }

    #[test]
    fn applied_state_is_bit_identical() {
        let config = SimConfig {
            agent_count: 300,
            seed: Some(21),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(&config).expect("valid config");
        let slot = SnapshotSlot::new();
        let mut replica = mirror(300);

        for _ in 0..3 {
            slot.publish(sim.step(1.0 / 60.0));
        }
        assert_eq!(replica.sync(&slot), SyncStatus::Applied { tick: 3 });

        for (primary, copy) in sim.flock().boids().iter().zip(replica.flock().boids()) {
            assert_eq!(primary.pose.position.to_array(), copy.pose.position.to_array());
            assert_eq!(
                primary.pose.orientation.to_array(),
                copy.pose.orientation.to_array()
            );
            assert_eq!(primary.neighbors(), copy.neighbors());
            assert_eq!(primary.species, copy.species);
        }
        assert_eq!(replica.viewer(), sim.viewer());
        assert_eq!(replica.point_size(), sim.params.point_size);
    }

    #[test]
    fn short_snapshot_is_rejected_and_last_state_kept() {
        let slot = SnapshotSlot::new();
        slot.publish(SharedSnapshot {
            tick: 1,
            active: 20,
            ..SharedSnapshot::default()
        });
        let mut replica = mirror(20);
        assert_eq!(replica.sync(&slot), SyncStatus::Applied { tick: 1 });
        let before: Vec<Pose> = replica.flock().render_items().map(|(p, _)| p).collect();

        slot.publish(SharedSnapshot {
            tick: 2,
            active: 10,
            poses: vec![],
            neighbors: vec![],
            ..SharedSnapshot::default()
        });
        assert_eq!(replica.sync(&slot), SyncStatus::Rejected { tick: 2 });
        assert_eq!(replica.sync(&slot), SyncStatus::Rejected { tick: 2 });
        assert_eq!(replica.last_tick(), Some(1));
        let after: Vec<Pose> = replica.flock().render_items().map(|(p, _)| p).collect();
        assert_eq!(before, after);

        slot.publish(SharedSnapshot {
            tick: 3,
            active: 10,
            ..SharedSnapshot::default()
        });
        assert_eq!(replica.sync(&slot), SyncStatus::Applied { tick: 3 });
        assert_eq!(replica.flock().len(), 10);
    }

    #[test]
    fn mirror_follows_active_count() {
        let slot = SnapshotSlot::new();
        slot.publish(SharedSnapshot {
            tick: 1,
            active: 8,
            ..SharedSnapshot::default()
        });
        let mut replica = mirror(20);
        replica.sync(&slot);
        assert_eq!(replica.flock().len(), 8);
        assert_eq!(replica.flock().boids()[0].species, Species::Yellow);
        assert!(replica.flock().boids().iter().all(|b| b.neighbors().is_empty()));
    }
}
