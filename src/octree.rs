/*
 * Octree Module
 *
 * This module defines the Octree used for neighbor lookups. It is rebuilt from
 * scratch every tick from the current boid positions and answers cubic region
 * queries, so each boid only inspects the few leaves near it instead of the
 * whole flock.
 *
 * Optimized for performance by:
 * - Keeping nodes and indices in flat arenas that are cleared, not freed, on rebuild
 * - Storing leaf contents as contiguous ranges of one index buffer
 * - Pruning with the tight bounds of each node's points rather than its octant
 */

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{FlockError, Result};
use crate::{CUBE_SIZE, NEIGHBOR_LIMIT};

// A node holding more points than this is split, if it is still large enough
pub const LEAF_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    pub center: Vec3,
    pub half_extent: f32,
    // Nodes whose half-extent is at or below this never subdivide
    pub min_region_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            half_extent: CUBE_SIZE,
            min_region_size: 0.01,
        }
    }
}

impl OctreeConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.center.is_finite() {
            return Err(FlockError::Config(format!(
                "octree center must be finite, got {:?}",
                self.center
            )));
        }
        if !(self.half_extent.is_finite() && self.half_extent > 0.0) {
            return Err(FlockError::Config(format!(
                "octree half extent must be positive, got {}",
                self.half_extent
            )));
        }
        if !(self.min_region_size.is_finite() && self.min_region_size > 0.0) {
            return Err(FlockError::Config(format!(
                "octree minimum region size must be positive, got {}",
                self.min_region_size
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Node {
    center: Vec3,
    half_extent: f32,
    // Tight bounds of the points below this node, inverted when empty
    min: Vec3,
    max: Vec3,
    // Index of the first of eight consecutive children, 0 for a leaf
    first_child: u32,
    // Range into `indices`
    start: u32,
    end: u32,
}

impl Node {
    fn new(center: Vec3, half_extent: f32, start: u32, end: u32) -> Self {
        Self {
            center,
            half_extent,
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
            first_child: 0,
            start,
            end,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.first_child == 0
    }

    #[inline]
    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

pub struct Octree {
    config: OctreeConfig,
    nodes: Vec<Node>,
    indices: Vec<u32>,
    points: Vec<Vec3>,
    // Reused buffers for partitioning during a build
    octants: Vec<u8>,
    scratch: Vec<u32>,
}

impl Octree {
    pub fn new(config: OctreeConfig) -> Result<Self> {
        config.validate()?;
        let mut tree = Self {
            config,
            nodes: Vec::new(),
            indices: Vec::new(),
            points: Vec::new(),
            octants: Vec::new(),
            scratch: Vec::new(),
        };
        tree.clear();
        Ok(tree)
    }

    // Drop all points but keep the allocations
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.indices.clear();
        self.points.clear();
        self.nodes
            .push(Node::new(self.config.center, self.config.half_extent, 0, 0));
    }

    // Rebuild the whole tree from a point set, index i refers to points[i]
    pub fn build(&mut self, points: &[Vec3]) {
        self.clear();
        self.points.extend_from_slice(points);

        // Malformed positions are left out rather than poisoning the bounds
        self.indices.extend(
            points
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_finite())
                .map(|(i, _)| i as u32),
        );
        if points.len() != self.indices.len() {
            tracing::trace!(
                skipped = points.len() - self.indices.len(),
                "octree skipped non-finite points"
            );
        }

        self.nodes[0].end = self.indices.len() as u32;

        // Breadth-first: children are appended after their parent, so a single pass covers every node
        let mut current = 0;
        while current < self.nodes.len() {
            self.fit_bounds(current);
            let node = self.nodes[current];
            if node.len() > LEAF_CAPACITY && node.half_extent > self.config.min_region_size {
                self.split(current);
            }
            current += 1;
        }
    }

    fn fit_bounds(&mut self, id: usize) {
        let node = &self.nodes[id];
        let (mut min, mut max) = (node.min, node.max);
        for &i in &self.indices[node.start as usize..node.end as usize] {
            let p = self.points[i as usize];
            min = min.min(p);
            max = max.max(p);
        }
        let node = &mut self.nodes[id];
        node.min = min;
        node.max = max;
    }

    // Partition a node's index range into eight octant ranges with a counting sort
    fn split(&mut self, id: usize) {
        let node = self.nodes[id];
        let (start, end) = (node.start as usize, node.end as usize);

        self.octants.clear();
        let mut counts = [0u32; 8];
        for &i in &self.indices[start..end] {
            let octant = octant_of(node.center, self.points[i as usize]);
            counts[octant as usize] += 1;
            self.octants.push(octant);
        }

        let mut offsets = [0u32; 8];
        let mut running = 0;
        for (offset, count) in offsets.iter_mut().zip(counts.iter()) {
            *offset = running;
            running += count;
        }

        self.scratch.clear();
        self.scratch.resize(end - start, 0);
        let mut cursor = offsets;
        for (slot, &i) in self.indices[start..end].iter().enumerate() {
            let octant = self.octants[slot] as usize;
            self.scratch[cursor[octant] as usize] = i;
            cursor[octant] += 1;
        }
        self.indices[start..end].copy_from_slice(&self.scratch);

        let first_child = self.nodes.len() as u32;
        let child_half = node.half_extent * 0.5;
        for octant in 0..8 {
            let child_start = start as u32 + offsets[octant];
            let child_end = child_start + counts[octant];
            self.nodes.push(Node::new(
                octant_center(node.center, child_half, octant),
                child_half,
                child_start,
                child_end,
            ));
        }
        self.nodes[id].first_child = first_child;
    }

    // Indices of all points inside the axis-aligned box of half-extent `radius` around `center`.
    // Results stop silently at NEIGHBOR_LIMIT.
    pub fn query_region(&self, center: Vec3, radius: f32, out: &mut Vec<usize>) {
        out.clear();
        self.collect(0, center, radius, None, out);
    }

    // Like `query_region`, but never reports `index` itself
    pub fn query_neighbors(&self, index: usize, center: Vec3, radius: f32, out: &mut Vec<usize>) {
        out.clear();
        self.collect(0, center, radius, Some(index), out);
    }

    // Returns false once the output is full
    fn collect(
        &self,
        id: usize,
        center: Vec3,
        radius: f32,
        skip: Option<usize>,
        out: &mut Vec<usize>,
    ) -> bool {
        let node = &self.nodes[id];

        // Pruning box is padded so rounding in `center ± radius` never hides a point
        // that the exact per-point test below would accept
        let slack = 1e-4 * (1.0 + radius + center.abs().max_element());
        let lo = center - Vec3::splat(radius + slack);
        let hi = center + Vec3::splat(radius + slack);

        // Empty nodes have inverted bounds and never intersect
        if node.len() == 0 || !(node.min.cmple(hi).all() && node.max.cmpge(lo).all()) {
            return true;
        }

        if node.is_leaf() {
            for &i in &self.indices[node.start as usize..node.end as usize] {
                let i = i as usize;
                if Some(i) == skip {
                    continue;
                }
                if (self.points[i] - center).abs().cmple(Vec3::splat(radius)).all() {
                    if out.len() >= NEIGHBOR_LIMIT {
                        return false;
                    }
                    out.push(i);
                }
            }
            return true;
        }

        let first = node.first_child as usize;
        (first..first + 8).all(|child| self.collect(child, center, radius, skip, out))
    }

    // Number of indexed (finite) points
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // Leaves that actually hold points
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.is_leaf() && node.len() > 0)
            .count()
    }

    pub fn depth(&self) -> usize {
        self.depth_of(0)
    }

    fn depth_of(&self, id: usize) -> usize {
        let node = &self.nodes[id];
        if node.is_leaf() {
            return 1;
        }
        let first = node.first_child as usize;
        1 + (first..first + 8).map(|c| self.depth_of(c)).max().unwrap_or(0)
    }
}

// Octant bit layout: x -> 1, y -> 2, z -> 4
#[inline]
fn octant_of(center: Vec3, p: Vec3) -> u8 {
    (p.x >= center.x) as u8 | ((p.y >= center.y) as u8) << 1 | ((p.z >= center.z) as u8) << 2
}

#[inline]
fn octant_center(center: Vec3, child_half: f32, octant: usize) -> Vec3 {
    let sign = |bit: usize| if octant & bit != 0 { child_half } else { -child_half };
    center + Vec3::new(sign(1), sign(2), sign(4))
}
