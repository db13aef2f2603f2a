/*
 * Codec Module
 *
 * Byte layout of a SharedSnapshot for transports that need one. All values
 * are little-endian:
 *
 *   magic "BOID" | version u16 | capacity u32 | neighbor limit u32
 *   tick u64 | active u32 | point size f32 | center of mass 3 x f32
 *   viewer pose 7 x f32 | capacity poses (7 x f32 each)
 *   capacity x neighbor limit neighbor indices (u16 each)
 */

use crate::error::{FlockError, Result};
use crate::snapshot::{PoseRecord, SharedSnapshot};
use crate::{MAX_BOIDS, NEIGHBOR_LIMIT};

pub const MAGIC: [u8; 4] = *b"BOID";
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4 + 4 + 8 + 4 + 4 + 12;
const POSE_LEN: usize = std::mem::size_of::<PoseRecord>();

// Exact size of every encoded snapshot
pub const ENCODED_LEN: usize =
    HEADER_LEN + POSE_LEN * (MAX_BOIDS + 1) + 2 * MAX_BOIDS * NEIGHBOR_LIMIT;

pub fn encode(snapshot: &SharedSnapshot) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENCODED_LEN);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(MAX_BOIDS as u32).to_le_bytes());
    buf.extend_from_slice(&(NEIGHBOR_LIMIT as u32).to_le_bytes());
    buf.extend_from_slice(&snapshot.tick.to_le_bytes());
    buf.extend_from_slice(&snapshot.active.to_le_bytes());
    buf.extend_from_slice(&snapshot.point_size.to_le_bytes());
    for v in snapshot.center_of_mass {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    put_pose(&mut buf, &snapshot.viewer);
    for pose in &snapshot.poses {
        put_pose(&mut buf, pose);
    }
    for n in &snapshot.neighbors {
        buf.extend_from_slice(&n.to_le_bytes());
    }
    buf
}

fn put_pose(buf: &mut Vec<u8>, pose: &PoseRecord) {
    let floats: [f32; 7] = bytemuck::cast(*pose);
    for v in floats {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub fn decode(bytes: &[u8]) -> Result<SharedSnapshot> {
    if bytes.len() != ENCODED_LEN {
        return Err(FlockError::Codec(format!(
            "expected {} bytes, got {}",
            ENCODED_LEN,
            bytes.len()
        )));
    }

    let mut reader = Reader { bytes, offset: 0 };
    if reader.take::<4>() != MAGIC {
        return Err(FlockError::Codec("bad magic".to_string()));
    }
    let version = u16::from_le_bytes(reader.take());
    if version != VERSION {
        return Err(FlockError::Codec(format!("unsupported version {version}")));
    }
    let capacity = u32::from_le_bytes(reader.take()) as usize;
    let limit = u32::from_le_bytes(reader.take()) as usize;
    if capacity != MAX_BOIDS || limit != NEIGHBOR_LIMIT {
        return Err(FlockError::Codec(format!(
            "capacity mismatch: {capacity}x{limit}, expected {MAX_BOIDS}x{NEIGHBOR_LIMIT}"
        )));
    }

    let tick = u64::from_le_bytes(reader.take());
    let active = u32::from_le_bytes(reader.take());
    if active as usize > MAX_BOIDS {
        return Err(FlockError::Codec(format!("active count {active} over capacity")));
    }
    let point_size = reader.f32();
    let center_of_mass = [reader.f32(), reader.f32(), reader.f32()];
    let viewer = reader.pose();
    let poses = (0..MAX_BOIDS).map(|_| reader.pose()).collect();
    let neighbors = (0..MAX_BOIDS * NEIGHBOR_LIMIT)
        .map(|_| u16::from_le_bytes(reader.take()))
        .collect();

    Ok(SharedSnapshot {
        tick,
        point_size,
        active,
        poses,
        neighbors,
        viewer,
        center_of_mass,
    })
}

// Length was checked up front, so reads never run past the end
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn pose(&mut self) -> PoseRecord {
        let mut floats = [0f32; 7];
        for v in &mut floats {
            *v = self.f32();
        }
        bytemuck::cast(floats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_NEIGHBOR;

    fn sample() -> SharedSnapshot {
        let mut snapshot = SharedSnapshot {
            tick: 42,
            point_size: 0.75,
            active: 3,
            center_of_mass: [1.0, -2.0, 0.5],
            ..SharedSnapshot::default()
        };
        snapshot.poses[1] = PoseRecord {
            position: [3.0, 4.0, -5.5],
            orientation: [0.0, 0.70710677, 0.0, 0.70710677],
        };
        snapshot.neighbors[NEIGHBOR_LIMIT] = 2;
        snapshot.neighbors[NEIGHBOR_LIMIT + 1] = 0;
        snapshot
    }

    #[test]
    fn decode_restores_every_field() {
        let snapshot = sample();
        let bytes = encode(&snapshot);
        assert_eq!(bytes.len(), ENCODED_LEN);
        assert_eq!(decode(&bytes).expect("valid frame"), snapshot);
    }

    #[test]
    fn decode_rejects_bad_frames() {
        let bytes = encode(&sample());

        assert!(matches!(decode(&bytes[..100]), Err(FlockError::Codec(_))));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(decode(&bad_magic), Err(FlockError::Codec(_))));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(matches!(decode(&bad_version), Err(FlockError::Codec(_))));

        let mut bad_active = bytes;
        bad_active[22..26].copy_from_slice(&(MAX_BOIDS as u32 + 1).to_le_bytes());
        assert!(matches!(decode(&bad_active), Err(FlockError::Codec(_))));
    }

    #[test]
    fn padding_survives_encoding() {
        let decoded = decode(&encode(&SharedSnapshot::default())).expect("valid frame");
        assert!(decoded.neighbors.iter().all(|&n| n == NO_NEIGHBOR));
    }
}
