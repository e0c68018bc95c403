//! Synthetic snapshot shards for unit tests.

use std::path::Path;

use rand::rngs::StdRng;
use rand::Rng;
use snapshot::{write_snapshot, SnapshotHeader, SnapshotSet, WriteOptions, NUM_TYPES};

pub(crate) type Slots = [Vec<[f64; 3]>; NUM_TYPES];

/// Write one shard per entry of `shards` and return the file-name template.
pub(crate) fn write_shards(dir: &Path, box_size: f64, shards: &[Slots]) -> String {
    let template = dir.join("snap").to_string_lossy().into_owned();
    let set = SnapshotSet::new(template.clone(), shards.len(), Default::default());
    for (index, positions) in shards.iter().enumerate() {
        let header = SnapshotHeader {
            box_size,
            num_files: shards.len() as i32,
            ..SnapshotHeader::default()
        };
        write_snapshot(set.path(index), &header, positions, WriteOptions::default()).unwrap();
    }
    template
}

/// `n` positions uniform in `[0, hi)` per axis, rounded to single precision.
pub(crate) fn uniform_positions(rng: &mut StdRng, n: usize, hi: [f64; 3]) -> Vec<[f64; 3]> {
    (0..n)
        .map(|_| hi.map(|h| rng.gen_range(0.0..h) as f32 as f64))
        .collect()
}

/// Slots with only `slot` populated.
pub(crate) fn only(slot: usize, positions: Vec<[f64; 3]>) -> Slots {
    let mut slots: Slots = Default::default();
    slots[slot] = positions;
    slots
}
