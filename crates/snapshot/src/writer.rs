//! Writing conforming snapshot shards, for synthetic inputs and fixtures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::endian::StoredOrder;
use crate::error::{Result, SnapshotError};
use crate::header::{SnapshotHeader, HEADER_SIZE};
use crate::particle::NUM_TYPES;
use crate::reader::{Precision, SnapshotFormat, TAG_RECORD};

/// Layout choices for a written shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Block framing
    pub format: SnapshotFormat,
    /// Byte order of every scalar
    pub order: StoredOrder,
    /// Width of position components
    pub precision: Precision,
}

struct RecordWriter {
    out: Vec<u8>,
    order: StoredOrder,
}

impl RecordWriter {
    fn u32(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        self.order.write_u32(&mut buf, v);
        self.out.extend_from_slice(&buf);
    }

    fn tag(&mut self, name: &[u8; 4], next_block: u32) {
        self.u32(TAG_RECORD);
        self.out.extend_from_slice(name);
        self.u32(next_block.wrapping_add(8));
        self.u32(TAG_RECORD);
    }
}

/// Encode a complete shard in memory.
///
/// `header.npart` is replaced by the lengths of `positions`, one list per type
/// slot.
pub fn encode_snapshot(
    header: &SnapshotHeader,
    positions: &[Vec<[f64; 3]>; NUM_TYPES],
    options: WriteOptions,
) -> Vec<u8> {
    let mut header = header.clone();
    for (slot, list) in positions.iter().enumerate() {
        header.npart[slot] = list.len() as u32;
    }
    let total = header.particle_total();
    let block = options.precision.block_marker(total);

    let mut w = RecordWriter {
        out: Vec::with_capacity(HEADER_SIZE + 64 + total as usize * 3 * options.precision.width()),
        order: options.order,
    };

    if options.format == SnapshotFormat::Blocked {
        w.tag(b"HEAD", HEADER_SIZE as u32);
    }
    w.u32(HEADER_SIZE as u32);
    w.out.extend_from_slice(&header.encode(options.order));
    w.u32(HEADER_SIZE as u32);

    if options.format == SnapshotFormat::Blocked {
        w.tag(b"POS ", block);
    }
    w.u32(block);
    let mut wide = [0u8; 8];
    for position in positions.iter().flatten() {
        for &component in position {
            match options.precision {
                Precision::Single => {
                    options.order.write_f32(&mut wide[..4], component as f32);
                    w.out.extend_from_slice(&wide[..4]);
                }
                Precision::Double => {
                    options.order.write_f64(&mut wide, component);
                    w.out.extend_from_slice(&wide);
                }
            }
        }
    }
    w.u32(block);
    w.out
}

/// Write a complete shard to `path`. See [`encode_snapshot`].
pub fn write_snapshot(
    path: impl AsRef<Path>,
    header: &SnapshotHeader,
    positions: &[Vec<[f64; 3]>; NUM_TYPES],
    options: WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_snapshot(header, positions, options);
    let file = File::create(path).map_err(|e| SnapshotError::io(path, e))?;
    let mut out = BufWriter::new(file);
    out.write_all(&bytes)
        .and_then(|_| out.flush())
        .map_err(|e| SnapshotError::io(path, e))?;
    tracing::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
