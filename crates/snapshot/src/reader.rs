//! Streaming reader for a single snapshot shard.
//!
//! A shard is a sequence of records, each wrapped in a 4-byte byte-count
//! marker on both sides:
//!
//! ```text
//! [blocked only: 8 | "HEAD" | 264 | 8]
//! 256 | header (256 bytes) | 256
//! [blocked only: 8 | "POS " | size + 8 | 8]
//! size | npart[0] x 3 floats | npart[1] x 3 floats | ... | size
//! ```
//!
//! The framing gives no random access, so positions are only exposed through
//! [`PositionStream`], which takes the file by value and walks the type slots
//! in header order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::endian::StoredOrder;
use crate::error::{Result, SnapshotError};
use crate::header::{SnapshotHeader, HEADER_SIZE};
use crate::particle::{ParticleRecord, ParticleType, NUM_TYPES};

/// Value of the record wrapping a block tag.
pub(crate) const TAG_RECORD: u32 = 8;

/// Whether each data block is preceded by a named tag record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SnapshotFormat {
    /// Byte-count markers only
    #[default]
    Unframed,
    /// Byte-count markers plus a 4-character block tag before every block
    Blocked,
}

/// Width of each stored position component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Precision {
    /// 4-byte floats
    #[default]
    Single,
    /// 8-byte floats
    Double,
}

impl Precision {
    /// Bytes per stored component.
    pub fn width(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    /// Expected block marker for `n` positions. Markers wrap for blocks past 4 GiB.
    pub(crate) fn block_marker(self, n: u64) -> u32 {
        (n.wrapping_mul(3 * self.width() as u64)) as u32
    }
}

/// Path of shard `index`: the bare template for single-file snapshots,
/// `template.<index>` otherwise.
pub fn snapshot_path(template: &str, index: usize, num_files: usize) -> PathBuf {
    if num_files > 1 {
        PathBuf::from(format!("{}.{}", template, index))
    } else {
        PathBuf::from(template)
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, path: &Path) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| SnapshotError::io(path, e))?;
    Ok(buf)
}

/// An opened shard with its header decoded.
pub struct SnapshotFile<R = BufReader<File>> {
    reader: R,
    path: PathBuf,
    header: SnapshotHeader,
    order: StoredOrder,
    format: SnapshotFormat,
}

impl SnapshotFile<BufReader<File>> {
    /// Open the shard at `path` and decode its header.
    pub fn open(path: impl AsRef<Path>, format: SnapshotFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SnapshotError::io(path, e))?;
        Self::from_reader(BufReader::new(file), path, format)
    }
}

impl<R: Read> SnapshotFile<R> {
    /// Decode the header from an arbitrary byte source. `path` is used for
    /// error reporting only.
    pub fn from_reader(
        mut reader: R,
        path: impl Into<PathBuf>,
        format: SnapshotFormat,
    ) -> Result<Self> {
        let path = path.into();

        // The first record of the file fixes the byte order.
        let first = read_array::<R, 4>(&mut reader, &path)?;
        let order = match format {
            SnapshotFormat::Unframed => StoredOrder::detect(first, HEADER_SIZE as u32),
            SnapshotFormat::Blocked => StoredOrder::detect(first, TAG_RECORD),
        }
        .ok_or_else(|| {
            SnapshotError::format(
                &path,
                format!("leading record {:02x?} is not a valid framing marker", first),
            )
        })?;

        let mut file = Self {
            reader,
            path,
            header: SnapshotHeader::default(),
            order,
            format,
        };

        let header_lead = match format {
            SnapshotFormat::Unframed => order.read_u32(&first),
            SnapshotFormat::Blocked => {
                file.finish_tag(order.read_u32(&first), b"HEAD")?;
                file.read_raw_u32()?
            }
        };
        let header_bytes = file.read_record_bytes::<HEADER_SIZE>(header_lead)?;
        file.header = SnapshotHeader::decode(&header_bytes, order)
            .ok_or_else(|| SnapshotError::format(&file.path, "header record too short"))?;

        tracing::trace!(
            "{}: {:?}-endian, npart={:?}, box_size={}",
            file.path.display(),
            order,
            file.header.npart,
            file.header.box_size
        );
        Ok(file)
    }

    /// Decoded header of this shard.
    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// Byte order the shard was written in.
    pub fn order(&self) -> StoredOrder {
        self.order
    }

    /// Path the shard was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the shard and start streaming its position block.
    pub fn positions(mut self) -> Result<PositionStream<R>> {
        if self.format == SnapshotFormat::Blocked {
            let lead = self.read_raw_u32()?;
            self.finish_tag(lead, b"POS ")?;
        }

        let marker = self.read_raw_u32()?;
        let total = self.header.particle_total();
        let precision = if marker == Precision::Single.block_marker(total) {
            Precision::Single
        } else if marker == Precision::Double.block_marker(total) {
            Precision::Double
        } else {
            return Err(SnapshotError::format(
                &self.path,
                format!(
                    "position block of {} bytes does not hold {} particles",
                    marker, total
                ),
            ));
        };

        let counts = self.header.npart;
        Ok(PositionStream {
            reader: self.reader,
            path: self.path,
            order: self.order,
            precision,
            counts,
            slot: 0,
            remaining: counts[0],
            marker,
            done: false,
        })
    }

    fn read_raw_u32(&mut self) -> Result<u32> {
        let bytes = read_array::<R, 4>(&mut self.reader, &self.path)?;
        Ok(self.order.read_u32(&bytes))
    }

    fn expect_marker(&mut self, expected: u32, what: &str) -> Result<()> {
        let found = self.read_raw_u32()?;
        if found != expected {
            return Err(SnapshotError::format(
                &self.path,
                format!("{} marker is {}, expected {}", what, found, expected),
            ));
        }
        Ok(())
    }

    /// Read the rest of a tag record whose leading marker is already consumed.
    fn finish_tag(&mut self, lead: u32, tag: &[u8; 4]) -> Result<()> {
        if lead != TAG_RECORD {
            return Err(SnapshotError::format(
                &self.path,
                format!("expected {:?} tag record", String::from_utf8_lossy(tag)),
            ));
        }
        let found = read_array::<R, 4>(&mut self.reader, &self.path)?;
        if &found != tag {
            return Err(SnapshotError::format(
                &self.path,
                format!(
                    "block tag {:?}, expected {:?}",
                    String::from_utf8_lossy(&found),
                    String::from_utf8_lossy(tag)
                ),
            ));
        }
        // size of the next block; not needed
        self.read_raw_u32()?;
        self.expect_marker(TAG_RECORD, "tag trailing")
    }

    /// Read the body and trailing marker of a fixed-size record whose leading
    /// marker was `leading`.
    fn read_record_bytes<const N: usize>(&mut self, leading: u32) -> Result<[u8; N]> {
        if leading != N as u32 {
            return Err(SnapshotError::format(
                &self.path,
                format!("header record is {} bytes, expected {}", leading, N),
            ));
        }
        let bytes = read_array::<R, N>(&mut self.reader, &self.path)?;
        self.expect_marker(N as u32, "header trailing")?;
        Ok(bytes)
    }
}

/// Lazy, single-pass sequence of positions in header slot order.
///
/// Yields exactly `npart[k]` records for each slot `k = 0..6`, then checks the
/// trailing block marker. After the first error the stream is exhausted.
pub struct PositionStream<R = BufReader<File>> {
    reader: R,
    path: PathBuf,
    order: StoredOrder,
    precision: Precision,
    counts: [u32; NUM_TYPES],
    slot: usize,
    remaining: u32,
    marker: u32,
    done: bool,
}

impl<R: Read> PositionStream<R> {
    /// Stored width of the position components.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    fn read_record(&mut self, ptype: ParticleType) -> Result<ParticleRecord> {
        let mut position = [0.0; 3];
        match self.precision {
            Precision::Single => {
                let bytes = read_array::<R, 12>(&mut self.reader, &self.path)?;
                for (m, chunk) in bytes.chunks_exact(4).enumerate() {
                    position[m] = self.order.read_f32(chunk) as f64;
                }
            }
            Precision::Double => {
                let bytes = read_array::<R, 24>(&mut self.reader, &self.path)?;
                for (m, chunk) in bytes.chunks_exact(8).enumerate() {
                    position[m] = self.order.read_f64(chunk);
                }
            }
        }
        Ok(ParticleRecord { ptype, position })
    }

    fn read_trailer(&mut self) -> Result<()> {
        let bytes = read_array::<R, 4>(&mut self.reader, &self.path)?;
        let trailer = self.order.read_u32(&bytes);
        if trailer != self.marker {
            return Err(SnapshotError::format(
                &self.path,
                format!(
                    "position block trailing marker is {}, expected {}",
                    trailer, self.marker
                ),
            ));
        }
        Ok(())
    }

    fn records_left(&self) -> u64 {
        if self.done {
            return 0;
        }
        let later: u64 = self.counts[self.slot + 1..].iter().map(|&n| n as u64).sum();
        self.remaining as u64 + later
    }
}

impl<R: Read> Iterator for PositionStream<R> {
    type Item = Result<ParticleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while self.remaining == 0 {
            self.slot += 1;
            if self.slot >= NUM_TYPES {
                self.done = true;
                return self.read_trailer().err().map(Err);
            }
            self.remaining = self.counts[self.slot];
        }

        let ptype = ParticleType::ALL[self.slot];
        match self.read_record(ptype) {
            Ok(record) => {
                self.remaining -= 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.records_left() as usize;
        (0, Some(left + 1))
    }
}
