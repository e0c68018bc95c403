//! Fixed-size per-shard header

use crate::endian::StoredOrder;
use crate::particle::{TypeFilter, NUM_TYPES};

/// Size of the header record in bytes, padding included.
pub const HEADER_SIZE: usize = 256;

/// Bytes actually used by named fields; the rest of the record is padding.
const USED_BYTES: usize = 196;

/// Per-shard snapshot metadata.
///
/// Only `npart` and `box_size` drive the decomposition; the remaining fields
/// are decoded so a header can be written back unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotHeader {
    /// Particles of each type in this shard
    pub npart: [u32; NUM_TYPES],
    /// Fixed mass per type (0 when masses are stored per particle)
    pub mass: [f64; NUM_TYPES],
    /// Simulation time or scale factor
    pub time: f64,
    /// Redshift of the output
    pub redshift: f64,
    /// Star formation flag
    pub flag_sfr: i32,
    /// Feedback flag
    pub flag_feedback: i32,
    /// Particles of each type across all shards (low 32 bits)
    pub npart_total: [u32; NUM_TYPES],
    /// Cooling flag
    pub flag_cooling: i32,
    /// Number of shards in the snapshot
    pub num_files: i32,
    /// Edge length of the periodic simulation cube
    pub box_size: f64,
    /// Matter density parameter
    pub omega0: f64,
    /// Dark energy density parameter
    pub omega_lambda: f64,
    /// Dimensionless Hubble parameter
    pub hubble_param: f64,
    /// Stellar age flag
    pub flag_stellar_age: i32,
    /// Metallicity flag
    pub flag_metals: i32,
    /// High 32 bits of `npart_total`
    pub npart_total_high_word: [u32; NUM_TYPES],
    /// Entropy-instead-of-energy flag for initial conditions
    pub flag_entropy_ics: i32,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self {
            npart: [0; NUM_TYPES],
            mass: [0.0; NUM_TYPES],
            time: 0.0,
            redshift: 0.0,
            flag_sfr: 0,
            flag_feedback: 0,
            npart_total: [0; NUM_TYPES],
            flag_cooling: 0,
            num_files: 1,
            box_size: 0.0,
            omega0: 0.0,
            omega_lambda: 0.0,
            hubble_param: 0.0,
            flag_stellar_age: 0,
            flag_metals: 0,
            npart_total_high_word: [0; NUM_TYPES],
            flag_entropy_ics: 0,
        }
    }
}

/// Sequential field cursor over a header buffer.
struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    order: StoredOrder,
}

impl FieldReader<'_> {
    fn take(&mut self, len: usize) -> &[u8] {
        let field = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        field
    }

    fn u32(&mut self) -> u32 {
        let order = self.order;
        order.read_u32(self.take(4))
    }

    fn i32(&mut self) -> i32 {
        let order = self.order;
        order.read_i32(self.take(4))
    }

    fn f64(&mut self) -> f64 {
        let order = self.order;
        order.read_f64(self.take(8))
    }

    fn u32_array(&mut self) -> [u32; NUM_TYPES] {
        let mut out = [0; NUM_TYPES];
        for slot in &mut out {
            *slot = self.u32();
        }
        out
    }

    fn f64_array(&mut self) -> [f64; NUM_TYPES] {
        let mut out = [0.0; NUM_TYPES];
        for slot in &mut out {
            *slot = self.f64();
        }
        out
    }
}

/// Sequential field cursor writing into a header buffer.
struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    offset: usize,
    order: StoredOrder,
}

impl FieldWriter<'_> {
    fn slot(&mut self, len: usize) -> &mut [u8] {
        let start = self.offset;
        self.offset += len;
        &mut self.bytes[start..start + len]
    }

    fn u32(&mut self, v: u32) {
        let order = self.order;
        order.write_u32(self.slot(4), v);
    }

    fn i32(&mut self, v: i32) {
        let order = self.order;
        order.write_i32(self.slot(4), v);
    }

    fn f64(&mut self, v: f64) {
        let order = self.order;
        order.write_f64(self.slot(8), v);
    }

    fn u32_array(&mut self, values: &[u32; NUM_TYPES]) {
        for &v in values {
            self.u32(v);
        }
    }

    fn f64_array(&mut self, values: &[f64; NUM_TYPES]) {
        for &v in values {
            self.f64(v);
        }
    }
}

impl SnapshotHeader {
    /// Decode a header record stored in `order`.
    ///
    /// Returns `None` if `bytes` is shorter than [`HEADER_SIZE`].
    pub fn decode(bytes: &[u8], order: StoredOrder) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut r = FieldReader {
            bytes,
            offset: 0,
            order,
        };
        let header = Self {
            npart: r.u32_array(),
            mass: r.f64_array(),
            time: r.f64(),
            redshift: r.f64(),
            flag_sfr: r.i32(),
            flag_feedback: r.i32(),
            npart_total: r.u32_array(),
            flag_cooling: r.i32(),
            num_files: r.i32(),
            box_size: r.f64(),
            omega0: r.f64(),
            omega_lambda: r.f64(),
            hubble_param: r.f64(),
            flag_stellar_age: r.i32(),
            flag_metals: r.i32(),
            npart_total_high_word: r.u32_array(),
            flag_entropy_ics: r.i32(),
        };
        debug_assert_eq!(r.offset, USED_BYTES);
        Some(header)
    }

    /// Encode into a zero-padded header record in `order`.
    pub fn encode(&self, order: StoredOrder) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut w = FieldWriter {
            bytes: &mut buf,
            offset: 0,
            order,
        };
        w.u32_array(&self.npart);
        w.f64_array(&self.mass);
        w.f64(self.time);
        w.f64(self.redshift);
        w.i32(self.flag_sfr);
        w.i32(self.flag_feedback);
        w.u32_array(&self.npart_total);
        w.i32(self.flag_cooling);
        w.i32(self.num_files);
        w.f64(self.box_size);
        w.f64(self.omega0);
        w.f64(self.omega_lambda);
        w.f64(self.hubble_param);
        w.i32(self.flag_stellar_age);
        w.i32(self.flag_metals);
        w.u32_array(&self.npart_total_high_word);
        w.i32(self.flag_entropy_ics);
        debug_assert_eq!(w.offset, USED_BYTES);
        buf
    }

    /// Number of particles in this shard, all types.
    pub fn particle_total(&self) -> u64 {
        self.npart.iter().map(|&n| n as u64).sum()
    }

    /// Number of particles in this shard accepted by `filter`.
    pub fn filtered_total(&self, filter: TypeFilter) -> u64 {
        self.npart
            .iter()
            .enumerate()
            .filter(|&(t, _)| filter.accepts(t))
            .map(|(_, &n)| n as u64)
            .sum()
    }
}
