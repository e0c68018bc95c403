//! Byte-order correction for stored scalars.
//!
//! Every multi-byte value in a snapshot goes through [`StoredOrder`]: header
//! fields and position components alike. The host's native order is never
//! assumed; decoding always names the order the bytes were written in.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order a shard was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum StoredOrder {
    /// Least significant byte first (the common case on disk)
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl StoredOrder {
    /// Byte order of the machine running this code.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            StoredOrder::Big
        } else {
            StoredOrder::Little
        }
    }

    /// Determine the order from a 4-byte framing record whose value is known.
    ///
    /// Returns `None` when the record decodes to `expected` in neither order.
    pub fn detect(record: [u8; 4], expected: u32) -> Option<Self> {
        if LittleEndian::read_u32(&record) == expected {
            Some(StoredOrder::Little)
        } else if BigEndian::read_u32(&record) == expected {
            Some(StoredOrder::Big)
        } else {
            None
        }
    }

    /// Decode a `u32` stored in this order. `bytes` must hold at least 4 bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            StoredOrder::Little => LittleEndian::read_u32(bytes),
            StoredOrder::Big => BigEndian::read_u32(bytes),
        }
    }

    /// Decode an `i32` stored in this order.
    #[inline]
    pub fn read_i32(self, bytes: &[u8]) -> i32 {
        match self {
            StoredOrder::Little => LittleEndian::read_i32(bytes),
            StoredOrder::Big => BigEndian::read_i32(bytes),
        }
    }

    /// Decode an `f32` stored in this order.
    #[inline]
    pub fn read_f32(self, bytes: &[u8]) -> f32 {
        match self {
            StoredOrder::Little => LittleEndian::read_f32(bytes),
            StoredOrder::Big => BigEndian::read_f32(bytes),
        }
    }

    /// Decode an `f64` stored in this order.
    #[inline]
    pub fn read_f64(self, bytes: &[u8]) -> f64 {
        match self {
            StoredOrder::Little => LittleEndian::read_f64(bytes),
            StoredOrder::Big => BigEndian::read_f64(bytes),
        }
    }

    /// Encode a `u32` in this order.
    pub fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            StoredOrder::Little => LittleEndian::write_u32(buf, value),
            StoredOrder::Big => BigEndian::write_u32(buf, value),
        }
    }

    /// Encode an `i32` in this order.
    pub fn write_i32(self, buf: &mut [u8], value: i32) {
        match self {
            StoredOrder::Little => LittleEndian::write_i32(buf, value),
            StoredOrder::Big => BigEndian::write_i32(buf, value),
        }
    }

    /// Encode an `f32` in this order.
    pub fn write_f32(self, buf: &mut [u8], value: f32) {
        match self {
            StoredOrder::Little => LittleEndian::write_f32(buf, value),
            StoredOrder::Big => BigEndian::write_f32(buf, value),
        }
    }

    /// Encode an `f64` in this order.
    pub fn write_f64(self, buf: &mut [u8], value: f64) {
        match self {
            StoredOrder::Little => LittleEndian::write_f64(buf, value),
            StoredOrder::Big => BigEndian::write_f64(buf, value),
        }
    }
}
