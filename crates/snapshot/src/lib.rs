//! Multi-file N-body snapshot I/O
//!
//! This crate reads the binary snapshot format used by the decomposition
//! passes. It is deliberately small and allocation-free on the hot path:
//! particles are streamed one record at a time and never collected.
//!
//! # Modules
//! - [`endian`] -- Explicit byte-order decoding for every stored scalar.
//! - [`header`] -- The fixed 256-byte per-shard header.
//! - [`particle`] -- Type slots, the [`TypeFilter`] predicate, and [`ParticleRecord`].
//! - [`reader`] -- Framing-aware shard reader and the [`PositionStream`].
//! - [`set`] -- All shards of one output, addressed by a file-name template.
//! - [`writer`] -- Writing conforming shards for synthetic inputs.

#![warn(missing_docs)]

pub mod endian;
pub mod error;
pub mod header;
pub mod particle;
pub mod reader;
pub mod set;
pub mod writer;

pub use endian::StoredOrder;
pub use error::{Result, SnapshotError};
pub use header::{SnapshotHeader, HEADER_SIZE};
pub use particle::{ParticleRecord, ParticleType, TypeFilter, NUM_TYPES};
pub use reader::{snapshot_path, PositionStream, Precision, SnapshotFile, SnapshotFormat};
pub use set::SnapshotSet;
pub use writer::{encode_snapshot, write_snapshot, WriteOptions};
