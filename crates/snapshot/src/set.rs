//! All shards of one snapshot output.

use std::path::PathBuf;

use crate::error::Result;
use crate::header::SnapshotHeader;
use crate::particle::ParticleRecord;
use crate::reader::{snapshot_path, SnapshotFile, SnapshotFormat};

/// A multi-file snapshot addressed by a file-name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSet {
    template: String,
    num_files: usize,
    format: SnapshotFormat,
}

impl SnapshotSet {
    /// Snapshot stored as `num_files` shards named after `template`.
    pub fn new(template: impl Into<String>, num_files: usize, format: SnapshotFormat) -> Self {
        Self {
            template: template.into(),
            num_files,
            format,
        }
    }

    /// Number of shards.
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    /// Block framing of every shard.
    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    /// Path of shard `index`.
    pub fn path(&self, index: usize) -> PathBuf {
        snapshot_path(&self.template, index, self.num_files)
    }

    /// Open shard `index`.
    pub fn open(&self, index: usize) -> Result<SnapshotFile> {
        SnapshotFile::open(self.path(index), self.format)
    }

    /// Decode only the header of shard `index`.
    pub fn read_header(&self, index: usize) -> Result<SnapshotHeader> {
        Ok(self.open(index)?.header().clone())
    }

    /// Headers of every shard, in index order.
    pub fn headers(&self) -> Result<Vec<SnapshotHeader>> {
        (0..self.num_files).map(|i| self.read_header(i)).collect()
    }

    /// Stream every record of shard `index` through `visit`.
    ///
    /// Returns the number of records visited. Stops at the first error.
    pub fn for_each_particle<F>(&self, index: usize, mut visit: F) -> Result<u64>
    where
        F: FnMut(ParticleRecord),
    {
        let file = self.open(index)?;
        tracing::debug!(
            "reading {} ({} particles)",
            file.path().display(),
            file.header().particle_total()
        );
        let mut seen = 0u64;
        for record in file.positions()? {
            visit(record?);
            seen += 1;
        }
        Ok(seen)
    }
}
