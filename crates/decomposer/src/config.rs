//! Configuration parsing and validation for a decomposition run

use serde::{Deserialize, Serialize};
use snapshot::{SnapshotFormat, SnapshotSet, TypeFilter};
use std::fs;

use crate::error::{DecompositionError, Result};
use crate::histogram::Interpolation;

/// How the coordinator finds the global extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtentStrategy {
    /// Trust the header box size: `(0, box_size)` on every axis
    #[default]
    BoxSize,
    /// Stream every filtered position and track the true min/max
    ScanPositions,
}

/// Main decomposition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Snapshot file name, without the `.<index>` shard suffix
    pub file_name: String,
    /// Number of shards
    #[serde(default = "default_num_files")]
    pub num_files: usize,
    /// Species that count toward load balance
    #[serde(default)]
    pub type_filter: TypeFilter,
    /// Count baryons separately while balancing on dark matter
    #[serde(default)]
    pub baryon_search: bool,
    /// Block framing of the shards
    #[serde(default)]
    pub format: SnapshotFormat,
    /// Widen the extent by 0.1% per side
    #[serde(default)]
    pub expand_bounds: bool,
    /// Extent discovery strategy
    #[serde(default)]
    pub extent_strategy: ExtentStrategy,
    /// Interpolation used by every quantile boundary search
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Ranks that open shards in the counting pass (default: one per shard)
    #[serde(default)]
    pub num_readers: Option<usize>,
}

fn default_num_files() -> usize {
    1
}

impl DecompositionConfig {
    /// Configuration with defaults for everything but the file set.
    pub fn new(file_name: impl Into<String>, num_files: usize) -> Self {
        Self {
            file_name: file_name.into(),
            num_files,
            type_filter: TypeFilter::default(),
            baryon_search: false,
            format: SnapshotFormat::default(),
            expand_bounds: false,
            extent_strategy: ExtentStrategy::default(),
            interpolation: Interpolation::default(),
            num_readers: None,
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            DecompositionError::Config(format!("failed to read config file {}: {}", path, e))
        })?;

        let config: DecompositionConfig = serde_json::from_str(&contents).map_err(|e| {
            DecompositionError::Config(format!("failed to parse config JSON: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(DecompositionError::Config("file_name must not be empty".to_string()));
        }

        if self.num_files == 0 {
            return Err(DecompositionError::Config("num_files must be at least 1".to_string()));
        }

        if self.num_readers == Some(0) {
            return Err(DecompositionError::Config(
                "num_readers must be at least 1 when set".to_string(),
            ));
        }

        // Baryons are only split off from a dark-matter search
        if self.baryon_search && self.type_filter != TypeFilter::DarkMatter {
            return Err(DecompositionError::Config(format!(
                "baryon_search requires the DarkMatter filter, got {:?}",
                self.type_filter
            )));
        }

        Ok(())
    }

    /// The shards this configuration points at.
    pub fn snapshot_set(&self) -> SnapshotSet {
        SnapshotSet::new(self.file_name.clone(), self.num_files, self.format)
    }
}
