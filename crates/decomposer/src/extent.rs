//! Global extent discovery
//!
//! Runs on the coordinator only; the result is broadcast by the caller.

use snapshot::{SnapshotSet, TypeFilter};

use crate::config::{DecompositionConfig, ExtentStrategy};
use crate::domain::GlobalExtent;
use crate::error::{DecompositionError, Result};

/// Fraction of the width added to each side when `expand_bounds` is set.
pub const EXPAND_FRACTION: f64 = 0.001;

/// Stream the position of every particle passing `filter`, across all shards.
///
/// Returns the number of positions visited.
pub(crate) fn for_each_filtered<F>(set: &SnapshotSet, filter: TypeFilter, mut visit: F) -> Result<u64>
where
    F: FnMut([f64; 3]),
{
    let mut accepted = 0u64;
    for index in 0..set.num_files() {
        set.for_each_particle(index, |record| {
            if filter.accepts_type(record.ptype) {
                accepted += 1;
                visit(record.position);
            }
        })?;
    }
    Ok(accepted)
}

/// Filtered particle count summed over every shard header.
pub fn filtered_total(set: &SnapshotSet, filter: TypeFilter) -> Result<u64> {
    let mut total = 0u64;
    for header in set.headers()? {
        total += header.filtered_total(filter);
    }
    Ok(total)
}

/// Determine the global extent according to `config.extent_strategy`.
pub fn estimate_extent(config: &DecompositionConfig) -> Result<GlobalExtent> {
    let set = config.snapshot_set();
    let extent = match config.extent_strategy {
        ExtentStrategy::BoxSize => box_size_extent(&set)?,
        ExtentStrategy::ScanPositions => scan_extent(&set, config.type_filter)?,
    };

    let extent = if config.expand_bounds {
        extent.expanded(EXPAND_FRACTION)
    } else {
        extent
    };

    tracing::info!("Global extent: {:?}", extent.bounds);
    Ok(extent)
}

fn box_size_extent(set: &SnapshotSet) -> Result<GlobalExtent> {
    let headers = set.headers()?;
    let box_size = headers.first().map(|h| h.box_size).unwrap_or(0.0);

    for (index, header) in headers.iter().enumerate().skip(1) {
        if header.box_size != box_size {
            tracing::warn!(
                "{} reports box size {}, shard 0 reports {}; using shard 0",
                set.path(index).display(),
                header.box_size,
                box_size
            );
        }
    }

    GlobalExtent::cube(box_size).map_err(|_| {
        DecompositionError::DegenerateInput(format!(
            "header box size {} does not describe a volume",
            box_size
        ))
    })
}

fn scan_extent(set: &SnapshotSet, filter: TypeFilter) -> Result<GlobalExtent> {
    let mut bounds = [[f64::INFINITY, f64::NEG_INFINITY]; 3];
    let seen = for_each_filtered(set, filter, |p| {
        for axis in 0..3 {
            bounds[axis][0] = bounds[axis][0].min(p[axis]);
            bounds[axis][1] = bounds[axis][1].max(p[axis]);
        }
    })?;

    if seen == 0 {
        return Err(DecompositionError::DegenerateInput(format!(
            "no {:?} particles to bound",
            filter
        )));
    }
    tracing::debug!("Scanned {} positions for the extent", seen);
    GlobalExtent::new(bounds)
}
