//! Spatial Domain Decomposition
//!
//! This crate splits the particles of a multi-file snapshot into one
//! axis-aligned box per rank, balancing the particle count per box:
//! - Global extent discovery on the coordinator
//! - Axis ranking and a power-of-two split plan
//! - Histogram quantile walk for the box faces
//! - A distributed counting pass over the final boxes
//!
//! Phases run in order and every rank enters every collective:
//!
//! ```no_run
//! use decomposer::{comm::run_local_group, decompose, DecompositionConfig};
//!
//! let config = DecompositionConfig::new("output/snap_010", 8);
//! let states = run_local_group(4, |comm| decompose(comm, &config));
//! for state in states {
//!     let state = state?;
//!     println!("rank {} owns {}", state.rank, state.local_count());
//! }
//! # Ok::<(), decomposer::DecompositionError>(())
//! ```

#![warn(missing_docs)]

pub mod assign;
pub mod comm;
pub mod config;
pub mod domain;
pub mod error;
pub mod extent;
pub mod histogram;
pub mod solver;
pub mod split;

#[cfg(test)]
mod fixtures;

pub use assign::{count_ownership, OwnershipCount, ReadPlan};
pub use comm::{Communicator, LocalCommunicator, LocalGroup, SerialCommunicator};
pub use config::{DecompositionConfig, ExtentStrategy};
pub use domain::{DomainBox, DomainTable, GlobalExtent};
pub use error::{DecompositionError, Result};
pub use histogram::Interpolation;
pub use solver::BoundarySolver;
pub use split::SplitPlan;

use comm::share_outcome;
use extent::estimate_extent;
use split::exact_log2;

/// Everything one rank knows after a decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionState {
    /// Rank this state belongs to
    pub rank: usize,
    /// Global extent the boxes tile
    pub extent: GlobalExtent,
    /// One box per rank
    pub table: DomainTable,
    /// Particles owned by every rank
    pub counts: OwnershipCount,
}

impl DecompositionState {
    /// This rank's box.
    pub fn local_box(&self) -> &DomainBox {
        self.table.box_of(self.rank)
    }

    /// Filtered particles this rank owns.
    pub fn local_count(&self) -> u64 {
        self.counts.primary[self.rank]
    }

    /// Baryons this rank owns, when counted separately.
    pub fn local_baryon_count(&self) -> Option<u64> {
        self.counts.baryon.as_ref().map(|b| b[self.rank])
    }
}

/// Run the full decomposition on this rank.
///
/// Collective: every rank of `comm` calls it with the same `config`. Extent
/// and boundaries are computed on rank 0 and broadcast; counting is spread
/// over the reader ranks.
pub fn decompose<C>(comm: &C, config: &DecompositionConfig) -> Result<DecompositionState>
where
    C: Communicator + ?Sized,
{
    // local checks, identical on every rank, before any collective
    config.validate()?;
    let nprocs = comm.size();
    if exact_log2(nprocs).is_none() {
        return Err(DecompositionError::Config(format!(
            "rank count {} is not a power of two",
            nprocs
        )));
    }

    let coordinator = comm.is_coordinator();
    if coordinator {
        tracing::info!(
            "Decomposing {} ({} file(s)) over {} rank(s), filter {:?}",
            config.file_name,
            config.num_files,
            nprocs,
            config.type_filter
        );
    }

    let extent = share_outcome(comm, 0, coordinator.then(|| estimate_extent(config)))?;
    comm.barrier();

    let table = share_outcome(
        comm,
        0,
        coordinator.then(|| BoundarySolver::new(config, nprocs).solve(extent)),
    )?;

    let counts = count_ownership(comm, config, &table)?;

    let state = DecompositionState {
        rank: comm.rank(),
        extent,
        table,
        counts,
    };
    tracing::debug!(
        "rank {}: box {:?}, {} particles",
        state.rank,
        state.local_box().bounds,
        state.local_count()
    );
    Ok(state)
}
