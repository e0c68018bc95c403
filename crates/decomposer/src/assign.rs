//! Assignment and counting pass
//!
//! Reader ranks stream their shards, classify every filtered particle to its
//! owning rank, and the per-owner counters are summed over the group.

use serde::{Deserialize, Serialize};
use snapshot::TypeFilter;

use crate::comm::{agree, Communicator};
use crate::config::DecompositionConfig;
use crate::domain::DomainTable;
use crate::error::{DecompositionError, Result};

/// Which ranks read shards, and which shards each one reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPlan {
    nprocs: usize,
    num_files: usize,
    num_readers: usize,
}

impl ReadPlan {
    /// Spread `num_files` shards over `num_readers` reader ranks out of
    /// `nprocs`. The reader count defaults to, and is clamped to,
    /// `min(nprocs, num_files)`.
    pub fn distribute(nprocs: usize, num_files: usize, num_readers: Option<usize>) -> Self {
        let limit = nprocs.min(num_files).max(1);
        let num_readers = num_readers.unwrap_or(limit).clamp(1, limit);
        Self {
            nprocs,
            num_files,
            num_readers,
        }
    }

    /// Number of reader ranks.
    pub fn num_readers(&self) -> usize {
        self.num_readers
    }

    /// Rank acting as reader `reader`.
    pub fn reader_rank(&self, reader: usize) -> usize {
        reader * self.nprocs / self.num_readers
    }

    /// Reader slot of `rank`, if it reads at all.
    pub fn reader_index(&self, rank: usize) -> Option<usize> {
        (0..self.num_readers).find(|&r| self.reader_rank(r) == rank)
    }

    /// Shards opened by `rank`; empty for non-readers.
    pub fn files_for(&self, rank: usize) -> Vec<usize> {
        match self.reader_index(rank) {
            Some(reader) => (reader..self.num_files).step_by(self.num_readers).collect(),
            None => Vec::new(),
        }
    }
}

/// Per-rank particle counts after the global reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipCount {
    /// Filtered particles owned by each rank
    pub primary: Vec<u64>,
    /// Baryons owned by each rank, when counted separately
    pub baryon: Option<Vec<u64>>,
}

impl OwnershipCount {
    /// Sum over every rank and both counters.
    pub fn total(&self) -> u64 {
        let baryon: u64 = self.baryon.iter().flatten().sum();
        self.primary.iter().sum::<u64>() + baryon
    }
}

struct LocalCounts {
    primary: Vec<u64>,
    baryon: Vec<u64>,
}

fn count_local(
    config: &DecompositionConfig,
    table: &DomainTable,
    files: &[usize],
    baryon_mode: bool,
) -> Result<LocalCounts> {
    let set = config.snapshot_set();
    let filter = config.type_filter;
    let mut counts = LocalCounts {
        primary: vec![0; table.len()],
        baryon: vec![0; table.len()],
    };

    for &index in files {
        let file = set.open(index)?;
        tracing::debug!("Counting {}", file.path().display());
        for record in file.positions()? {
            let record = record?;
            let counter = if baryon_mode && record.ptype.is_baryon() {
                &mut counts.baryon
            } else if filter.accepts_type(record.ptype) {
                &mut counts.primary
            } else {
                continue;
            };
            let owner = table
                .owner_of(record.position)
                .ok_or(DecompositionError::UnownedParticle {
                    position: record.position,
                })?;
            counter[owner] += 1;
        }
    }
    Ok(counts)
}

/// Count how many particles every rank owns under `table`.
///
/// Collective: every rank of `comm` must call it. A failure on any rank
/// fails the call on all of them before the counts are reduced.
pub fn count_ownership<C>(
    comm: &C,
    config: &DecompositionConfig,
    table: &DomainTable,
) -> Result<OwnershipCount>
where
    C: Communicator + ?Sized,
{
    let plan = ReadPlan::distribute(comm.size(), config.num_files, config.num_readers);
    let files = plan.files_for(comm.rank());
    let baryon_mode = config.baryon_search && config.type_filter == TypeFilter::DarkMatter;

    let local = count_local(config, table, &files, baryon_mode);
    let local = agree(comm, local)?;

    let primary = comm.all_reduce_sum(&local.primary);
    let baryon = baryon_mode.then(|| comm.all_reduce_sum(&local.baryon));

    if comm.is_coordinator() {
        tracing::info!(
            "Counted {} particles with {} reader(s)",
            primary.iter().sum::<u64>(),
            plan.num_readers()
        );
    }
    Ok(OwnershipCount { primary, baryon })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{run_local_group, SerialCommunicator};
    use crate::domain::GlobalExtent;
    use crate::fixtures::{only, uniform_positions, write_shards};
    use crate::split::SplitPlan;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_read_plan_defaults() {
        let plan = ReadPlan::distribute(8, 2, None);
        assert_eq!(plan.num_readers(), 2);
        assert_eq!(plan.files_for(0), vec![0]);
        assert_eq!(plan.files_for(4), vec![1]);
        for rank in [1, 2, 3, 5, 6, 7] {
            assert!(plan.files_for(rank).is_empty());
        }

        let plan = ReadPlan::distribute(4, 8, None);
        assert_eq!(plan.files_for(1), vec![1, 5]);
        assert_eq!(plan.files_for(3), vec![3, 7]);

        let plan = ReadPlan::distribute(1, 3, None);
        assert_eq!(plan.files_for(0), vec![0, 1, 2]);
    }

    #[test]
    fn test_read_plan_explicit_readers() {
        let plan = ReadPlan::distribute(4, 8, Some(2));
        assert_eq!(plan.reader_rank(1), 2);
        assert_eq!(plan.files_for(0), vec![0, 2, 4, 6]);
        assert_eq!(plan.files_for(2), vec![1, 3, 5, 7]);
        assert_eq!(plan.reader_index(1), None);

        // clamped to min(nprocs, num_files)
        assert_eq!(ReadPlan::distribute(4, 2, Some(16)).num_readers(), 2);
    }

    #[test]
    fn test_every_file_read_exactly_once() {
        for nprocs in [1, 2, 4, 8, 16] {
            for num_files in 1..12 {
                let plan = ReadPlan::distribute(nprocs, num_files, None);
                let mut seen: Vec<usize> = (0..nprocs).flat_map(|r| plan.files_for(r)).collect();
                seen.sort();
                assert_eq!(seen, (0..num_files).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_counts_sum_to_filtered_total() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let shards: Vec<_> = (0..3)
            .map(|_| {
                let mut slots = only(1, uniform_positions(&mut rng, 2_000, [10.0; 3]));
                slots[4] = uniform_positions(&mut rng, 300, [10.0; 3]);
                slots
            })
            .collect();
        let template = write_shards(dir.path(), 10.0, &shards);
        let extent = GlobalExtent::cube(10.0).unwrap();
        let table = DomainTable::uniform(extent, SplitPlan::new([0, 1, 2], 4).unwrap());

        let mut config = DecompositionConfig::new(template, 3);
        config.type_filter = TypeFilter::DarkMatter;
        let results = run_local_group(4, |comm| count_ownership(comm, &config, &table).unwrap());
        for counts in &results {
            assert_eq!(counts, &results[0]);
            assert_eq!(counts.total(), 6_000);
            assert!(counts.baryon.is_none());
        }

        config.baryon_search = true;
        let results = run_local_group(4, |comm| count_ownership(comm, &config, &table).unwrap());
        let counts = &results[0];
        assert_eq!(counts.primary.iter().sum::<u64>(), 6_000);
        assert_eq!(counts.baryon.as_ref().unwrap().iter().sum::<u64>(), 900);
        assert_eq!(counts.total(), 6_900);

        config.baryon_search = false;
        config.type_filter = TypeFilter::All;
        let whole = DomainTable::uniform(extent, SplitPlan::single());
        let serial = count_ownership(&SerialCommunicator, &config, &whole).unwrap();
        assert_eq!(serial.primary, vec![6_900]);
    }

    #[test]
    fn test_unowned_particle_aborts_group() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_shards(
            dir.path(),
            10.0,
            &[only(1, vec![[1.0, 1.0, 1.0]]), only(1, vec![[11.0, 1.0, 1.0]])],
        );
        let config = DecompositionConfig::new(template, 2);
        let table = DomainTable::uniform(
            GlobalExtent::cube(10.0).unwrap(),
            SplitPlan::new([0, 1, 2], 2).unwrap(),
        );

        let results = run_local_group(2, |comm| count_ownership(comm, &config, &table));
        assert!(matches!(results[0], Err(DecompositionError::Aborted(_))));
        match &results[1] {
            Err(DecompositionError::UnownedParticle { position }) => {
                assert_eq!(*position, [11.0, 1.0, 1.0]);
            }
            other => panic!("expected an unowned particle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_shard_aborts_group() {
        let config = DecompositionConfig::new("/nonexistent/snap", 1);
        let table = DomainTable::uniform(
            GlobalExtent::cube(1.0).unwrap(),
            SplitPlan::new([0, 1, 2], 4).unwrap(),
        );
        let results = run_local_group(4, |comm| count_ownership(comm, &config, &table));
        assert!(matches!(results[0], Err(DecompositionError::Io(_))));
        for r in 1..4 {
            assert!(matches!(results[r], Err(DecompositionError::Aborted(_))));
        }
    }
}
