//! Histogram-based boundary solver
//!
//! Two passes over the filtered positions. The first collects per-axis
//! moments and fine histograms, which fix the axis priority and the coarse
//! quantile edges. The second fills the coarse joint histogram. The box
//! faces then come from nested quantile walks: primary slabs from the 1-D
//! marginal, secondary cells from the 2-D marginal restricted to each slab,
//! and tertiary cells from the joint histogram restricted to each cell.

use snapshot::SnapshotSet;

use crate::config::DecompositionConfig;
use crate::domain::{DomainTable, GlobalExtent, SplitFaces};
use crate::error::{DecompositionError, Result};
use crate::extent::{filtered_total, for_each_filtered};
use crate::histogram::{
    coarse_bin_count, fine_bin_count, find_crossing, overlap_weights, quantile_edges,
    AxisMoments, CoarseHistogram, Interpolation, UniformHistogram,
};
use crate::split::{exact_log2, rank_axes, SplitPlan};

/// Pass-1 statistics of one axis.
#[derive(Debug, Clone)]
struct AxisProfile {
    moments: AxisMoments,
    fine: UniformHistogram,
}

/// Computes the per-rank domain table on the coordinator.
pub struct BoundarySolver<'a> {
    config: &'a DecompositionConfig,
    nprocs: usize,
}

impl<'a> BoundarySolver<'a> {
    /// Solver for `nprocs` ranks.
    pub fn new(config: &'a DecompositionConfig, nprocs: usize) -> Self {
        Self { config, nprocs }
    }

    /// Compute one box per rank tiling `extent`.
    ///
    /// A single rank gets the whole extent without touching any shard.
    pub fn solve(&self, extent: GlobalExtent) -> Result<DomainTable> {
        if exact_log2(self.nprocs).is_none() {
            return Err(DecompositionError::Config(format!(
                "rank count {} is not a power of two",
                self.nprocs
            )));
        }
        if self.nprocs == 1 {
            return Ok(DomainTable::uniform(extent, SplitPlan::single()));
        }

        let set = self.config.snapshot_set();
        let filter = self.config.type_filter;
        let n_total = filtered_total(&set, filter)?;
        if n_total == 0 {
            return Err(DecompositionError::DegenerateInput(format!(
                "no {:?} particles in {} shard(s)",
                filter,
                set.num_files()
            )));
        }

        let fine_bins = fine_bin_count(n_total);
        let coarse_bins = coarse_bin_count(n_total);
        tracing::info!(
            "Solving boundaries for {} ranks: {} particles, {} fine bins, {} coarse bins",
            self.nprocs,
            n_total,
            fine_bins,
            coarse_bins
        );

        let profiles = self.projection_pass(&set, &extent, fine_bins)?;
        let variance = [0, 1, 2].map(|axis| profiles[axis].moments.variance());
        let priority = rank_axes(variance)?;
        let plan = SplitPlan::new(priority, self.nprocs)?;
        tracing::info!(
            "Axis priority {:?} (variance {:?}), partitions {:?}",
            priority,
            variance,
            plan.grid()
        );

        let interpolation = self.config.interpolation;
        let edges = priority.map(|axis| {
            let fine = &profiles[axis].fine;
            let counts: Vec<f64> = fine.counts().iter().map(|&c| c as f64).collect();
            quantile_edges(&counts, &fine.edges(), coarse_bins, interpolation)
        });

        let histogram = self.joint_pass(&set, priority, edges)?;
        let faces = walk(&histogram, &plan, interpolation)?;
        let table = DomainTable::from_faces(extent, plan, faces);

        for (rank, b) in table.boxes.iter().enumerate() {
            tracing::debug!("  rank {}: {:?}", rank, b.bounds);
        }
        Ok(table)
    }

    fn projection_pass(
        &self,
        set: &SnapshotSet,
        extent: &GlobalExtent,
        fine_bins: usize,
    ) -> Result<[AxisProfile; 3]> {
        let mut profiles = [0, 1, 2].map(|axis| AxisProfile {
            moments: AxisMoments::default(),
            fine: UniformHistogram::new(extent.min(axis), extent.max(axis), fine_bins),
        });

        let seen = for_each_filtered(set, self.config.type_filter, |p| {
            for (profile, &x) in profiles.iter_mut().zip(&p) {
                profile.moments.push(x);
                profile.fine.push(x);
            }
        })?;
        tracing::debug!("Projection pass read {} positions", seen);
        Ok(profiles)
    }

    fn joint_pass(
        &self,
        set: &SnapshotSet,
        priority: [usize; 3],
        edges: [Vec<f64>; 3],
    ) -> Result<CoarseHistogram> {
        let mut histogram = CoarseHistogram::new(edges);
        let seen = for_each_filtered(set, self.config.type_filter, |p| {
            histogram.push(priority.map(|axis| p[axis]));
        })?;
        tracing::debug!("Joint pass read {} positions", seen);
        Ok(histogram)
    }
}

/// Faces splitting `counts` into `parts` pieces of equal weight, as physical
/// values and as fractional bin coordinates.
fn split_profile(
    counts: &[f64],
    edges: &[f64],
    parts: usize,
    interpolation: Interpolation,
    region: &dyn Fn() -> String,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let nb = counts.len();
    let mut faces = vec![edges[0]];
    let mut us = vec![0.0];

    if parts > 1 {
        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return Err(DecompositionError::DegenerateInput(format!(
                "{} is empty but must be split {} ways",
                region(),
                parts
            )));
        }
        for i in 1..parts {
            let crossing = find_crossing(counts, edges, total * i as f64 / parts as f64, interpolation);
            faces.push(crossing.value);
            us.push(crossing.u);
        }
    }

    faces.push(edges[nb]);
    us.push(nb as f64);
    Ok((faces, us))
}

fn walk(
    histogram: &CoarseHistogram,
    plan: &SplitPlan,
    interpolation: Interpolation,
) -> Result<SplitFaces> {
    let nb = histogram.bins();
    let [s0, s1, s2] = plan.grid();

    let (primary, u0) = split_profile(
        &histogram.primary_counts(),
        histogram.edges(0),
        s0,
        interpolation,
        &|| "the primary axis".to_string(),
    )?;

    let mut secondary = Vec::with_capacity(s0);
    let mut tertiary = Vec::with_capacity(s0);
    for i in 0..s0 {
        let w0 = overlap_weights(nb, u0[i], u0[i + 1]);
        let (faces1, u1) = split_profile(
            &histogram.secondary_counts(&w0),
            histogram.edges(1),
            s1,
            interpolation,
            &|| format!("primary slab {}", i),
        )?;

        let mut columns = Vec::with_capacity(s1);
        for j in 0..s1 {
            let faces2 = if s2 > 1 {
                let w1 = overlap_weights(nb, u1[j], u1[j + 1]);
                split_profile(
                    &histogram.tertiary_counts(&w0, &w1),
                    histogram.edges(2),
                    s2,
                    interpolation,
                    &|| format!("cell ({}, {})", i, j),
                )?
                .0
            } else {
                let e = histogram.edges(2);
                vec![e[0], e[nb]]
            };
            columns.push(faces2);
        }

        secondary.push(faces1);
        tertiary.push(columns);
    }

    Ok(SplitFaces {
        primary,
        secondary,
        tertiary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{only, uniform_positions, write_shards};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use snapshot::TypeFilter;

    fn owner_counts(table: &DomainTable, positions: &[[f64; 3]]) -> Vec<u64> {
        let mut counts = vec![0u64; table.len()];
        for &p in positions {
            counts[table.owner_of(p).unwrap()] += 1;
        }
        counts
    }

    /// Along each priority slot, consecutive cells share a bit-identical face
    /// and the outermost faces are the extent.
    fn assert_tiles(table: &DomainTable) {
        let axes = table.plan.axis_priority;
        let sizes = table.plan.grid();
        for rank in 0..table.len() {
            let cell = table.plan.cell_of(rank);
            let b = table.box_of(rank);
            for slot in 0..3 {
                let axis = axes[slot];
                assert!(b.lower(axis) <= b.upper(axis));
                if cell[slot] == 0 {
                    assert_eq!(b.lower(axis).to_bits(), table.extent.min(axis).to_bits());
                }
                if cell[slot] + 1 == sizes[slot] {
                    assert_eq!(b.upper(axis).to_bits(), table.extent.max(axis).to_bits());
                } else {
                    let mut next = cell;
                    next[slot] += 1;
                    let neighbour = table.box_of(table.plan.rank_of(next));
                    assert_eq!(b.upper(axis).to_bits(), neighbour.lower(axis).to_bits());
                }
            }
        }
    }

    #[test]
    fn test_single_rank_touches_no_file() {
        let config = DecompositionConfig::new("/nonexistent/snap", 4);
        let extent = GlobalExtent::cube(100.0).unwrap();
        let table = BoundarySolver::new(&config, 1).solve(extent).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.box_of(0).bounds, extent.bounds);
    }

    #[test]
    fn test_non_power_of_two_rank_count() {
        let config = DecompositionConfig::new("/nonexistent/snap", 1);
        let extent = GlobalExtent::cube(1.0).unwrap();
        assert!(matches!(
            BoundarySolver::new(&config, 12).solve(extent),
            Err(DecompositionError::Config(_))
        ));
    }

    #[test]
    fn test_no_filtered_particles_is_degenerate() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let dm = uniform_positions(&mut rng, 500, [10.0; 3]);
        let template = write_shards(dir.path(), 10.0, &[only(1, dm)]);

        let mut config = DecompositionConfig::new(template, 1);
        config.type_filter = TypeFilter::Star;
        let extent = GlobalExtent::cube(10.0).unwrap();
        assert!(matches!(
            BoundarySolver::new(&config, 2).solve(extent),
            Err(DecompositionError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_flat_axis_is_degenerate() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let dm: Vec<[f64; 3]> = uniform_positions(&mut rng, 500, [10.0; 3])
            .into_iter()
            .map(|p| [p[0], 5.0, p[2]])
            .collect();
        let template = write_shards(dir.path(), 10.0, &[only(1, dm)]);
        let config = DecompositionConfig::new(template, 1);
        assert!(matches!(
            BoundarySolver::new(&config, 4).solve(GlobalExtent::cube(10.0).unwrap()),
            Err(DecompositionError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_balanced_tiling_with_eight_ranks() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let a = uniform_positions(&mut rng, 20_000, [100.0; 3]);
        let b = uniform_positions(&mut rng, 20_000, [100.0; 3]);
        let template = write_shards(dir.path(), 100.0, &[only(1, a.clone()), only(1, b.clone())]);
        let config = DecompositionConfig::new(template, 2);
        let extent = GlobalExtent::cube(100.0).unwrap();

        let table = BoundarySolver::new(&config, 8).solve(extent).unwrap();
        assert_eq!(table.plan.grid(), [2, 2, 2]);
        assert_tiles(&table);

        let all: Vec<[f64; 3]> = a.into_iter().chain(b).collect();
        let counts = owner_counts(&table, &all);
        assert_eq!(counts.iter().sum::<u64>(), 40_000);
        for (rank, &c) in counts.iter().enumerate() {
            assert!((4_500..=5_500).contains(&c), "rank {} owns {}", rank, c);
        }
    }

    #[test]
    fn test_anisotropic_priority_and_skewed_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        // wide in z, narrow in x; density piles up toward low z
        let positions: Vec<[f64; 3]> = uniform_positions(&mut rng, 30_000, [10.0, 40.0, 100.0])
            .into_iter()
            .map(|p| [p[0], p[1], (p[2] * p[2] / 100.0) as f32 as f64])
            .collect();
        let template = write_shards(dir.path(), 100.0, &[only(1, positions.clone())]);

        for interpolation in [Interpolation::Logarithmic, Interpolation::Linear] {
            let mut config = DecompositionConfig::new(template.clone(), 1);
            config.interpolation = interpolation;
            let extent = GlobalExtent::cube(100.0).unwrap();
            let table = BoundarySolver::new(&config, 4).solve(extent).unwrap();

            assert_eq!(table.plan.axis_priority, [2, 1, 0]);
            assert_eq!(table.plan.partitions, [1, 2, 2]);
            assert_tiles(&table);

            // the primary split sits well below the geometric middle
            assert!(table.faces.primary[1] < 40.0, "{:?}", table.faces.primary);

            let counts = owner_counts(&table, &positions);
            for &c in &counts {
                assert!((6_750..=8_250).contains(&c), "{:?}: {:?}", interpolation, counts);
            }
        }
    }

    #[test]
    fn test_solver_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let dm = uniform_positions(&mut rng, 5_000, [1.0, 2.0, 3.0]);
        let gas = uniform_positions(&mut rng, 1_000, [1.0, 2.0, 3.0]);
        let mut slots = only(1, dm);
        slots[0] = gas;
        let template = write_shards(dir.path(), 3.0, &[slots]);

        let mut config = DecompositionConfig::new(template, 1);
        config.type_filter = TypeFilter::DarkMatter;
        let extent = GlobalExtent::cube(3.0).unwrap();
        let first = BoundarySolver::new(&config, 16).solve(extent).unwrap();
        let second = BoundarySolver::new(&config, 16).solve(extent).unwrap();
        assert_eq!(first, second);
        assert_tiles(&first);
    }
}
