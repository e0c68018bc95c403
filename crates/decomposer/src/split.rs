//! Axis ranking and the split plan.
//!
//! Ranks are laid out on a `s0 x s1 x s2` grid whose axes follow the axis
//! priority order. Grid cell `(i, j, k)` (indices along `axis_priority[0]`,
//! `[1]`, `[2]`) belongs to rank `i + j*s0 + k*s0*s1`.

use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};

/// `log2(n)` if `n` is a power of two.
pub fn exact_log2(n: usize) -> Option<u32> {
    if n.is_power_of_two() {
        Some(n.trailing_zeros())
    } else {
        None
    }
}

/// Order the axes by descending variance; the widest spread comes first and
/// receives the first split. Ties keep the lower axis first.
pub fn rank_axes(variance: [f64; 3]) -> Result<[usize; 3]> {
    for (axis, &v) in variance.iter().enumerate() {
        if !(v.is_finite() && v > 0.0) {
            return Err(DecompositionError::DegenerateInput(format!(
                "axis {} has variance {}; cannot rank split axes",
                axis, v
            )));
        }
    }
    let mut axes = [0usize, 1, 2];
    // stable sort keeps ties in axis order
    axes.sort_by(|&a, &b| variance[b].total_cmp(&variance[a]));
    Ok(axes)
}

/// How many times each axis is halved, and in which priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Axes from most to least prioritized
    pub axis_priority: [usize; 3],
    /// Partition count per axis (indexed by axis, each a power of two)
    pub partitions: [usize; 3],
}

impl SplitPlan {
    /// Distribute `log2(nprocs)` unit splits round-robin over `axis_priority`.
    pub fn new(axis_priority: [usize; 3], nprocs: usize) -> Result<Self> {
        let mut seen = [false; 3];
        for &axis in &axis_priority {
            if axis > 2 || seen[axis] {
                return Err(DecompositionError::Config(format!(
                    "axis priority {:?} is not a permutation of the three axes",
                    axis_priority
                )));
            }
            seen[axis] = true;
        }

        let total_splits = exact_log2(nprocs).ok_or_else(|| {
            DecompositionError::Config(format!(
                "rank count {} is not a power of two",
                nprocs
            ))
        })?;

        let mut splits = [0u32; 3];
        for n in 0..total_splits as usize {
            splits[axis_priority[n % 3]] += 1;
        }

        Ok(Self {
            axis_priority,
            partitions: splits.map(|s| 1usize << s),
        })
    }

    /// Plan for a single rank: no splits.
    pub fn single() -> Self {
        Self {
            axis_priority: [0, 1, 2],
            partitions: [1, 1, 1],
        }
    }

    /// Partition counts in priority order `(s0, s1, s2)`.
    pub fn grid(&self) -> [usize; 3] {
        self.axis_priority.map(|axis| self.partitions[axis])
    }

    /// Number of ranks the plan covers.
    pub fn nprocs(&self) -> usize {
        self.partitions.iter().product()
    }

    /// Rank owning grid cell `(i, j, k)` in priority order.
    pub fn rank_of(&self, cell: [usize; 3]) -> usize {
        let [s0, s1, _] = self.grid();
        cell[0] + cell[1] * s0 + cell[2] * s0 * s1
    }

    /// Grid cell `(i, j, k)` of `rank`, in priority order.
    pub fn cell_of(&self, rank: usize) -> [usize; 3] {
        let [s0, s1, _] = self.grid();
        [rank % s0, (rank / s0) % s1, rank / (s0 * s1)]
    }
}
