//! Global extent, per-rank boxes, and point-to-owner lookup

use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};
use crate::split::SplitPlan;

/// Axis-aligned bounding region of the whole input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalExtent {
    /// `[min, max]` per axis
    pub bounds: [[f64; 2]; 3],
}

impl GlobalExtent {
    /// Extent from per-axis bounds; every axis needs finite `min < max`.
    pub fn new(bounds: [[f64; 2]; 3]) -> Result<Self> {
        for (axis, [lo, hi]) in bounds.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(DecompositionError::DegenerateInput(format!(
                    "axis {} extent [{}, {}] is empty",
                    axis, lo, hi
                )));
            }
        }
        Ok(Self { bounds })
    }

    /// `[0, edge]` on every axis.
    pub fn cube(edge: f64) -> Result<Self> {
        Self::new([[0.0, edge]; 3])
    }

    /// Lower bound along `axis`.
    pub fn min(&self, axis: usize) -> f64 {
        self.bounds[axis][0]
    }

    /// Upper bound along `axis`.
    pub fn max(&self, axis: usize) -> f64 {
        self.bounds[axis][1]
    }

    /// Width along `axis`.
    pub fn width(&self, axis: usize) -> f64 {
        self.max(axis) - self.min(axis)
    }

    /// Widen every axis by `fraction * width` on both sides.
    pub fn expanded(&self, fraction: f64) -> Self {
        let mut bounds = self.bounds;
        for (axis, b) in bounds.iter_mut().enumerate() {
            let pad = fraction * self.width(axis);
            b[0] -= pad;
            b[1] += pad;
        }
        Self { bounds }
    }

    /// Whether `p` lies inside the closed extent.
    pub fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|axis| p[axis] >= self.min(axis) && p[axis] <= self.max(axis))
    }
}

/// One rank's sub-domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBox {
    /// `[lower, upper]` per axis
    pub bounds: [[f64; 2]; 3],
}

impl DomainBox {
    /// Lower face along `axis`.
    pub fn lower(&self, axis: usize) -> f64 {
        self.bounds[axis][0]
    }

    /// Upper face along `axis`.
    pub fn upper(&self, axis: usize) -> f64 {
        self.bounds[axis][1]
    }

    /// Half-open membership `[lower, upper)`, with the upper face closed on
    /// axes flagged in `closed_upper`.
    pub fn contains(&self, p: [f64; 3], closed_upper: [bool; 3]) -> bool {
        (0..3).all(|axis| {
            let x = p[axis];
            x >= self.lower(axis)
                && (x < self.upper(axis) || (closed_upper[axis] && x == self.upper(axis)))
        })
    }

    /// Volume of the box.
    pub fn volume(&self) -> f64 {
        (0..3).map(|axis| self.upper(axis) - self.lower(axis)).product()
    }
}

/// Boundary faces of the nested split, in priority order.
///
/// Slab `i` along the primary axis spans `primary[i]..primary[i + 1]`; inside
/// it, secondary cell `j` spans `secondary[i][j]..secondary[i][j + 1]`; and
/// so on. Shared faces are stored once, so neighbours agree bit for bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitFaces {
    /// `s0 + 1` faces along the primary axis
    pub primary: Vec<f64>,
    /// Per primary slab, `s1 + 1` faces along the secondary axis
    pub secondary: Vec<Vec<f64>>,
    /// Per (primary, secondary) cell, `s2 + 1` faces along the tertiary axis
    pub tertiary: Vec<Vec<Vec<f64>>>,
}

fn even_faces(lo: f64, hi: f64, parts: usize) -> Vec<f64> {
    let mut faces: Vec<f64> = (0..parts)
        .map(|i| lo + (hi - lo) * (i as f64 / parts as f64))
        .collect();
    faces.push(hi);
    faces
}

/// Index of the cell among `faces` holding `x`, treating the last face as
/// closed; `None` outside `[faces[0], faces[last]]`.
fn cell_index(faces: &[f64], x: f64) -> Option<usize> {
    let last = faces.len() - 1;
    if !(x >= faces[0] && x <= faces[last]) {
        return None;
    }
    Some(faces[1..last].partition_point(|&f| f <= x))
}

/// The decomposition result: one box per rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTable {
    /// Split plan the table follows
    pub plan: SplitPlan,
    /// Extent the boxes tile
    pub extent: GlobalExtent,
    /// Nested boundary faces
    pub faces: SplitFaces,
    /// Box of every rank, indexed by rank
    pub boxes: Vec<DomainBox>,
}

impl DomainTable {
    /// Build the table from nested faces. Outer faces are pinned to the
    /// extent whatever `faces` holds there.
    pub fn from_faces(extent: GlobalExtent, plan: SplitPlan, mut faces: SplitFaces) -> Self {
        let [a0, a1, a2] = plan.axis_priority;
        let pin = |f: &mut Vec<f64>, axis: usize| {
            f[0] = extent.min(axis);
            let last = f.len() - 1;
            f[last] = extent.max(axis);
        };
        pin(&mut faces.primary, a0);
        for slab in &mut faces.secondary {
            pin(slab, a1);
        }
        for column in faces.tertiary.iter_mut().flatten() {
            pin(column, a2);
        }

        let boxes = (0..plan.nprocs())
            .map(|rank| {
                let [i, j, k] = plan.cell_of(rank);
                let mut bounds = [[0.0; 2]; 3];
                bounds[a0] = [faces.primary[i], faces.primary[i + 1]];
                bounds[a1] = [faces.secondary[i][j], faces.secondary[i][j + 1]];
                bounds[a2] = [faces.tertiary[i][j][k], faces.tertiary[i][j][k + 1]];
                DomainBox { bounds }
            })
            .collect();

        Self {
            plan,
            extent,
            faces,
            boxes,
        }
    }

    /// Even split of `extent` following `plan`; the seed decomposition used
    /// before histograms are available.
    pub fn uniform(extent: GlobalExtent, plan: SplitPlan) -> Self {
        let [a0, a1, a2] = plan.axis_priority;
        let [s0, s1, s2] = plan.grid();
        let faces = SplitFaces {
            primary: even_faces(extent.min(a0), extent.max(a0), s0),
            secondary: vec![even_faces(extent.min(a1), extent.max(a1), s1); s0],
            tertiary: vec![vec![even_faces(extent.min(a2), extent.max(a2), s2); s1]; s0],
        };
        Self::from_faces(extent, plan, faces)
    }

    /// Number of ranks.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether the table has no boxes.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Box of `rank`.
    pub fn box_of(&self, rank: usize) -> &DomainBox {
        &self.boxes[rank]
    }

    /// Rank whose box contains `p`.
    ///
    /// Boxes are half-open except on the outer upper faces of the extent, so
    /// every point inside the closed extent has exactly one owner.
    pub fn owner_of(&self, p: [f64; 3]) -> Option<usize> {
        let [a0, a1, a2] = self.plan.axis_priority;
        let i = cell_index(&self.faces.primary, p[a0])?;
        let j = cell_index(&self.faces.secondary[i], p[a1])?;
        let k = cell_index(&self.faces.tertiary[i][j], p[a2])?;
        Some(self.plan.rank_of([i, j, k]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_owner(table: &DomainTable, p: [f64; 3]) -> Option<usize> {
        let closed = [0, 1, 2].map(|axis| p[axis] == table.extent.max(axis));
        let owners: Vec<usize> = (0..table.len())
            .filter(|&r| table.box_of(r).contains(p, closed))
            .collect();
        assert!(owners.len() <= 1, "{:?} owned by {:?}", p, owners);
        owners.first().copied()
    }

    #[test]
    fn test_extent_validation() {
        assert!(GlobalExtent::cube(100.0).is_ok());
        assert!(matches!(
            GlobalExtent::cube(0.0),
            Err(DecompositionError::DegenerateInput(_))
        ));
        assert!(GlobalExtent::new([[0.0, 1.0], [2.0, 1.0], [0.0, 1.0]]).is_err());
        assert!(GlobalExtent::new([[0.0, f64::INFINITY], [0.0, 1.0], [0.0, 1.0]]).is_err());
    }

    #[test]
    fn test_expanded() {
        let e = GlobalExtent::cube(100.0).unwrap().expanded(0.001);
        assert!((e.min(0) + 0.1).abs() < 1e-12);
        assert!((e.max(2) - 100.1).abs() < 1e-12);
        assert!(e.contains([100.05, 0.0, -0.05]));
    }

    #[test]
    fn test_uniform_table_volumes() {
        let extent = GlobalExtent::cube(8.0).unwrap();
        let plan = SplitPlan::new([1, 2, 0], 8).unwrap();
        let table = DomainTable::uniform(extent, plan);

        assert_eq!(table.len(), 8);
        let total: f64 = table.boxes.iter().map(DomainBox::volume).sum();
        assert!((total - 512.0).abs() < 1e-9);
        for b in &table.boxes {
            assert!((b.volume() - 64.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rank_layout_follows_priority() {
        // primary axis 2 gets two slabs, secondary axis 0 two, tertiary axis 1 one
        let extent = GlobalExtent::cube(1.0).unwrap();
        let plan = SplitPlan::new([2, 0, 1], 4).unwrap();
        let table = DomainTable::uniform(extent, plan);

        // rank = i + j*s0: rank 1 is the upper primary slab, lower secondary
        assert_eq!(table.box_of(1).bounds[2], [0.5, 1.0]);
        assert_eq!(table.box_of(1).bounds[0], [0.0, 0.5]);
        assert_eq!(table.box_of(2).bounds[2], [0.0, 0.5]);
        assert_eq!(table.box_of(2).bounds[0], [0.5, 1.0]);
        assert_eq!(table.box_of(3).bounds[1], [0.0, 1.0]);
    }

    #[test]
    fn test_owner_lookup_matches_box_scan() {
        let extent = GlobalExtent::new([[-1.0, 3.0], [0.0, 2.0], [5.0, 9.0]]).unwrap();
        let plan = SplitPlan::new([0, 2, 1], 16).unwrap();
        let table = DomainTable::uniform(extent, plan);

        let steps = 13;
        for a in 0..=steps {
            for b in 0..=steps {
                for c in 0..=steps {
                    let p = [
                        -1.0 + 4.0 * a as f64 / steps as f64,
                        2.0 * b as f64 / steps as f64,
                        5.0 + 4.0 * c as f64 / steps as f64,
                    ];
                    let owner = table.owner_of(p);
                    assert!(owner.is_some(), "{:?} unowned", p);
                    assert_eq!(owner, linear_owner(&table, p));
                }
            }
        }
    }

    #[test]
    fn test_faces_and_corners() {
        let extent = GlobalExtent::cube(2.0).unwrap();
        let plan = SplitPlan::new([0, 1, 2], 8).unwrap();
        let table = DomainTable::uniform(extent, plan);

        // interior face belongs to the upper cell
        assert_eq!(table.owner_of([1.0, 0.0, 0.0]), Some(1));
        // outer upper corner is closed
        assert_eq!(table.owner_of([2.0, 2.0, 2.0]), Some(7));
        assert_eq!(table.owner_of([0.0, 0.0, 0.0]), Some(0));
        assert_eq!(table.owner_of([2.0000001, 1.0, 1.0]), None);
        assert_eq!(table.owner_of([-1e-12, 1.0, 1.0]), None);
        assert_eq!(table.owner_of([f64::NAN, 1.0, 1.0]), None);
    }

    #[test]
    fn test_outer_faces_pinned() {
        let extent = GlobalExtent::cube(10.0).unwrap();
        let plan = SplitPlan::new([0, 1, 2], 2).unwrap();
        let faces = SplitFaces {
            primary: vec![0.5, 4.0, 9.5],
            secondary: vec![vec![1.0, 9.0]; 2],
            tertiary: vec![vec![vec![-3.0, 12.0]]; 2],
        };
        let table = DomainTable::from_faces(extent, plan, faces);
        assert_eq!(table.box_of(0).bounds, [[0.0, 4.0], [0.0, 10.0], [0.0, 10.0]]);
        assert_eq!(table.box_of(1).bounds, [[4.0, 10.0], [0.0, 10.0], [0.0, 10.0]]);
    }

    #[test]
    fn test_single_rank_table_is_extent() {
        let extent = GlobalExtent::new([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        let table = DomainTable::uniform(extent, SplitPlan::single());
        assert_eq!(table.len(), 1);
        assert_eq!(table.box_of(0).bounds, extent.bounds);
    }
}
