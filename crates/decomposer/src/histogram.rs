//! Histograms and the weighted quantile boundary finder.
//!
//! Boundary search works in two coordinate systems: the physical coordinate
//! along an axis and the fractional bin coordinate `u = bin + f`. The latter
//! is what slab restriction uses to weight a bin that straddles a boundary.

use serde::{Deserialize, Serialize};

/// In-bin interpolation used when a cumulative target falls inside a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// `f = (ln t - ln c0) / (ln c1 - ln c0)`, linear when `c0 == 0`
    #[default]
    Logarithmic,
    /// `f = (t - c0) / (c1 - c0)`
    Linear,
}

impl Interpolation {
    /// Fraction of the way through a bin whose cumulative count rises from
    /// `c0` to `c1` at which the running count reaches `target`.
    pub fn fraction(self, c0: f64, c1: f64, target: f64) -> f64 {
        let f = match self {
            Interpolation::Logarithmic if c0 > 0.0 => {
                let denom = c1.ln() - c0.ln();
                if denom > 0.0 {
                    (target.ln() - c0.ln()) / denom
                } else {
                    1.0
                }
            }
            _ => {
                let denom = c1 - c0;
                if denom > 0.0 {
                    (target - c0) / denom
                } else {
                    1.0
                }
            }
        };
        if f.is_finite() {
            f.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// Fine bin count for a 1-D projection of `n` particles:
/// `floor(ceil(log2 n + 1) * n^(1/3))`, at least 1.
pub fn fine_bin_count(n: u64) -> usize {
    if n == 0 {
        return 1;
    }
    let n = n as f64;
    let bins = ((n.log2() + 1.0).ceil() * n.cbrt()).floor();
    (bins as usize).max(1)
}

/// Coarse bins per axis of the joint histogram: `ceil(log2 n / 3 + 1)^2`.
pub fn coarse_bin_count(n: u64) -> usize {
    if n == 0 {
        return 1;
    }
    let side = ((n as f64).log2() / 3.0 + 1.0).ceil() as usize;
    (side * side).max(1)
}

/// Running mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisMoments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl AxisMoments {
    /// Accumulate one sample.
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Samples seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance; zero before any sample.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Equal-width histogram over `[lo, hi]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformHistogram {
    lo: f64,
    hi: f64,
    counts: Vec<u64>,
}

impl UniformHistogram {
    /// `bins` empty bins spanning `[lo, hi]`.
    pub fn new(lo: f64, hi: f64, bins: usize) -> Self {
        Self {
            lo,
            hi,
            counts: vec![0; bins.max(1)],
        }
    }

    /// Bin holding `x`; values outside the range land in the end bins.
    pub fn bin_of(&self, x: f64) -> usize {
        let bins = self.counts.len();
        let scaled = (x - self.lo) / (self.hi - self.lo) * bins as f64;
        if scaled.is_nan() || scaled < 0.0 {
            0
        } else {
            (scaled as usize).min(bins - 1)
        }
    }

    /// Count one sample.
    pub fn push(&mut self, x: f64) {
        let bin = self.bin_of(x);
        self.counts[bin] += 1;
    }

    /// Raw counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total count.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// The `bins + 1` edges; the last edge is exactly `hi`.
    pub fn edges(&self) -> Vec<f64> {
        let bins = self.counts.len();
        let width = self.hi - self.lo;
        let mut edges: Vec<f64> = (0..bins)
            .map(|i| self.lo + width * (i as f64 / bins as f64))
            .collect();
        edges.push(self.hi);
        edges
    }
}

/// Where a cumulative target is reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Physical coordinate of the boundary
    pub value: f64,
    /// Fractional bin coordinate `bin + f`
    pub u: f64,
}

/// Find the point where the cumulative count of `counts` reaches `target`.
///
/// `edges` holds `counts.len() + 1` monotone bin edges. The crossing bin is
/// the first one whose cumulative count before is `< target` and after is
/// `>= target`. Targets at or below zero map to the first edge, targets past
/// the total to the last.
pub fn find_crossing(
    counts: &[f64],
    edges: &[f64],
    target: f64,
    interpolation: Interpolation,
) -> Crossing {
    debug_assert_eq!(edges.len(), counts.len() + 1);
    let nb = counts.len();

    if target <= 0.0 || nb == 0 {
        return Crossing {
            value: edges[0],
            u: 0.0,
        };
    }

    let mut c0 = 0.0;
    for (bin, &count) in counts.iter().enumerate() {
        let c1 = c0 + count;
        if c0 < target && c1 >= target {
            let f = interpolation.fraction(c0, c1, target);
            let (lo, hi) = (edges[bin], edges[bin + 1]);
            return Crossing {
                value: lo + f * (hi - lo),
                u: bin as f64 + f,
            };
        }
        c0 = c1;
    }

    Crossing {
        value: edges[nb],
        u: nb as f64,
    }
}

/// Edges splitting `counts` into `nb` bins of equal cumulative weight, with
/// the outer edges at `edges[0]` and `edges[last]`.
pub fn quantile_edges(
    counts: &[f64],
    edges: &[f64],
    nb: usize,
    interpolation: Interpolation,
) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    let mut out = Vec::with_capacity(nb + 1);
    out.push(edges[0]);
    for e in 1..nb {
        let target = total * e as f64 / nb as f64;
        out.push(find_crossing(counts, edges, target, interpolation).value);
    }
    out.push(edges[edges.len() - 1]);
    out
}

/// How much of each unit bin `[b, b+1]` lies inside `[u_lo, u_hi]`.
pub fn overlap_weights(nb: usize, u_lo: f64, u_hi: f64) -> Vec<f64> {
    (0..nb)
        .map(|b| {
            let lo = u_lo.max(b as f64);
            let hi = u_hi.min(b as f64 + 1.0);
            (hi - lo).max(0.0)
        })
        .collect()
}

/// Bin of `x` among non-uniform `edges`; clamps to the end bins.
pub fn bin_of(edges: &[f64], x: f64) -> usize {
    let nb = edges.len() - 1;
    edges[1..nb].partition_point(|&e| e <= x)
}

/// Joint histogram on quantile edges, with its 2-D and 1-D marginals.
///
/// Axes are slots in priority order, not physical axes.
#[derive(Debug, Clone)]
pub struct CoarseHistogram {
    nb: usize,
    edges: [Vec<f64>; 3],
    joint: Vec<u64>,
    marginal: Vec<u64>,
    primary: Vec<u64>,
}

impl CoarseHistogram {
    /// Empty histogram over the given per-slot edges (each `nb + 1` long).
    pub fn new(edges: [Vec<f64>; 3]) -> Self {
        let nb = edges[0].len() - 1;
        debug_assert!(edges.iter().all(|e| e.len() == nb + 1));
        Self {
            nb,
            edges,
            joint: vec![0; nb * nb * nb],
            marginal: vec![0; nb * nb],
            primary: vec![0; nb],
        }
    }

    /// Bins per slot.
    pub fn bins(&self) -> usize {
        self.nb
    }

    /// Edges of priority slot `slot`.
    pub fn edges(&self, slot: usize) -> &[f64] {
        &self.edges[slot]
    }

    /// Count one position given in priority order.
    pub fn push(&mut self, ordered: [f64; 3]) {
        let nb = self.nb;
        let a = bin_of(&self.edges[0], ordered[0]);
        let b = bin_of(&self.edges[1], ordered[1]);
        let c = bin_of(&self.edges[2], ordered[2]);
        self.joint[(a * nb + b) * nb + c] += 1;
        self.marginal[a * nb + b] += 1;
        self.primary[a] += 1;
    }

    /// Primary marginal as weights.
    pub fn primary_counts(&self) -> Vec<f64> {
        self.primary.iter().map(|&c| c as f64).collect()
    }

    /// Secondary profile of the slab with primary-bin weights `w0`.
    pub fn secondary_counts(&self, w0: &[f64]) -> Vec<f64> {
        let nb = self.nb;
        let mut out = vec![0.0; nb];
        for (a, &wa) in w0.iter().enumerate() {
            if wa == 0.0 {
                continue;
            }
            let row = &self.marginal[a * nb..(a + 1) * nb];
            for (slot, &count) in out.iter_mut().zip(row) {
                *slot += wa * count as f64;
            }
        }
        out
    }

    /// Tertiary profile of the cell with primary weights `w0` and secondary
    /// weights `w1`.
    pub fn tertiary_counts(&self, w0: &[f64], w1: &[f64]) -> Vec<f64> {
        let nb = self.nb;
        let mut out = vec![0.0; nb];
        for (a, &wa) in w0.iter().enumerate() {
            if wa == 0.0 {
                continue;
            }
            for (b, &wb) in w1.iter().enumerate() {
                let w = wa * wb;
                if w == 0.0 {
                    continue;
                }
                let start = (a * nb + b) * nb;
                for (slot, &count) in out.iter_mut().zip(&self.joint[start..start + nb]) {
                    *slot += w * count as f64;
                }
            }
        }
        out
    }
}
