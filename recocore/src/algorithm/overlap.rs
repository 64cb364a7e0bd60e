use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::match_list::RecoObject;
use crate::error::RecoError;

/// How the similarity between two objects is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OverlapMode {
    /// Intersection over union of the voxel index sets.
    #[default]
    Iou,
    /// `1 / (1 + d)` with `d` the symmetric mean nearest-neighbour distance.
    Chamfer,
}

impl FromStr for OverlapMode {
    type Err = RecoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iou" => Ok(OverlapMode::Iou),
            "chamfer" | "chamfer_distance" => Ok(OverlapMode::Chamfer),
            other => Err(RecoError::UnknownOverlapMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for OverlapMode {
    type Error = RecoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OverlapMode> for String {
    fn from(mode: OverlapMode) -> Self {
        mode.to_string()
    }
}

impl Display for OverlapMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OverlapMode::Iou => write!(f, "iou"),
            OverlapMode::Chamfer => write!(f, "chamfer"),
        }
    }
}

/// Voxels of one object, sorted by index, duplicates collapsed onto the first occurrence.
struct VoxelSet {
    voxels: Vec<(i64, f64)>,
    total: f64,
}

impl VoxelSet {
    fn new<O: RecoObject + ?Sized>(obj: &O) -> Self {
        let deps = obj.depositions();
        let mut voxels: Vec<(i64, f64)> = obj
            .index()
            .iter()
            .enumerate()
            .map(|(k, &i)| (i, deps.get(k).map_or(0.0, |&d| (d as f64).max(0.0))))
            .collect();
        voxels.sort_by_key(|&(i, _)| i);
        voxels.dedup_by_key(|&mut (i, _)| i);
        let total = voxels.iter().map(|&(_, d)| d).sum();
        VoxelSet { voxels, total }
    }

    fn len(&self) -> usize {
        self.voxels.len()
    }

    /// (shared voxel count, shared weight) where a shared voxel weighs the mean of both depositions.
    fn intersect(&self, other: &VoxelSet) -> (usize, f64) {
        let (mut a, mut b) = (0, 0);
        let mut count = 0;
        let mut weight = 0.0;
        while a < self.voxels.len() && b < other.voxels.len() {
            let (ia, da) = self.voxels[a];
            let (ib, db) = other.voxels[b];
            if ia < ib {
                a += 1;
            } else if ib < ia {
                b += 1;
            } else {
                count += 1;
                weight += 0.5 * (da + db);
                a += 1;
                b += 1;
            }
        }
        (count, weight)
    }

    /// Returns (iou, deposition weighted iou).
    fn iou(&self, other: &VoxelSet) -> (f64, f64) {
        let (count, weight) = self.intersect(other);
        let union = self.len() + other.len() - count;
        let iou = if union == 0 { 0.0 } else { count as f64 / union as f64 };
        let w_union = self.total + other.total - weight;
        let w_iou = if w_union <= 0.0 { 0.0 } else { (weight / w_union).clamp(0.0, 1.0) };
        (iou, w_iou)
    }
}

#[inline]
fn distance(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    let dx = (a[0] - b[0]) as f64;
    let dy = (a[1] - b[1]) as f64;
    let dz = (a[2] - b[2]) as f64;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Mean distance from each point of `a` to its nearest neighbour in `b`.
fn directed_chamfer(a: &[[f32; 3]], a_weights: &[f32], b: &[[f32; 3]], weighted: bool) -> f64 {
    let mut sum = 0.0;
    let mut wsum = 0.0;
    for (k, pa) in a.iter().enumerate() {
        let nearest = b.iter().map(|pb| distance(pa, pb)).fold(f64::INFINITY, f64::min);
        let w = if weighted {
            a_weights.get(k).map_or(0.0, |&d| (d as f64).max(0.0))
        } else {
            1.0
        };
        sum += w * nearest;
        wsum += w;
    }
    if wsum > 0.0 {
        sum / wsum
    } else {
        // all weights vanished, fall back to the plain mean
        directed_chamfer(a, a_weights, b, false)
    }
}

/// Symmetric chamfer distance between the point clouds of two objects.
///
/// Infinite when either object has no points.
pub fn chamfer_distance<A, B>(a: &A, b: &B, weighted: bool) -> f64
where
    A: RecoObject + ?Sized,
    B: RecoObject + ?Sized,
{
    if a.points().is_empty() || b.points().is_empty() {
        return f64::INFINITY;
    }
    let ab = directed_chamfer(a.points(), a.depositions(), b.points(), weighted);
    let ba = directed_chamfer(b.points(), b.depositions(), a.points(), weighted);
    0.5 * (ab + ba)
}

#[inline]
fn chamfer_score(d: f64) -> f64 {
    if d.is_finite() { 1.0 / (1.0 + d) } else { 0.0 }
}

/// Intersection over union of the voxel index sets of two objects.
///
/// Zero when both objects are empty.
pub fn overlap_iou<A, B>(a: &A, b: &B) -> f64
where
    A: RecoObject + ?Sized,
    B: RecoObject + ?Sized,
{
    VoxelSet::new(a).iou(&VoxelSet::new(b)).0
}

/// Deposition weighted intersection over union.
///
/// A shared voxel contributes the mean of both objects' depositions there.
pub fn overlap_weighted_iou<A, B>(a: &A, b: &B) -> f64
where
    A: RecoObject + ?Sized,
    B: RecoObject + ?Sized,
{
    VoxelSet::new(a).iou(&VoxelSet::new(b)).1
}

/// Similarity in `[0, 1]` between two objects under the requested mode.
pub fn overlap<A, B>(a: &A, b: &B, mode: OverlapMode) -> f64
where
    A: RecoObject + ?Sized,
    B: RecoObject + ?Sized,
{
    match mode {
        OverlapMode::Iou => overlap_iou(a, b),
        OverlapMode::Chamfer => chamfer_score(chamfer_distance(a, b, false)),
    }
}

/// Computes the `|sources| x |candidates|` overlap matrix and its value matrix.
///
/// # Description
///
/// The overlap matrix holds the unweighted similarity. With `weighted` the value matrix
/// holds the deposition weighted analogue, otherwise it equals the overlap matrix.
/// Objects without voxels produce zero rows or columns.
///
/// # Example
///
/// ```rust
/// # use recocore::data::particle::Particle;
/// # use recocore::algorithm::overlap::{overlap_matrix, OverlapMode};
/// let a = vec![Particle::new(0, 0, vec![1, 2], vec![[0.0; 3]; 2], vec![1.0; 2])];
/// let b = vec![
///     Particle::new(0, 0, vec![2, 3], vec![[0.0; 3]; 2], vec![1.0; 2]),
///     Particle::new(1, 0, vec![], vec![], vec![]),
/// ];
/// let (ov, val) = overlap_matrix(&a, &b, OverlapMode::Iou, false);
/// assert_eq!(ov.shape(), (1, 2));
/// assert!((ov[(0, 0)] - 1.0 / 3.0).abs() < 1e-12);
/// assert_eq!(ov[(0, 1)], 0.0);
/// assert_eq!(ov, val);
/// ```
pub fn overlap_matrix<A, B>(
    sources: &[A],
    candidates: &[B],
    mode: OverlapMode,
    weighted: bool,
) -> (DMatrix<f64>, DMatrix<f64>)
where
    A: RecoObject + Sync,
    B: RecoObject + Sync,
{
    let sources: Vec<&A> = sources.iter().collect();
    let candidates: Vec<&B> = candidates.iter().collect();
    overlap_matrix_refs(&sources, &candidates, mode, weighted)
}

/// [`overlap_matrix`] over borrowed objects, e.g. the members of an interaction.
pub fn overlap_matrix_refs<A, B>(
    sources: &[&A],
    candidates: &[&B],
    mode: OverlapMode,
    weighted: bool,
) -> (DMatrix<f64>, DMatrix<f64>)
where
    A: RecoObject + Sync + ?Sized,
    B: RecoObject + Sync + ?Sized,
{
    let (n_rows, n_cols) = (sources.len(), candidates.len());
    if n_rows == 0 || n_cols == 0 {
        return (DMatrix::zeros(n_rows, n_cols), DMatrix::zeros(n_rows, n_cols));
    }

    let rows: Vec<Vec<(f64, f64)>> = match mode {
        OverlapMode::Iou => {
            let cand_sets: Vec<VoxelSet> = candidates.par_iter().map(|c| VoxelSet::new(*c)).collect();
            sources
                .par_iter()
                .map(|s| {
                    let set = VoxelSet::new(*s);
                    cand_sets.iter().map(|c| set.iou(c)).collect::<Vec<_>>()
                })
                .collect()
        }
        OverlapMode::Chamfer => sources
            .par_iter()
            .map(|s| {
                candidates
                    .iter()
                    .map(|c| {
                        let plain = chamfer_score(chamfer_distance(*s, *c, false));
                        let value = if weighted {
                            chamfer_score(chamfer_distance(*s, *c, true))
                        } else {
                            plain
                        };
                        (plain, value)
                    })
                    .collect::<Vec<_>>()
            })
            .collect(),
    };

    let overlap = DMatrix::from_fn(n_rows, n_cols, |i, j| rows[i][j].0);
    let value = if weighted {
        DMatrix::from_fn(n_rows, n_cols, |i, j| rows[i][j].1)
    } else {
        overlap.clone()
    };
    (overlap, value)
}
