use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::{debug, trace};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::algorithm::overlap::{overlap_matrix_refs, OverlapMode};
use crate::algorithm::pairs::{generate_match_pairs, MatchReport};
use crate::data::interaction::Interaction;
use crate::data::match_list::RecoObject;
use crate::data::particle::Particle;
use crate::error::{RecoError, RecoResult};

/// Per-source match rows: `(source_id, Some(candidate_id) | None)` with aligned scores.
///
/// Unmatched sources appear once with `None` and a score of `-1`.
pub type MatchRows = (Vec<(i64, Option<i64>)>, Vec<f64>);

/// Which collection plays the source role when matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchingMode {
    /// Predicted objects are matched onto truth objects.
    PredToTrue,
    /// Truth objects are matched onto predicted objects.
    #[default]
    TrueToPred,
    /// Both directions, run independently.
    Both,
}

impl MatchingMode {
    pub fn runs_true_to_pred(&self) -> bool {
        matches!(self, MatchingMode::TrueToPred | MatchingMode::Both)
    }

    pub fn runs_pred_to_true(&self) -> bool {
        matches!(self, MatchingMode::PredToTrue | MatchingMode::Both)
    }
}

impl FromStr for MatchingMode {
    type Err = RecoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pred_to_true" => Ok(MatchingMode::PredToTrue),
            "true_to_pred" => Ok(MatchingMode::TrueToPred),
            "both" => Ok(MatchingMode::Both),
            other => Err(RecoError::UnknownMatchingMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for MatchingMode {
    type Error = RecoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MatchingMode> for String {
    fn from(mode: MatchingMode) -> Self {
        mode.to_string()
    }
}

impl Display for MatchingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MatchingMode::PredToTrue => write!(f, "pred_to_true"),
            MatchingMode::TrueToPred => write!(f, "true_to_pred"),
            MatchingMode::Both => write!(f, "both"),
        }
    }
}

/// Scoring parameters shared by every matching pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Candidates must overlap strictly more than this to qualify.
    #[serde(default)]
    pub min_overlap: f64,
    #[serde(default)]
    pub overlap_mode: OverlapMode,
    /// Score with deposition weighted overlaps.
    #[serde(default)]
    pub weight: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            min_overlap: 0.0,
            overlap_mode: OverlapMode::Iou,
            weight: false,
        }
    }
}

impl MatchParams {
    pub fn validate(&self) -> RecoResult<()> {
        check_threshold(self.min_overlap)
    }
}

fn check_threshold(min_overlap: f64) -> RecoResult<()> {
    if !min_overlap.is_finite() || min_overlap < 0.0 {
        return Err(RecoError::InvalidThreshold(min_overlap));
    }
    Ok(())
}

/// Matches every source against all candidates and writes ranked match lists onto the sources.
///
/// # Description
///
/// A candidate qualifies for a source when its overlap is strictly greater than
/// `min_overlap`. Qualifying candidates are recorded on the source's match list with
/// their value-matrix score, highest first, ties in candidate order. The best candidate
/// of each row is flagged as a principal match; once flagged, later claims leave it as is.
///
/// # Arguments
///
/// * `sources` - Objects receiving match lists (matrix rows).
/// * `candidates` - Objects matched against (matrix columns).
/// * `overlap_matrix` - `|sources| x |candidates|` overlaps used for the threshold.
/// * `value_matrix` - `|sources| x |candidates|` scores recorded on the lists.
/// * `min_overlap` - Threshold, must be finite and non-negative.
///
/// # Returns
///
/// One row per qualifying pair, in rank order per source, and one `(source, None)`
/// row with score `-1` for each source without a qualifying candidate.
pub fn match_objects<S, C>(
    sources: &mut [S],
    candidates: &mut [C],
    overlap_matrix: &DMatrix<f64>,
    value_matrix: &DMatrix<f64>,
    min_overlap: f64,
) -> RecoResult<MatchRows>
where
    S: RecoObject,
    C: RecoObject,
{
    let mut sources: Vec<&mut S> = sources.iter_mut().collect();
    let mut candidates: Vec<&mut C> = candidates.iter_mut().collect();
    match_object_refs(&mut sources, &mut candidates, overlap_matrix, value_matrix, min_overlap)
}

/// [`match_objects`] over mutably borrowed objects, e.g. the members of an interaction.
pub fn match_object_refs<S, C>(
    sources: &mut [&mut S],
    candidates: &mut [&mut C],
    overlap_matrix: &DMatrix<f64>,
    value_matrix: &DMatrix<f64>,
    min_overlap: f64,
) -> RecoResult<MatchRows>
where
    S: RecoObject + ?Sized,
    C: RecoObject + ?Sized,
{
    check_threshold(min_overlap)?;
    let expected = (sources.len(), candidates.len());
    for shape in [overlap_matrix.shape(), value_matrix.shape()] {
        if shape != expected {
            return Err(RecoError::ShapeMismatch { expected, found: shape });
        }
    }

    let mut pairs: Vec<(i64, Option<i64>)> = Vec::with_capacity(sources.len());
    let mut counts: Vec<f64> = Vec::with_capacity(sources.len());

    for (i, source) in sources.iter_mut().enumerate() {
        let mut qualifying: Vec<(usize, f64)> = (0..candidates.len())
            .filter(|&j| overlap_matrix[(i, j)] > min_overlap)
            .map(|j| (j, value_matrix[(i, j)]))
            .collect();

        if qualifying.is_empty() {
            pairs.push((source.id(), None));
            counts.push(-1.0);
            continue;
        }

        // stable: equal scores stay in candidate order
        qualifying.sort_by(|a, b| b.1.total_cmp(&a.1));

        for &(j, score) in &qualifying {
            let candidate_id = candidates[j].id();
            source.match_list_mut().insert(candidate_id, score);
            pairs.push((source.id(), Some(candidate_id)));
            counts.push(score);
        }

        let (best, _) = qualifying[0];
        let principal = &mut candidates[best];
        if principal.is_principal_match() {
            trace!("object {} is already a principal match, claim by {} ignored", principal.id(), source.id());
        } else {
            trace!("object {} is the principal match of {}", principal.id(), source.id());
            principal.set_principal_match(true);
        }
    }

    debug!(
        "matched {} sources against {} candidates: {} rows",
        expected.0,
        expected.1,
        pairs.len()
    );
    Ok((pairs, counts))
}

/// Outcome of [`run_matching`], one entry per direction that was run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchPasses {
    /// Rows with truth objects as sources.
    pub true_to_pred: Option<MatchRows>,
    /// Rows with predicted objects as sources.
    pub pred_to_true: Option<MatchRows>,
}

/// Computes overlaps and runs the matcher in the direction(s) requested by `mode`.
///
/// In [`MatchingMode::Both`] the two passes are independent: each object receives its
/// ranked list from the pass where it is the source.
pub fn run_matching<T, P>(
    truth: &mut [T],
    pred: &mut [P],
    mode: MatchingMode,
    params: &MatchParams,
) -> RecoResult<MatchPasses>
where
    T: RecoObject + Sync,
    P: RecoObject + Sync,
{
    let mut truth: Vec<&mut T> = truth.iter_mut().collect();
    let mut pred: Vec<&mut P> = pred.iter_mut().collect();
    run_matching_refs(&mut truth, &mut pred, mode, params)
}

/// [`run_matching`] over mutably borrowed objects.
pub fn run_matching_refs<T, P>(
    truth: &mut [&mut T],
    pred: &mut [&mut P],
    mode: MatchingMode,
    params: &MatchParams,
) -> RecoResult<MatchPasses>
where
    T: RecoObject + Sync + ?Sized,
    P: RecoObject + Sync + ?Sized,
{
    params.validate()?;

    let (overlap, value) = {
        let truth_view: Vec<&T> = truth.iter().map(|t| &**t).collect();
        let pred_view: Vec<&P> = pred.iter().map(|p| &**p).collect();
        overlap_matrix_refs(&truth_view, &pred_view, params.overlap_mode, params.weight)
    };
    run_matching_with(truth, pred, &overlap, &value, mode, params.min_overlap)
}

/// Runs the matcher from precomputed truth x pred matrices.
///
/// The pred-to-true direction uses the transposed matrices.
pub fn run_matching_with<T, P>(
    truth: &mut [&mut T],
    pred: &mut [&mut P],
    overlap: &DMatrix<f64>,
    value: &DMatrix<f64>,
    mode: MatchingMode,
    min_overlap: f64,
) -> RecoResult<MatchPasses>
where
    T: RecoObject + ?Sized,
    P: RecoObject + ?Sized,
{
    let mut passes = MatchPasses::default();
    if mode.runs_true_to_pred() {
        passes.true_to_pred = Some(match_object_refs(truth, pred, overlap, value, min_overlap)?);
    }
    if mode.runs_pred_to_true() {
        passes.pred_to_true = Some(match_object_refs(
            pred,
            truth,
            &overlap.transpose(),
            &value.transpose(),
            min_overlap,
        )?);
    }
    Ok(passes)
}

/// Matches the member particles of all interactions against each other, unrestricted.
///
/// Truth particles without voxels are left out. Pairs are read back from the match
/// lists of the particles that took part, one direction per pass that was run.
pub fn match_member_particles(
    truth: &mut [Interaction],
    pred: &mut [Interaction],
    mode: MatchingMode,
    params: &MatchParams,
) -> RecoResult<MatchReport> {
    let mut truth_parts: Vec<&mut Particle> = truth
        .iter_mut()
        .flat_map(|ia| ia.particles_mut())
        .filter(|p| p.size() > 0)
        .collect();
    let mut pred_parts: Vec<&mut Particle> = pred.iter_mut().flat_map(|ia| ia.particles_mut()).collect();

    run_matching_refs(&mut truth_parts, &mut pred_parts, mode, params)?;

    let (t2r, r2t) = generate_match_pairs(
        truth_parts.iter().map(|p| &**p),
        pred_parts.iter().map(|p| &**p),
    );
    Ok(MatchReport {
        true_to_pred: mode.runs_true_to_pred().then_some(t2r),
        pred_to_true: mode.runs_pred_to_true().then_some(r2t),
    })
}
