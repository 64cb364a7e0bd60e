//! Particle matching restricted to already matched interaction pairs.
//!
//! Instead of matching every predicted particle against every true particle of the
//! image, particles are only compared with the members of the interaction their own
//! interaction was matched to.

use std::collections::HashMap;

use log::debug;
use nalgebra::DMatrix;

use crate::algorithm::matching::{run_matching_with, MatchParams, MatchingMode};
use crate::algorithm::overlap::overlap_matrix_refs;
use crate::algorithm::pairs::{MatchPairs, MatchReport};
use crate::data::interaction::Interaction;
use crate::data::particle::Particle;
use crate::error::{RecoError, RecoResult};

fn position_by_id(interactions: &[Interaction]) -> HashMap<i64, usize> {
    interactions.iter().enumerate().map(|(i, ia)| (ia.id, i)).collect()
}

fn lookup(
    positions: &HashMap<i64, usize>,
    interaction_id: i64,
    kind: &'static str,
) -> RecoResult<usize> {
    positions
        .get(&interaction_id)
        .copied()
        .ok_or(RecoError::UnknownInteraction { kind, interaction_id })
}

fn require_particles(ia: &Interaction) -> RecoResult<()> {
    if ia.has_particles() {
        Ok(())
    } else {
        Err(RecoError::MissingParticles { interaction_id: ia.id })
    }
}

/// Truth x pred overlaps, computed with the smaller member set as rows.
fn pair_overlaps(
    truth: &[&mut Particle],
    pred: &[&mut Particle],
    params: &MatchParams,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let truth: Vec<&Particle> = truth.iter().map(|p| &**p).collect();
    let pred: Vec<&Particle> = pred.iter().map(|p| &**p).collect();
    if truth.len() <= pred.len() {
        overlap_matrix_refs(&truth, &pred, params.overlap_mode, params.weight)
    } else {
        let (overlap, value) = overlap_matrix_refs(&pred, &truth, params.overlap_mode, params.weight);
        (overlap.transpose(), value.transpose())
    }
}

/// Records every member of a lone interaction as unmatched in each requested direction.
fn push_unmatched(report: &mut MatchReport, ia: &Interaction) {
    for p in ia.particles() {
        let (truth, pred) = if ia.is_truth { (Some(p.id), None) } else { (None, Some(p.id)) };
        for pairs in [report.true_to_pred.as_mut(), report.pred_to_true.as_mut()].into_iter().flatten() {
            pairs.push(truth, pred, -1.0);
        }
    }
}

/// Matches particles only within matched interaction pairs.
///
/// # Description
///
/// For each `(truth_interaction_id, pred_interaction_id)` pair, the member particles of
/// one side are matched against the member particles of the other side only. When one
/// side of a pair is missing, every particle of the present side is recorded as
/// unmatched with a score of `-1`. Pairs missing both sides are skipped.
///
/// Match lists and principal-match flags are written onto the member particles. An
/// interaction appearing in several pairs accumulates matches from each of them.
///
/// # Arguments
///
/// * `truth` - Truth interactions, with member particles.
/// * `pred` - Predicted interactions, with member particles.
/// * `interaction_pairs` - Matched interaction ids, oriented `(truth, pred)`.
/// * `mode` - Direction(s) of the particle matching.
/// * `params` - Threshold and scoring parameters.
///
/// # Returns
///
/// Particle pairs oriented `(truth, pred)` for each direction that was run.
pub fn match_particles_within_interactions(
    truth: &mut [Interaction],
    pred: &mut [Interaction],
    interaction_pairs: &[(Option<i64>, Option<i64>)],
    mode: MatchingMode,
    params: &MatchParams,
) -> RecoResult<MatchReport> {
    params.validate()?;
    let truth_pos = position_by_id(truth);
    let pred_pos = position_by_id(pred);

    let mut report = MatchReport {
        true_to_pred: mode.runs_true_to_pred().then(MatchPairs::new),
        pred_to_true: mode.runs_pred_to_true().then(MatchPairs::new),
    };

    for &pair in interaction_pairs {
        match pair {
            (None, None) => continue,
            (Some(t_id), None) => {
                let ia = &truth[lookup(&truth_pos, t_id, "truth")?];
                require_particles(ia)?;
                push_unmatched(&mut report, ia);
            }
            (None, Some(p_id)) => {
                let ia = &pred[lookup(&pred_pos, p_id, "predicted")?];
                require_particles(ia)?;
                push_unmatched(&mut report, ia);
            }
            (Some(t_id), Some(p_id)) => {
                let t_ia = &mut truth[lookup(&truth_pos, t_id, "truth")?];
                let p_ia = &mut pred[lookup(&pred_pos, p_id, "predicted")?];
                require_particles(t_ia)?;
                require_particles(p_ia)?;

                let mut t_parts: Vec<&mut Particle> = t_ia.particles_mut().collect();
                let mut p_parts: Vec<&mut Particle> = p_ia.particles_mut().collect();
                let (overlap, value) = pair_overlaps(&t_parts, &p_parts, params);
                let passes = run_matching_with(
                    &mut t_parts,
                    &mut p_parts,
                    &overlap,
                    &value,
                    mode,
                    params.min_overlap,
                )?;

                if let (Some(out), Some(rows)) = (report.true_to_pred.as_mut(), passes.true_to_pred) {
                    out.extend(MatchPairs::from_truth_rows(rows));
                }
                if let (Some(out), Some(rows)) = (report.pred_to_true.as_mut(), passes.pred_to_true) {
                    out.extend(MatchPairs::from_pred_rows(rows));
                }
            }
        }
    }

    debug!(
        "hierarchical particle matching over {} interaction pairs done",
        interaction_pairs.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::interaction::InteractionOverrides;
    use crate::data::match_list::RecoObject;

    fn particle(id: i64, interaction_id: i64, index: Vec<i64>) -> Particle {
        let n = index.len();
        Particle::new(id, interaction_id, index, vec![[0.0; 3]; n], vec![1.0; n])
    }

    fn interaction(particles: Vec<Particle>) -> Interaction {
        Interaction::from_particles(particles, InteractionOverrides::default()).unwrap()
    }

    fn params(min_overlap: f64) -> MatchParams {
        MatchParams { min_overlap, ..Default::default() }
    }

    /// T1 = {p1, p2}, P1 = {q1, q2}; IoU(p1, q1) = 0.9, IoU(p2, q2) = 0.4.
    fn scenario() -> (Vec<Interaction>, Vec<Interaction>) {
        let truth = vec![interaction(vec![
            particle(1, 0, (0..10).collect()).truth(),
            particle(2, 0, vec![100, 101, 102, 103]).truth(),
        ])];
        let pred = vec![interaction(vec![
            particle(11, 5, (0..9).collect()),
            particle(12, 5, vec![102, 103, 104]),
        ])];
        (truth, pred)
    }

    #[test]
    fn test_restricted_true_to_pred() {
        let (mut truth, mut pred) = scenario();
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5))],
            MatchingMode::TrueToPred,
            &params(0.5),
        )
        .unwrap();

        assert!(report.pred_to_true.is_none());
        let t2r = report.true_to_pred.unwrap();
        assert_eq!(t2r.pairs, vec![(Some(1), Some(11)), (Some(2), None)]);
        assert!((t2r.counts[0] - 0.9).abs() < 1e-12);
        assert_eq!(t2r.counts[1], -1.0);

        assert_eq!(truth[0].particle(1).unwrap().match_ids(), vec![11]);
        assert!(truth[0].particle(2).unwrap().match_list().is_empty());
        assert!(pred[0].particle(11).unwrap().is_principal_match());
    }

    #[test]
    fn test_orientation_independent_of_member_counts() {
        let (mut truth, _) = scenario();
        let mut pred = vec![interaction(vec![
            particle(11, 5, (0..9).collect()),
            particle(12, 5, vec![102, 103, 104]),
            particle(13, 5, vec![500, 501]),
        ])];
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5))],
            MatchingMode::Both,
            &params(0.3),
        )
        .unwrap();

        let t2r = report.true_to_pred.unwrap();
        assert_eq!(t2r.pairs, vec![(Some(1), Some(11)), (Some(2), Some(12))]);
        let r2t = report.pred_to_true.unwrap();
        assert_eq!(r2t.pairs, vec![(Some(1), Some(11)), (Some(2), Some(12)), (None, Some(13))]);
        assert_eq!(r2t.counts[2], -1.0);
    }

    #[test]
    fn test_larger_truth_side() {
        let mut truth = vec![interaction(vec![
            particle(1, 0, (0..10).collect()).truth(),
            particle(2, 0, vec![100, 101, 102, 103]).truth(),
            particle(3, 0, vec![300]).truth(),
        ])];
        let mut pred = vec![interaction(vec![particle(11, 5, (0..9).collect())])];
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5))],
            MatchingMode::TrueToPred,
            &params(0.5),
        )
        .unwrap();
        let t2r = report.true_to_pred.unwrap();
        assert_eq!(t2r.pairs, vec![(Some(1), Some(11)), (Some(2), None), (Some(3), None)]);
        assert!((t2r.counts[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_one_row_set_per_interaction_pair() {
        let mut truth = vec![interaction(vec![
            particle(1, 0, (0..10).collect()).truth(),
            particle(2, 0, vec![100, 101, 102, 103]).truth(),
        ])];
        let mut pred = vec![
            interaction(vec![particle(11, 5, (0..9).collect())]),
            interaction(vec![particle(21, 6, vec![100, 101, 102, 103])]),
        ];
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5)), (Some(0), Some(6))],
            MatchingMode::TrueToPred,
            &params(0.0),
        )
        .unwrap();

        // each pair contributes its own rows, unmatched ones included
        let t2r = report.true_to_pred.unwrap();
        assert_eq!(
            t2r.pairs,
            vec![(Some(1), Some(11)), (Some(2), None), (Some(1), None), (Some(2), Some(21))]
        );
        assert_eq!(t2r.counts[1], -1.0);
        assert_eq!(t2r.counts[2], -1.0);
        assert_eq!(truth[0].particle(1).unwrap().match_ids(), vec![11]);
        assert_eq!(truth[0].particle(2).unwrap().match_ids(), vec![21]);
    }

    #[test]
    fn test_candidates_outside_the_pair_are_ignored() {
        let (mut truth, mut pred) = scenario();
        // a second predicted interaction duplicating p2 exactly
        pred.push(interaction(vec![particle(21, 6, vec![100, 101, 102, 103])]));
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5))],
            MatchingMode::TrueToPred,
            &params(0.5),
        )
        .unwrap();
        let t2r = report.true_to_pred.unwrap();
        assert_eq!(t2r.pairs[1], (Some(2), None));
        assert!(pred[1].particle(21).unwrap().match_list().is_empty());
        assert!(!pred[1].particle(21).unwrap().is_principal_match());
    }

    #[test]
    fn test_lone_interactions_are_recorded_unmatched() {
        let (mut truth, mut pred) = scenario();
        let report = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), None), (None, Some(5)), (None, None)],
            MatchingMode::TrueToPred,
            &params(0.0),
        )
        .unwrap();
        let t2r = report.true_to_pred.unwrap();
        assert_eq!(
            t2r.pairs,
            vec![(Some(1), None), (Some(2), None), (None, Some(11)), (None, Some(12))]
        );
        assert!(t2r.counts.iter().all(|&c| c == -1.0));
    }

    #[test]
    fn test_unknown_interaction_id() {
        let (mut truth, mut pred) = scenario();
        let err = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(42))],
            MatchingMode::TrueToPred,
            &params(0.0),
        )
        .unwrap_err();
        assert_eq!(err, RecoError::UnknownInteraction { kind: "predicted", interaction_id: 42 });
    }

    #[test]
    fn test_interactions_without_particles_fail() {
        let (mut truth, _) = scenario();
        let mut pred = vec![Interaction::from_geometry(5, vec![0], vec![[0.0; 3]], vec![1.0]).unwrap()];
        let err = match_particles_within_interactions(
            &mut truth,
            &mut pred,
            &[(Some(0), Some(5))],
            MatchingMode::TrueToPred,
            &params(0.0),
        )
        .unwrap_err();
        assert_eq!(err, RecoError::MissingParticles { interaction_id: 5 });
    }
}
