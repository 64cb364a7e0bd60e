use std::fmt;
use std::fmt::{Display, Formatter};

use log::debug;
use recocore::algorithm::hierarchical::match_particles_within_interactions;
use recocore::algorithm::matching::{match_member_particles, run_matching_refs, MatchingMode};
use recocore::algorithm::pairs::{generate_match_pairs, MatchPairs, MatchReport};
use recocore::data::interaction::Interaction;
use recocore::error::RecoResult;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::MatchConfig;
use crate::data::unit::Unit;

/// The object level a set of match pairs refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Particle,
    Interaction,
}

impl ObjectKind {
    pub fn singular(&self) -> &'static str {
        match self {
            ObjectKind::Particle => "particle",
            ObjectKind::Interaction => "interaction",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ObjectKind::Particle => "particles",
            ObjectKind::Interaction => "interactions",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.singular())
    }
}

/// Match pairs of one object kind, laid out the way they are reported.
///
/// # Description
///
/// Serializes as a flat mapping. A single-direction mode yields `matched_<kinds>` and
/// `<kind>_match_counts`; `both` yields `matched_<kinds>_t2r`, `matched_<kinds>_t2r_values`,
/// `matched_<kinds>_r2t` and `matched_<kinds>_r2t_values`.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchOutput {
    pub kind: ObjectKind,
    pub mode: MatchingMode,
    pub report: MatchReport,
}

impl MatchOutput {
    pub fn new(kind: ObjectKind, mode: MatchingMode, report: MatchReport) -> Self {
        MatchOutput { kind, mode, report }
    }

    /// Keeps the directions `mode` asks for out of a full `(t2r, r2t)` pair set.
    pub fn from_pairs(kind: ObjectKind, mode: MatchingMode, t2r: MatchPairs, r2t: MatchPairs) -> Self {
        let report = MatchReport {
            true_to_pred: mode.runs_true_to_pred().then_some(t2r),
            pred_to_true: mode.runs_pred_to_true().then_some(r2t),
        };
        MatchOutput::new(kind, mode, report)
    }

    /// The pairs of the leading direction: `t2r` unless only `pred_to_true` was run.
    pub fn primary_pairs(&self) -> Option<&MatchPairs> {
        match self.mode {
            MatchingMode::PredToTrue => self.report.pred_to_true.as_ref(),
            MatchingMode::TrueToPred | MatchingMode::Both => self.report.true_to_pred.as_ref(),
        }
    }

    /// Report keys in serialization order.
    pub fn keys(&self) -> Vec<String> {
        let kinds = self.kind.plural();
        match self.mode {
            MatchingMode::Both => vec![
                format!("matched_{}_t2r", kinds),
                format!("matched_{}_t2r_values", kinds),
                format!("matched_{}_r2t", kinds),
                format!("matched_{}_r2t_values", kinds),
            ],
            _ => vec![
                format!("matched_{}", kinds),
                format!("{}_match_counts", self.kind.singular()),
            ],
        }
    }
}

impl Serialize for MatchOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let empty = MatchPairs::new();
        let t2r = self.report.true_to_pred.as_ref().unwrap_or(&empty);
        let r2t = self.report.pred_to_true.as_ref().unwrap_or(&empty);
        let keys = self.keys();

        let mut map = serializer.serialize_map(Some(keys.len()))?;
        match self.mode {
            MatchingMode::Both => {
                map.serialize_entry(&keys[0], &t2r.pairs)?;
                map.serialize_entry(&keys[1], &t2r.counts)?;
                map.serialize_entry(&keys[2], &r2t.pairs)?;
                map.serialize_entry(&keys[3], &r2t.counts)?;
            }
            MatchingMode::TrueToPred => {
                map.serialize_entry(&keys[0], &t2r.pairs)?;
                map.serialize_entry(&keys[1], &t2r.counts)?;
            }
            MatchingMode::PredToTrue => {
                map.serialize_entry(&keys[0], &r2t.pairs)?;
                map.serialize_entry(&keys[1], &r2t.counts)?;
            }
        }
        map.end()
    }
}

/// Matches the unit's predicted interactions against its truth interactions.
///
/// Truth interactions without voxels take no part.
pub fn match_interactions(unit: &mut Unit, config: &MatchConfig) -> RecoResult<MatchOutput> {
    let mut truth: Vec<&mut Interaction> = unit.truth_interactions.iter_mut().filter(|ia| ia.size() > 0).collect();
    let mut pred: Vec<&mut Interaction> = unit.interactions.iter_mut().collect();

    run_matching_refs(&mut truth, &mut pred, config.matching_mode, &config.params)?;
    let (t2r, r2t) = generate_match_pairs(truth.iter().map(|ia| &**ia), pred.iter().map(|ia| &**ia));

    debug!("unit {}: {} interaction pairs ({})", unit.entry, t2r.len().max(r2t.len()), config.matching_mode);
    Ok(MatchOutput::from_pairs(ObjectKind::Interaction, config.matching_mode, t2r, r2t))
}

/// Matches all particles of the unit against each other, regardless of interaction membership.
pub fn match_particles(unit: &mut Unit, config: &MatchConfig) -> RecoResult<MatchOutput> {
    let report = match_member_particles(
        &mut unit.truth_interactions,
        &mut unit.interactions,
        config.matching_mode,
        &config.params,
    )?;
    Ok(MatchOutput::new(ObjectKind::Particle, config.matching_mode, report))
}

/// Matches particles only within the given matched interaction pairs.
///
/// # Arguments
///
/// * `unit` - The unit owning both interaction collections.
/// * `interaction_pairs` - Interaction ids oriented `(truth, pred)`, e.g. from [`match_interactions`].
/// * `config` - Particle matching settings.
pub fn match_particles_hierarchical(
    unit: &mut Unit,
    interaction_pairs: &MatchPairs,
    config: &MatchConfig,
) -> RecoResult<MatchOutput> {
    let report = match_particles_within_interactions(
        &mut unit.truth_interactions,
        &mut unit.interactions,
        &interaction_pairs.pairs,
        config.matching_mode,
        &config.params,
    )?;
    Ok(MatchOutput::new(ObjectKind::Particle, config.matching_mode, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::unit::UnitInput;
    use recocore::algorithm::matching::MatchParams;
    use recocore::data::match_list::RecoObject;
    use recocore::data::particle::Particle;
    use serde_json::json;

    fn particle(id: i64, interaction_id: i64, index: Vec<i64>) -> Particle {
        let n = index.len();
        Particle::new(id, interaction_id, index, vec![[0.0; 3]; n], vec![1.0; n])
    }

    /// Truth interaction 0 = {1, 2}, predicted interaction 5 = {11, 12}, predicted interaction 6 = {21}.
    fn unit() -> Unit {
        Unit::from_input(UnitInput {
            entry: 0,
            truth_particles: vec![particle(1, 0, (0..10).collect()), particle(2, 0, vec![100, 101, 102, 103])],
            particles: vec![
                particle(11, 5, (0..9).collect()),
                particle(12, 5, vec![102, 103, 104]),
                particle(21, 6, vec![100, 101, 102, 103]),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    fn config(mode: &str, min_overlap: f64) -> MatchConfig {
        MatchConfig::new(mode, min_overlap, "iou", false).unwrap()
    }

    #[test]
    fn test_interaction_matching() {
        let mut unit = unit();
        let output = match_interactions(&mut unit, &config("true_to_pred", 0.0)).unwrap();

        let pairs = output.primary_pairs().unwrap();
        assert_eq!(pairs.pairs, vec![(Some(0), Some(5)), (Some(0), Some(6))]);
        // 11 shared voxels, 14 + 12 - 11 in the union
        assert!((pairs.counts[0] - 11.0 / 15.0).abs() < 1e-12);
        assert!(unit.interaction(5).unwrap().is_principal_match());
        assert!(unit.truth_interaction(0).unwrap().is_matched());
    }

    #[test]
    fn test_flat_and_hierarchical_particle_matching_differ() {
        let mut flat_unit = unit();
        let flat = match_particles(&mut flat_unit, &config("true_to_pred", 0.5)).unwrap();
        let flat_pairs = flat.primary_pairs().unwrap();
        assert_eq!(flat_pairs.pairs, vec![(Some(1), Some(11)), (Some(2), Some(21))]);

        let mut unit = unit();
        let pairs = MatchPairs {
            pairs: vec![(Some(0), Some(5))],
            counts: vec![0.8],
        };
        let nested = match_particles_hierarchical(&mut unit, &pairs, &config("true_to_pred", 0.5)).unwrap();
        let nested_pairs = nested.primary_pairs().unwrap();
        assert_eq!(nested_pairs.pairs, vec![(Some(1), Some(11)), (Some(2), None)]);
        assert_eq!(nested_pairs.counts[1], -1.0);
    }

    #[test]
    fn test_empty_truth_interactions_are_skipped() {
        let mut unit = unit();
        unit.truth_interactions.push(Interaction::from_geometry(9, vec![], vec![], vec![]).unwrap().truth());
        let output = match_interactions(&mut unit, &config("both", 0.0)).unwrap();
        let t2r = output.report.true_to_pred.unwrap();
        assert!(t2r.pairs.iter().all(|(t, _)| *t == Some(0)));
    }

    #[test]
    fn test_single_direction_keys() {
        let output = MatchOutput::from_pairs(
            ObjectKind::Particle,
            MatchingMode::PredToTrue,
            MatchPairs::new(),
            MatchPairs { pairs: vec![(Some(1), Some(11)), (None, Some(12))], counts: vec![0.9, -1.0] },
        );
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(
            value,
            json!({
                "matched_particles": [[1, 11], [null, 12]],
                "particle_match_counts": [0.9, -1.0],
            })
        );
    }

    #[test]
    fn test_both_mode_keys() {
        let mut unit = unit();
        let config = MatchConfig {
            matching_mode: MatchingMode::Both,
            params: MatchParams::default(),
        };
        let output = match_interactions(&mut unit, &config).unwrap();
        let value = serde_json::to_value(&output).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        for key in output.keys() {
            assert!(value.get(&key).is_some(), "missing {}", key);
        }
        assert_eq!(value["matched_interactions_r2t"], json!([[0, 5], [0, 6]]));
    }
}
