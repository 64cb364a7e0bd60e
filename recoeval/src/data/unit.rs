use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use log::{debug, warn};
use recocore::data::interaction::{Interaction, InteractionOverrides};
use recocore::data::particle::Particle;
use recocore::error::RecoResult;
use serde::{Deserialize, Serialize};

/// Interaction-level values supplied alongside the particles, keyed by interaction id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMeta {
    pub id: i64,
    #[serde(default)]
    pub nu_id: Option<i64>,
    #[serde(default)]
    pub volume_id: Option<i64>,
    #[serde(default)]
    pub image_id: Option<i64>,
    #[serde(default)]
    pub vertex: Option<[f32; 3]>,
    #[serde(default)]
    pub is_neutrino: Option<bool>,
    #[serde(default)]
    pub is_contained: Option<bool>,
}

impl From<&InteractionMeta> for InteractionOverrides {
    fn from(meta: &InteractionMeta) -> Self {
        InteractionOverrides {
            interaction_id: None,
            nu_id: meta.nu_id,
            volume_id: meta.volume_id,
            image_id: meta.image_id,
            vertex: meta.vertex,
            is_neutrino: meta.is_neutrino,
            is_contained: meta.is_contained,
        }
    }
}

/// One event as read from disk: flat particle lists for both sides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UnitInput {
    pub entry: usize,
    #[serde(default)]
    pub particles: Vec<Particle>,
    #[serde(default)]
    pub truth_particles: Vec<Particle>,
    #[serde(default)]
    pub interactions: Vec<InteractionMeta>,
    #[serde(default)]
    pub truth_interactions: Vec<InteractionMeta>,
}

/// One event with its particles grouped into interactions.
///
/// Each unit owns its object graph; nothing is shared between units.
#[derive(Clone, Debug, Encode, Decode)]
pub struct Unit {
    pub entry: usize,
    pub interactions: Vec<Interaction>,
    pub truth_interactions: Vec<Interaction>,
}

impl Unit {
    pub fn new(entry: usize, interactions: Vec<Interaction>, truth_interactions: Vec<Interaction>) -> Self {
        Unit { entry, interactions, truth_interactions }
    }

    /// Groups both particle lists by interaction id and builds the interactions.
    ///
    /// # Description
    ///
    /// Particles of `truth_particles` are marked as truth and particles of `particles`
    /// as predicted, whatever their input flag says. Interactions are built in
    /// ascending id order. Metadata entries naming an interaction without particles
    /// are ignored with a warning.
    pub fn from_input(input: UnitInput) -> RecoResult<Self> {
        let interactions = group_interactions(input.particles, &input.interactions, false)?;
        let truth_interactions = group_interactions(input.truth_particles, &input.truth_interactions, true)?;
        debug!(
            "unit {}: {} predicted and {} truth interactions",
            input.entry,
            interactions.len(),
            truth_interactions.len()
        );
        Ok(Unit::new(input.entry, interactions, truth_interactions))
    }

    pub fn interaction(&self, id: i64) -> Option<&Interaction> {
        self.interactions.iter().find(|ia| ia.id == id)
    }

    pub fn truth_interaction(&self, id: i64) -> Option<&Interaction> {
        self.truth_interactions.iter().find(|ia| ia.id == id)
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.interactions.iter().flat_map(|ia| ia.particles())
    }

    pub fn truth_particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.truth_interactions.iter().flat_map(|ia| ia.particles())
    }
}

fn group_interactions(
    particles: Vec<Particle>,
    meta: &[InteractionMeta],
    truth: bool,
) -> RecoResult<Vec<Interaction>> {
    let mut groups: BTreeMap<i64, Vec<Particle>> = BTreeMap::new();
    for mut particle in particles {
        particle.is_truth = truth;
        groups.entry(particle.interaction_id).or_default().push(particle);
    }

    let overrides: BTreeMap<i64, InteractionOverrides> = meta.iter().map(|m| (m.id, m.into())).collect();
    for id in overrides.keys().filter(|id| !groups.contains_key(*id)) {
        warn!("metadata for interaction {} ignored, it has no particles", id);
    }

    groups
        .into_iter()
        .map(|(id, members)| {
            let overrides = overrides.get(&id).cloned().unwrap_or_default();
            Interaction::from_particles(members, overrides)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recocore::data::particle::ParticleType;
    use recocore::error::RecoError;

    fn particle(id: i64, interaction_id: i64, index: Vec<i64>) -> Particle {
        let n = index.len();
        Particle::new(id, interaction_id, index, vec![[0.0; 3]; n], vec![1.0; n])
    }

    #[test]
    fn test_grouping_by_interaction_id() {
        let input = UnitInput {
            entry: 7,
            particles: vec![
                particle(0, 3, vec![0, 1]),
                particle(1, 1, vec![2]),
                particle(2, 3, vec![4]).with_pid(ParticleType::Proton).with_primary(true),
            ],
            truth_particles: vec![particle(5, 0, vec![0, 1, 2])],
            ..Default::default()
        };
        let unit = Unit::from_input(input).unwrap();

        assert_eq!(unit.entry, 7);
        let ids: Vec<i64> = unit.interactions.iter().map(|ia| ia.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(unit.interaction(3).unwrap().size(), 3);
        assert_eq!(unit.interaction(3).unwrap().num_primaries(), 1);
        assert_eq!(unit.particles().count(), 3);

        let truth = unit.truth_interaction(0).unwrap();
        assert!(truth.is_truth);
        assert!(truth.particles().all(|p| p.is_truth));
        assert!(unit.truth_interaction(3).is_none());
    }

    #[test]
    fn test_metadata_overrides() {
        let input = UnitInput {
            entry: 0,
            particles: vec![particle(0, 2, vec![0])],
            interactions: vec![
                InteractionMeta { id: 2, is_neutrino: Some(true), vertex: Some([1.0, 2.0, 3.0]), ..Default::default() },
                InteractionMeta { id: 9, is_contained: Some(true), ..Default::default() },
            ],
            ..Default::default()
        };
        let unit = Unit::from_input(input).unwrap();
        assert_eq!(unit.interactions.len(), 1);
        assert!(unit.interactions[0].is_neutrino);
        assert_eq!(unit.interactions[0].vertex, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_particle_ids_fail() {
        let input = UnitInput {
            entry: 0,
            particles: vec![particle(4, 0, vec![0]), particle(4, 0, vec![1])],
            ..Default::default()
        };
        let err = Unit::from_input(input).unwrap_err();
        assert_eq!(err, RecoError::DuplicateParticleId { interaction_id: 0, particle_id: 4 });
    }

    #[test]
    fn test_input_from_json() {
        let input: UnitInput = serde_json::from_str(
            r#"{
                "entry": 1,
                "particles": [
                    {"id": 0, "interaction_id": 0, "pid": 2, "is_primary": true,
                     "index": [0, 1], "points": [[0, 0, 0], [1, 0, 0]], "depositions": [1.0, 2.0]}
                ]
            }"#,
        )
        .unwrap();
        assert!(input.truth_particles.is_empty());
        let unit = Unit::from_input(input).unwrap();
        assert_eq!(unit.interactions[0].topology(), "1mu");
    }
}
