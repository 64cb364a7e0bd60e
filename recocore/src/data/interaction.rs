use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use itertools::Itertools;
use serde::Serialize;

use crate::algorithm::pairs::dedupe_and_clear;
use crate::data::match_list::{MatchList, RecoObject};
use crate::data::particle::{Particle, ParticleType, NUM_PARTICLE_TYPES};
use crate::error::{RecoError, RecoResult};

/// Vertex value used when no vertex has been reconstructed.
pub const UNKNOWN_VERTEX: [f32; 3] = [-1.0, -1.0, -1.0];

/// Explicit values that take precedence over what is inferred from member particles.
#[derive(Clone, Debug, Default)]
pub struct InteractionOverrides {
    pub interaction_id: Option<i64>,
    pub nu_id: Option<i64>,
    pub volume_id: Option<i64>,
    pub image_id: Option<i64>,
    pub vertex: Option<[f32; 3]>,
    pub is_neutrino: Option<bool>,
    pub is_contained: Option<bool>,
}

/// Interaction-level object: the union of the particles sharing one interaction id.
///
/// # Description
///
/// The member particle set is fixed once assigned. Counts and concatenated geometry are
/// derived from it at assignment time. An interaction may also be built from
/// pre-aggregated geometry alone, in which case no member particles are retained and
/// per-particle access fails with a lookup error.
///
/// Besides the match state, the only externally writable fields are the CRT-TPC
/// (`crthit_*`) and flash-matching (`flash_*`, `fmatched`) attributes.
#[derive(Clone, Debug, Serialize, Encode, Decode)]
pub struct Interaction {
    pub id: i64,
    pub nu_id: i64,
    pub volume_id: i64,
    pub image_id: i64,
    pub vertex: [f32; 3],
    pub is_neutrino: bool,
    pub is_contained: bool,
    pub is_truth: bool,

    #[serde(skip)]
    particles: Option<BTreeMap<i64, Particle>>,
    particle_ids: Vec<i64>,
    num_particles: usize,
    num_primaries: usize,
    particle_counts: [usize; NUM_PARTICLE_TYPES],
    primary_counts: [usize; NUM_PARTICLE_TYPES],

    #[serde(skip)]
    index: Vec<i64>,
    #[serde(skip)]
    points: Vec<[f32; 3]>,
    #[serde(skip)]
    depositions: Vec<f32>,

    matches: MatchList,
    is_principal_match: bool,

    // CRT-TPC matching
    pub crthit_matched: bool,
    pub crthit_matched_particle_id: i64,
    pub crthit_id: i64,

    // flash matching
    pub fmatched: bool,
    pub flash_id: i64,
    pub flash_time: f64,
    pub flash_total_pe: f64,
    pub flash_hypothesis: f64,
}

impl Interaction {
    /// Constructs an empty reconstructed `Interaction` without particles or geometry.
    pub fn new(id: i64) -> Self {
        Interaction {
            id,
            nu_id: -1,
            volume_id: -1,
            image_id: -1,
            vertex: UNKNOWN_VERTEX,
            is_neutrino: false,
            is_contained: false,
            is_truth: false,
            particles: None,
            particle_ids: Vec::new(),
            num_particles: 0,
            num_primaries: 0,
            particle_counts: [0; NUM_PARTICLE_TYPES],
            primary_counts: [0; NUM_PARTICLE_TYPES],
            index: Vec::new(),
            points: Vec::new(),
            depositions: Vec::new(),
            matches: MatchList::new(),
            is_principal_match: false,
            crthit_matched: false,
            crthit_matched_particle_id: -1,
            crthit_id: -1,
            fmatched: false,
            flash_id: -1,
            flash_time: f64::MIN,
            flash_total_pe: -1.0,
            flash_hypothesis: -1.0,
        }
    }

    /// Constructs an `Interaction` from pre-aggregated geometry, without member particles.
    ///
    /// # Arguments
    ///
    /// * `id` - Interaction id.
    /// * `index` - Voxel indices of the whole interaction.
    /// * `points` - Voxel coordinates, one per index.
    /// * `depositions` - Energy depositions, one per index.
    ///
    pub fn from_geometry(
        id: i64,
        index: Vec<i64>,
        points: Vec<[f32; 3]>,
        depositions: Vec<f32>,
    ) -> RecoResult<Self> {
        if points.len() != index.len() || depositions.len() != index.len() {
            return Err(RecoError::InconsistentInteractionGeometry {
                interaction_id: id,
                index: index.len(),
                points: points.len(),
                depositions: depositions.len(),
            });
        }
        let mut interaction = Interaction::new(id);
        interaction.index = index;
        interaction.points = points;
        interaction.depositions = depositions;
        Ok(interaction)
    }

    /// Builds an `Interaction` from its constituent particles.
    ///
    /// # Description
    ///
    /// Unless overridden, the interaction id must be the same for every particle. The
    /// parent (`nu_id`), volume and image ids are resolved by majority vote over the
    /// particles, ties going to the value seen first. The truth/reconstructed kind is
    /// taken from the first particle and every other particle must agree with it.
    ///
    /// # Arguments
    ///
    /// * `particles` - Non-empty list of member particles.
    /// * `overrides` - Values taking precedence over the inferred ones.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use recocore::data::particle::{Particle, ParticleType};
    /// # use recocore::data::interaction::{Interaction, InteractionOverrides};
    /// let particles = vec![
    ///     Particle::new(0, 7, vec![1], vec![[0.0; 3]], vec![1.0]).with_pid(ParticleType::Electron).with_primary(true),
    ///     Particle::new(1, 7, vec![2, 3], vec![[0.0; 3]; 2], vec![1.0; 2]).with_pid(ParticleType::Proton).with_primary(true),
    /// ];
    /// let ia = Interaction::from_particles(particles, InteractionOverrides::default()).unwrap();
    /// assert_eq!(ia.id, 7);
    /// assert_eq!(ia.num_particles(), 2);
    /// assert_eq!(ia.size(), 3);
    /// assert_eq!(ia.topology(), "1e1p");
    /// ```
    pub fn from_particles(
        particles: Vec<Particle>,
        overrides: InteractionOverrides,
    ) -> RecoResult<Self> {
        if particles.is_empty() {
            return Err(RecoError::EmptyParticles);
        }

        let id = match overrides.interaction_id {
            Some(id) => id,
            None => {
                let ids = ranked_unique(particles.iter().map(|p| p.interaction_id));
                if ids.len() > 1 {
                    return Err(RecoError::NonUniqueInteractionId { ids });
                }
                ids[0]
            }
        };

        let mut interaction = Interaction::new(id);
        interaction.is_truth = particles[0].is_truth;
        interaction.nu_id = overrides
            .nu_id
            .unwrap_or_else(|| majority_vote(particles.iter().map(|p| p.nu_id)));
        interaction.volume_id = overrides
            .volume_id
            .unwrap_or_else(|| majority_vote(particles.iter().map(|p| p.volume_id)));
        interaction.image_id = overrides
            .image_id
            .unwrap_or_else(|| majority_vote(particles.iter().map(|p| p.image_id)));
        if let Some(vertex) = overrides.vertex {
            interaction.vertex = vertex;
        }
        interaction.is_neutrino = overrides.is_neutrino.unwrap_or(false);
        interaction.is_contained = overrides.is_contained.unwrap_or(false);

        interaction.set_particles(particles)?;
        Ok(interaction)
    }

    /// Marks the interaction as a truth-level object.
    pub fn truth(mut self) -> Self {
        self.is_truth = true;
        self
    }

    /// Assigns the member particles and derives counts and concatenated geometry.
    ///
    /// Fails with [`RecoError::ParticlesAlreadySet`] if particles were assigned before.
    /// Nothing is modified when any particle fails validation.
    pub fn set_particles(&mut self, particles: Vec<Particle>) -> RecoResult<()> {
        if self.particles.is_some() {
            return Err(RecoError::ParticlesAlreadySet { interaction_id: self.id });
        }

        let mut members: BTreeMap<i64, Particle> = BTreeMap::new();
        let mut particle_counts = [0usize; NUM_PARTICLE_TYPES];
        let mut primary_counts = [0usize; NUM_PARTICLE_TYPES];
        let total_size: usize = particles.iter().map(|p| p.size()).sum();
        let mut index = Vec::with_capacity(total_size);
        let mut points = Vec::with_capacity(total_size);
        let mut depositions = Vec::with_capacity(total_size);

        for p in particles {
            self.check_particle_input(&p)?;
            if members.contains_key(&p.id) {
                return Err(RecoError::DuplicateParticleId {
                    interaction_id: self.id,
                    particle_id: p.id,
                });
            }
            let slot = p.pid.slot();
            particle_counts[slot] += 1;
            primary_counts[slot] += p.is_primary as usize;
            index.extend_from_slice(&p.index);
            points.extend_from_slice(&p.points);
            depositions.extend_from_slice(&p.depositions);
            members.insert(p.id, p);
        }

        self.particle_ids = members.keys().copied().collect();
        self.num_particles = members.len();
        self.num_primaries = primary_counts.iter().sum();
        self.particle_counts = particle_counts;
        self.primary_counts = primary_counts;
        self.index = index;
        self.points = points;
        self.depositions = depositions;
        self.particles = Some(members);
        Ok(())
    }

    /// Consistency check between a prospective member and this interaction.
    fn check_particle_input(&self, p: &Particle) -> RecoResult<()> {
        if p.is_truth != self.is_truth {
            return Err(RecoError::KindMismatch {
                interaction_id: self.id,
                particle_id: p.id,
                expected: if self.is_truth { "truth" } else { "reconstructed" },
                found: p.kind_name(),
            });
        }
        if p.interaction_id != self.id {
            return Err(RecoError::InteractionIdMismatch {
                particle_id: p.id,
                expected: self.id,
                found: p.interaction_id,
            });
        }
        p.validate()
    }

    pub fn has_particles(&self) -> bool {
        self.particles.is_some()
    }

    /// Member particles in ascending id order; empty when particles were never set.
    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.particles.iter().flat_map(|m| m.values())
    }

    /// Mutable access to members, for writing match state only.
    pub(crate) fn particles_mut(&mut self) -> impl Iterator<Item = &mut Particle> + '_ {
        self.particles.iter_mut().flat_map(|m| m.values_mut())
    }

    /// Looks up a member particle by id.
    pub fn particle(&self, particle_id: i64) -> RecoResult<&Particle> {
        let members = self
            .particles
            .as_ref()
            .ok_or(RecoError::MissingParticles { interaction_id: self.id })?;
        members.get(&particle_id).ok_or(RecoError::UnknownParticle {
            interaction_id: self.id,
            particle_id,
        })
    }

    pub fn particle_ids(&self) -> &[i64] {
        &self.particle_ids
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn num_primaries(&self) -> usize {
        self.num_primaries
    }

    /// Number of member particles per type, in [`ParticleType::slot`] order.
    pub fn particle_counts(&self) -> &[usize; NUM_PARTICLE_TYPES] {
        &self.particle_counts
    }

    /// Number of primary member particles per type, in [`ParticleType::slot`] order.
    pub fn primary_counts(&self) -> &[usize; NUM_PARTICLE_TYPES] {
        &self.primary_counts
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn match_ids(&self) -> Vec<i64> {
        self.matches.ids()
    }

    pub fn match_counts(&self) -> Vec<f64> {
        self.matches.scores()
    }

    /// Whether any match candidate was recorded.
    pub fn is_matched(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Dedupes the match candidates accumulated on all member particles.
    ///
    /// See [`dedupe_and_clear`]; with `clear` the members' match state is wiped.
    pub fn member_matches(&mut self, clear: bool) -> (Vec<i64>, Vec<f64>) {
        dedupe_and_clear(self.particles_mut(), clear)
    }

    /// Compact topology string built from primary counts, e.g. `1mu2p`.
    pub fn topology(&self) -> String {
        ParticleType::all()
            .iter()
            .zip(self.primary_counts.iter())
            .filter(|(_, &n)| n > 0)
            .map(|(t, n)| format!("{}{}", n, t.symbol()))
            .collect()
    }

    /// One line per member particle, primaries first, then ascending id.
    pub fn particles_summary(&self) -> String {
        self.particles()
            .sorted_by_key(|p| (!p.is_primary, p.id))
            .map(|p| {
                let marker = if p.is_primary { '*' } else { '-' };
                format!("    {} {}\n", marker, p)
            })
            .collect()
    }
}

impl RecoObject for Interaction {
    fn id(&self) -> i64 {
        self.id
    }

    fn is_truth(&self) -> bool {
        self.is_truth
    }

    fn index(&self) -> &[i64] {
        &self.index
    }

    fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    fn depositions(&self) -> &[f32] {
        &self.depositions
    }

    fn match_list(&self) -> &MatchList {
        &self.matches
    }

    fn match_list_mut(&mut self) -> &mut MatchList {
        &mut self.matches
    }

    fn is_principal_match(&self) -> bool {
        self.is_principal_match
    }

    fn set_principal_match(&mut self, value: bool) {
        self.is_principal_match = value;
    }
}

impl Display for Interaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Interaction {}, Vertex: x={:.2}, y={:.2}, z={:.2}",
            self.id, self.vertex[0], self.vertex[1], self.vertex[2]
        )?;
        writeln!(f, "{}", "-".repeat(68))?;
        write!(f, "{}", self.particles_summary())
    }
}

/// Distinct values ordered by frequency, ties in first-seen order.
fn ranked_unique(values: impl Iterator<Item = i64>) -> Vec<i64> {
    let values: Vec<i64> = values.collect();
    let mut counted: Vec<(i64, usize)> = values
        .iter()
        .copied()
        .unique()
        .map(|v| (v, values.iter().filter(|&&x| x == v).count()))
        .collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1));
    counted.into_iter().map(|(v, _)| v).collect()
}

/// Most frequent value; ties go to the value encountered first.
fn majority_vote(values: impl Iterator<Item = i64>) -> i64 {
    ranked_unique(values).first().copied().unwrap_or(-1)
}
