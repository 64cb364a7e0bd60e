use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::match_list::{MatchList, RecoObject};
use crate::error::{RecoError, RecoResult};

/// Number of per-type counting slots: one per known type plus one for unknown.
pub const NUM_PARTICLE_TYPES: usize = 6;

/// Semantic particle type label.
///
/// # Description
///
/// Labels follow the numeric convention of the upstream semantic segmentation:
/// `0` photon, `1` electron, `2` muon, `3` pion, `4` proton. Anything else,
/// negative values included, is `Unknown` and counted in the last slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(from = "i64", into = "i64")]
pub enum ParticleType {
    Photon,
    Electron,
    Muon,
    Pion,
    Proton,
    Unknown,
}

impl ParticleType {
    /// Returns the `ParticleType` corresponding to the given integer label.
    ///
    /// # Arguments
    ///
    /// * `pid` - An integer label as produced by the semantic segmentation.
    ///
    pub fn new(pid: i64) -> ParticleType {
        match pid {
            0 => ParticleType::Photon,
            1 => ParticleType::Electron,
            2 => ParticleType::Muon,
            3 => ParticleType::Pion,
            4 => ParticleType::Proton,
            _ => ParticleType::Unknown,
        }
    }

    /// Returns the integer label corresponding to the `ParticleType`.
    pub fn pid_numeric(&self) -> i64 {
        match self {
            ParticleType::Photon => 0,
            ParticleType::Electron => 1,
            ParticleType::Muon => 2,
            ParticleType::Pion => 3,
            ParticleType::Proton => 4,
            ParticleType::Unknown => -1,
        }
    }

    /// Position of this type in a per-type count vector.
    pub fn slot(&self) -> usize {
        match self {
            ParticleType::Unknown => NUM_PARTICLE_TYPES - 1,
            other => other.pid_numeric() as usize,
        }
    }

    /// Short symbol used in topology strings.
    pub fn symbol(&self) -> &'static str {
        match self {
            ParticleType::Photon => "g",
            ParticleType::Electron => "e",
            ParticleType::Muon => "mu",
            ParticleType::Pion => "pi",
            ParticleType::Proton => "p",
            ParticleType::Unknown => "?",
        }
    }

    /// All types in slot order.
    pub fn all() -> [ParticleType; NUM_PARTICLE_TYPES] {
        [
            ParticleType::Photon,
            ParticleType::Electron,
            ParticleType::Muon,
            ParticleType::Pion,
            ParticleType::Proton,
            ParticleType::Unknown,
        ]
    }
}

impl Default for ParticleType {
    fn default() -> Self {
        ParticleType::Unknown
    }
}

impl From<i64> for ParticleType {
    fn from(pid: i64) -> Self {
        ParticleType::new(pid)
    }
}

impl From<ParticleType> for i64 {
    fn from(pid: ParticleType) -> Self {
        pid.pid_numeric()
    }
}

impl Display for ParticleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParticleType::Photon => write!(f, "Photon"),
            ParticleType::Electron => write!(f, "Electron"),
            ParticleType::Muon => write!(f, "Muon"),
            ParticleType::Pion => write!(f, "Pion"),
            ParticleType::Proton => write!(f, "Proton"),
            ParticleType::Unknown => write!(f, "Unknown"),
        }
    }
}

fn default_id() -> i64 {
    -1
}

/// A single reconstructed or true particle: a labeled cloud of voxels.
///
/// Particles are produced upstream and arrive finalized. Apart from the match state
/// (ranked match list and principal-match flag) they are treated as read-only.
#[derive(Clone, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct Particle {
    pub id: i64,
    pub interaction_id: i64,
    #[serde(default = "default_id")]
    pub nu_id: i64,
    #[serde(default = "default_id")]
    pub volume_id: i64,
    #[serde(default = "default_id")]
    pub image_id: i64,
    #[serde(default)]
    pub pid: ParticleType,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_truth: bool,
    pub index: Vec<i64>,
    pub points: Vec<[f32; 3]>,
    pub depositions: Vec<f32>,
    #[serde(default)]
    matches: MatchList,
    #[serde(default)]
    is_principal_match: bool,
}

impl Particle {
    /// Constructs a new reconstructed `Particle` with unknown type, not primary.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique particle id within its image.
    /// * `interaction_id` - Id of the interaction the particle belongs to.
    /// * `index` - Voxel indices into the image tensor.
    /// * `points` - Voxel coordinates, one per index.
    /// * `depositions` - Energy depositions, one per index.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use recocore::data::particle::{Particle, ParticleType};
    /// let p = Particle::new(0, 3, vec![1, 2], vec![[0.0; 3], [1.0, 0.0, 0.0]], vec![0.5, 0.5])
    ///     .with_pid(ParticleType::Muon)
    ///     .with_primary(true);
    /// assert_eq!(p.size(), 2);
    /// assert_eq!(p.pid, ParticleType::Muon);
    /// ```
    pub fn new(
        id: i64,
        interaction_id: i64,
        index: Vec<i64>,
        points: Vec<[f32; 3]>,
        depositions: Vec<f32>,
    ) -> Self {
        Particle {
            id,
            interaction_id,
            nu_id: -1,
            volume_id: -1,
            image_id: -1,
            pid: ParticleType::Unknown,
            is_primary: false,
            is_truth: false,
            index,
            points,
            depositions,
            matches: MatchList::new(),
            is_principal_match: false,
        }
    }

    pub fn with_pid(mut self, pid: ParticleType) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    /// Marks the particle as a truth-level object.
    pub fn truth(mut self) -> Self {
        self.is_truth = true;
        self
    }

    pub fn with_nu_id(mut self, nu_id: i64) -> Self {
        self.nu_id = nu_id;
        self
    }

    pub fn with_volume_id(mut self, volume_id: i64) -> Self {
        self.volume_id = volume_id;
        self
    }

    pub fn with_image_id(mut self, image_id: i64) -> Self {
        self.image_id = image_id;
        self
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Checks that index, points and depositions describe the same voxels.
    pub fn validate(&self) -> RecoResult<()> {
        let n = self.index.len();
        if self.points.len() != n || self.depositions.len() != n {
            return Err(RecoError::InconsistentGeometry {
                particle_id: self.id,
                index: n,
                points: self.points.len(),
                depositions: self.depositions.len(),
            });
        }
        Ok(())
    }

    /// Ids of matched objects, best first.
    pub fn match_ids(&self) -> Vec<i64> {
        self.matches.ids()
    }

    /// Scores of matched objects, aligned with [`Particle::match_ids`].
    pub fn match_counts(&self) -> Vec<f64> {
        self.matches.scores()
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        if self.is_truth { "truth" } else { "reconstructed" }
    }
}

impl RecoObject for Particle {
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

impl Display for Particle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Particle {}: PID = {}, Size = {}, Match = {:?}",
            self.id,
            self.pid.pid_numeric(),
            self.size(),
            self.matches.ids()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_type_round_trip_labels() {
        for t in ParticleType::all() {
            assert_eq!(ParticleType::new(t.pid_numeric()), t);
        }
        assert_eq!(ParticleType::new(17), ParticleType::Unknown);
        assert_eq!(ParticleType::new(-1).slot(), 5);
        assert_eq!(ParticleType::Proton.slot(), 4);
    }

    #[test]
    fn test_validate_geometry() {
        let good = Particle::new(1, 0, vec![1, 2], vec![[0.0; 3]; 2], vec![1.0, 1.0]);
        assert!(good.validate().is_ok());

        let bad = Particle::new(2, 0, vec![1, 2], vec![[0.0; 3]; 1], vec![1.0, 1.0]);
        match bad.validate() {
            Err(RecoError::InconsistentGeometry { particle_id, points, .. }) => {
                assert_eq!(particle_id, 2);
                assert_eq!(points, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_pid_deserializes_from_integer() {
        let json = r#"{"id": 4, "interaction_id": 1, "pid": 2, "index": [3], "points": [[0.0, 1.0, 2.0]], "depositions": [0.5]}"#;
        let p: Particle = serde_json::from_str(json).unwrap();
        assert_eq!(p.pid, ParticleType::Muon);
        assert_eq!(p.nu_id, -1);
        assert!(!p.is_truth);
        assert!(p.match_list().is_empty());
    }
}
