//! Write-back of externally computed matches onto predicted interactions.
//!
//! CRT-TPC and flash matching are done by outside collaborators. Their results come
//! back as small patch values which are applied to the interactions located by id.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{trace, warn};
use recocore::data::interaction::Interaction;
use serde::{Deserialize, Serialize};

use crate::data::unit::Unit;
use crate::error::EvalResult;

/// A change to the fields of one interaction.
pub trait InteractionPatch {
    fn interaction_id(&self) -> i64;
    fn apply(&self, interaction: &mut Interaction);
}

/// Result of matching a cosmic-ray tagger hit to a TPC interaction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrtTpcPatch {
    pub interaction_id: i64,
    pub crthit_id: i64,
    pub matched_particle_id: i64,
}

impl InteractionPatch for CrtTpcPatch {
    fn interaction_id(&self) -> i64 {
        self.interaction_id
    }

    fn apply(&self, interaction: &mut Interaction) {
        interaction.crthit_matched = true;
        interaction.crthit_matched_particle_id = self.matched_particle_id;
        interaction.crthit_id = self.crthit_id;
    }
}

/// Result of matching an optical flash to a TPC interaction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlashPatch {
    pub interaction_id: i64,
    pub flash_id: i64,
    pub flash_time: f64,
    pub total_pe: f64,
    pub hypothesis: f64,
}

impl InteractionPatch for FlashPatch {
    fn interaction_id(&self) -> i64 {
        self.interaction_id
    }

    fn apply(&self, interaction: &mut Interaction) {
        interaction.fmatched = true;
        interaction.flash_id = self.flash_id;
        interaction.flash_time = self.flash_time;
        interaction.flash_total_pe = self.total_pe;
        interaction.flash_hypothesis = self.hypothesis;
    }
}

/// Produces CRT-TPC matches for the predicted interactions of one unit.
pub trait CrtTpcMatcher {
    fn match_crt_tpc(&self, entry: usize, interactions: &[Interaction]) -> EvalResult<Vec<CrtTpcPatch>>;
}

/// Produces flash matches for the predicted interactions of one unit.
pub trait FlashMatcher {
    fn match_flashes(&self, entry: usize, interactions: &[Interaction]) -> EvalResult<Vec<FlashPatch>>;
}

/// Applies patches to the interactions they name.
///
/// Patches naming an unknown interaction are skipped with a warning.
///
/// # Returns
///
/// The number of patches applied.
pub fn apply_patches<P: InteractionPatch>(interactions: &mut [Interaction], patches: &[P]) -> usize {
    let mut applied = 0;
    for patch in patches {
        let id = patch.interaction_id();
        match interactions.iter_mut().find(|ia| ia.id == id) {
            Some(interaction) => {
                patch.apply(interaction);
                trace!("patched interaction {}", id);
                applied += 1;
            }
            None => warn!("patch for unknown interaction {} skipped", id),
        }
    }
    applied
}

pub fn apply_crt_patches(interactions: &mut [Interaction], patches: &[CrtTpcPatch]) -> usize {
    apply_patches(interactions, patches)
}

pub fn apply_flash_patches(interactions: &mut [Interaction], patches: &[FlashPatch]) -> usize {
    apply_patches(interactions, patches)
}

/// The external matchers consulted for every unit; either may be absent.
#[derive(Clone, Copy, Default)]
pub struct ExternalMatchers<'a> {
    pub crt: Option<&'a (dyn CrtTpcMatcher + Sync)>,
    pub flash: Option<&'a (dyn FlashMatcher + Sync)>,
}

impl ExternalMatchers<'_> {
    /// Runs the configured matchers on the unit's predicted interactions.
    ///
    /// # Returns
    ///
    /// `(crt, flash)` counts of applied patches.
    pub fn run(&self, unit: &mut Unit) -> EvalResult<(usize, usize)> {
        let crt = match self.crt {
            Some(matcher) => {
                let patches = matcher.match_crt_tpc(unit.entry, &unit.interactions)?;
                apply_crt_patches(&mut unit.interactions, &patches)
            }
            None => 0,
        };
        let flash = match self.flash {
            Some(matcher) => {
                let patches = matcher.match_flashes(unit.entry, &unit.interactions)?;
                apply_flash_patches(&mut unit.interactions, &patches)
            }
            None => 0,
        };
        Ok((crt, flash))
    }
}

/// Precomputed patches per unit entry, as read from a JSON file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchTable {
    #[serde(default)]
    pub crt: BTreeMap<usize, Vec<CrtTpcPatch>>,
    #[serde(default)]
    pub flash: BTreeMap<usize, Vec<FlashPatch>>,
}

impl PatchTable {
    pub fn load<P: AsRef<Path>>(path: P) -> EvalResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl CrtTpcMatcher for PatchTable {
    fn match_crt_tpc(&self, entry: usize, _interactions: &[Interaction]) -> EvalResult<Vec<CrtTpcPatch>> {
        Ok(self.crt.get(&entry).cloned().unwrap_or_default())
    }
}

impl FlashMatcher for PatchTable {
    fn match_flashes(&self, entry: usize, _interactions: &[Interaction]) -> EvalResult<Vec<FlashPatch>> {
        Ok(self.flash.get(&entry).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interactions() -> Vec<Interaction> {
        vec![Interaction::new(3), Interaction::new(4)]
    }

    #[test]
    fn test_crt_patch_writes_three_fields() {
        let mut interactions = interactions();
        let applied = apply_crt_patches(
            &mut interactions,
            &[CrtTpcPatch { interaction_id: 4, crthit_id: 17, matched_particle_id: 2 }],
        );
        assert_eq!(applied, 1);
        assert!(!interactions[0].crthit_matched);
        assert!(interactions[1].crthit_matched);
        assert_eq!(interactions[1].crthit_id, 17);
        assert_eq!(interactions[1].crthit_matched_particle_id, 2);
    }

    #[test]
    fn test_unknown_interaction_is_skipped() {
        let mut interactions = interactions();
        let patches = [
            FlashPatch { interaction_id: 9, flash_id: 0, flash_time: 1.5, total_pe: 100.0, hypothesis: 90.0 },
            FlashPatch { interaction_id: 3, flash_id: 2, flash_time: 0.25, total_pe: 50.0, hypothesis: 48.0 },
        ];
        assert_eq!(apply_flash_patches(&mut interactions, &patches), 1);
        assert!(interactions[0].fmatched);
        assert_eq!(interactions[0].flash_id, 2);
        assert!((interactions[0].flash_time - 0.25).abs() < 1e-12);
        assert!(!interactions[1].fmatched);
    }

    #[test]
    fn test_patch_table_as_matcher() {
        let table: PatchTable = serde_json::from_str(
            r#"{"crt": {"5": [{"interaction_id": 3, "crthit_id": 1, "matched_particle_id": 0}]}}"#,
        )
        .unwrap();
        let mut unit = Unit::new(5, interactions(), vec![]);
        let matchers = ExternalMatchers { crt: Some(&table), flash: Some(&table) };
        assert_eq!(matchers.run(&mut unit).unwrap(), (1, 0));
        assert!(unit.interactions[0].crthit_matched);

        let mut other = Unit::new(6, interactions(), vec![]);
        assert_eq!(matchers.run(&mut other).unwrap(), (0, 0));
    }
}
