use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::EvalConfig;
use crate::data::unit::{Unit, UnitInput};
use crate::error::{EvalError, EvalResult};
use crate::evaluation::matching::{match_interactions, match_particles, match_particles_hierarchical, MatchOutput};
use crate::evaluation::patch::ExternalMatchers;

/// Everything recorded for one unit.
#[derive(Clone, Debug, Serialize)]
pub struct UnitReport {
    pub entry: usize,
    #[serde(flatten)]
    pub interactions: MatchOutput,
    #[serde(flatten)]
    pub particles: MatchOutput,
    pub crt_patched: usize,
    pub flash_patched: usize,
}

/// Runs the external matchers, then interaction matching, then particle matching on one unit.
///
/// # Description
///
/// With `config.hierarchical`, particles are only matched within the interaction pairs
/// of the leading direction of the interaction matching. Otherwise all particles of the
/// unit are matched against each other.
pub fn evaluate_unit(unit: &mut Unit, config: &EvalConfig, matchers: &ExternalMatchers) -> EvalResult<UnitReport> {
    let (crt_patched, flash_patched) = matchers.run(unit)?;

    let interactions = match_interactions(unit, &config.interactions)?;
    let particles = if config.hierarchical {
        let pairs = interactions.primary_pairs().cloned().unwrap_or_default();
        match_particles_hierarchical(unit, &pairs, &config.particles)?
    } else {
        match_particles(unit, &config.particles)?
    };

    debug!("unit {} evaluated", unit.entry);
    Ok(UnitReport {
        entry: unit.entry,
        interactions,
        particles,
        crt_patched,
        flash_patched,
    })
}

/// Builds units from their inputs in parallel.
pub fn build_units(inputs: Vec<UnitInput>) -> Vec<EvalResult<Unit>> {
    inputs
        .into_par_iter()
        .map(|input| {
            let entry = input.entry;
            Unit::from_input(input).map_err(|e| EvalError::from(e).in_unit(entry))
        })
        .collect()
}

/// Evaluates independent units in parallel.
///
/// A failing unit does not affect the others; its error is returned in its slot.
pub fn process_units(
    units: &mut [Unit],
    config: &EvalConfig,
    matchers: &ExternalMatchers,
) -> Vec<EvalResult<UnitReport>> {
    let results: Vec<EvalResult<UnitReport>> = units
        .par_iter_mut()
        .map(|unit| {
            let entry = unit.entry;
            evaluate_unit(unit, config, matchers).map_err(|e| e.in_unit(entry))
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!("evaluated {} units, {} failed", results.len(), failed);
    results
}
