//! Error types for object aggregation and matching.
//!
//! Every failure in this crate points at an inconsistency in the input objects
//! and is fatal to the unit being processed. Errors are never retried here; the
//! caller decides whether to abort one unit or the whole batch.

use thiserror::Error;

/// Convenient `Result` alias used throughout the crate.
pub type RecoResult<T> = Result<T, RecoError>;

/// Coarse classification of a [`RecoError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or inconsistent input objects.
    Validation,
    /// Access to data that does not exist (missing particles, unknown mode names).
    Lookup,
    /// Attempt to modify state that is fixed after construction.
    ImmutableState,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecoError {
    #[error("cannot build an interaction from an empty list of particles")]
    EmptyParticles,

    #[error("particle {particle_id} is {found} but interaction {interaction_id} expects {expected} particles")]
    KindMismatch {
        interaction_id: i64,
        particle_id: i64,
        expected: &'static str,
        found: &'static str,
    },

    #[error("particle {particle_id} has interaction id {found}, expected {expected}")]
    InteractionIdMismatch {
        particle_id: i64,
        expected: i64,
        found: i64,
    },

    #[error("encountered non-unique interaction ids {ids:?} when building interaction from its particles")]
    NonUniqueInteractionId { ids: Vec<i64> },

    #[error("particle id {particle_id} appears more than once in interaction {interaction_id}")]
    DuplicateParticleId { interaction_id: i64, particle_id: i64 },

    #[error("particle {particle_id} geometry is inconsistent: {index} indices, {points} points, {depositions} depositions")]
    InconsistentGeometry {
        particle_id: i64,
        index: usize,
        points: usize,
        depositions: usize,
    },

    #[error("interaction {interaction_id} geometry is inconsistent: {index} indices, {points} points, {depositions} depositions")]
    InconsistentInteractionGeometry {
        interaction_id: i64,
        index: usize,
        points: usize,
        depositions: usize,
    },

    #[error("matrix of shape {found:?} does not match collections of shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("min_overlap must be a finite value >= 0, got {0}")]
    InvalidThreshold(f64),

    #[error("interaction {interaction_id} was built without member particles")]
    MissingParticles { interaction_id: i64 },

    #[error("interaction {interaction_id} has no particle with id {particle_id}")]
    UnknownParticle { interaction_id: i64, particle_id: i64 },

    #[error("no {kind} interaction with id {interaction_id}")]
    UnknownInteraction { kind: &'static str, interaction_id: i64 },

    #[error("unknown matching mode '{0}', expected one of 'pred_to_true', 'true_to_pred', 'both'")]
    UnknownMatchingMode(String),

    #[error("unknown overlap mode '{0}', expected one of 'iou', 'chamfer'")]
    UnknownOverlapMode(String),

    #[error("interaction {interaction_id} already has a populated list of particles; it cannot be changed once set")]
    ParticlesAlreadySet { interaction_id: i64 },
}

impl RecoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoError::MissingParticles { .. }
            | RecoError::UnknownParticle { .. }
            | RecoError::UnknownInteraction { .. }
            | RecoError::UnknownMatchingMode(_)
            | RecoError::UnknownOverlapMode(_) => ErrorKind::Lookup,
            RecoError::ParticlesAlreadySet { .. } => ErrorKind::ImmutableState,
            _ => ErrorKind::Validation,
        }
    }
}
