use recocore::error::{ErrorKind, RecoError};
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while loading, evaluating or persisting units.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Reco(#[from] RecoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("unsupported file version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("unit {entry}: {source}")]
    Unit {
        entry: usize,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    /// The engine-level category, if the error originates from the matching engine.
    pub fn reco_kind(&self) -> Option<ErrorKind> {
        match self {
            EvalError::Reco(e) => Some(e.kind()),
            EvalError::Unit { source, .. } => source.reco_kind(),
            _ => None,
        }
    }

    pub fn in_unit(self, entry: usize) -> Self {
        EvalError::Unit { entry, source: Box::new(self) }
    }
}
