// src/lib.rs
pub mod error;
pub mod config;

pub mod data {
    pub mod unit;
    pub mod io;
}

pub mod evaluation {
    pub mod matching;
    pub mod patch;
    pub mod batch;
}

pub use config::{EvalConfig, MatchConfig};
pub use error::{EvalError, EvalResult};
