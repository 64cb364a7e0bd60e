// error taxonomy
pub mod error;

// data module
pub mod data {
    pub mod particle;
    pub mod interaction;
    pub mod match_list;
}

// algorithm module
pub mod algorithm {
    pub mod overlap;
    pub mod matching;
    pub mod hierarchical;
    pub mod pairs;
}

pub use error::{ErrorKind, RecoError, RecoResult};
pub use data::particle::{Particle, ParticleType};
pub use data::interaction::{Interaction, InteractionOverrides};
pub use data::match_list::{MatchList, RecoObject};
