pub mod error;
pub mod types;
pub mod multivariate;
pub mod univariate;
pub mod ops;
pub mod initialization;
pub mod state_space;
pub mod time_invariant;
pub mod m2u;
pub mod adapter;
pub mod rich;
pub mod data;
pub mod batch;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod testing;

pub use adapter::{M2uData, M2uSsfAdapter};
pub use data::{MSsfData, MultivariateSsfData, SsfData};
pub use error::{Result, SsfError};
pub use initialization::InitialConditions;
pub use m2u::{FullM2uMap, M2uEntry, M2uMap, MuMap};
pub use multivariate::MultivariateSsf;
pub use ops::MultivariateSsfOps;
pub use rich::{
    AugmentedSsf, ConstantNoise, NoiseProvider, RichMultivariateSsf, StateIntercept,
    StaticRegression, TimeVaryingNoise, TimeVaryingRegression,
};
pub use state_space::{DefaultMultivariateSsf, SsfLoader};
pub use time_invariant::{FrozenMatrices, TimeInvariantMultivariateSsf};
pub use types::{Load, SsfDims, StepPhase};
pub use univariate::Ssf;
