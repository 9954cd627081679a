//! Volatility modelling: GARCH estimation, forecasts, artifacts, and the per-ticker model.

pub mod artifact;
pub mod forecast;
pub mod garch;
pub mod volatility;

pub use artifact::{ArtifactMeta, ModelArtifact, ModelStore};
pub use forecast::Forecast;
pub use garch::{FittedGarch, GarchOrder, GarchParams};
pub use volatility::{horizon_from_signed, ModelStage, VolatilityModel};

use crate::data::DataError;
use thiserror::Error;

/// Errors from model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no fitted model found for '{ticker}'")]
    ModelNotFound { ticker: String },

    #[error("model version {version} not found for '{ticker}'")]
    VersionNotFound { ticker: String, version: u64 },

    #[error("no return series: wrangle must run before fit")]
    NotWrangled,

    #[error("model is not fitted: fit or load must run before {0}")]
    NotFitted(&'static str),

    #[error("cannot {op} a model in stage {from}")]
    InvalidTransition { from: ModelStage, op: &'static str },

    #[error("invalid GARCH order: {0}")]
    InvalidOrder(String),

    #[error("invalid forecast horizon {0}: must be at least 1")]
    InvalidHorizon(i64),

    #[error("forecast horizon {0} is too large to allocate")]
    HorizonTooLarge(usize),

    #[error("insufficient data: need at least {needed} observations, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("return series has no variation")]
    DegenerateSeries,

    #[error("estimation did not converge: {0}")]
    Convergence(String),

    #[error("artifact error: {0}")]
    Artifact(String),
}

impl ModelError {
    /// True when the requested thing (price rows, model file, version) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ModelError::Data(DataError::NoStoredData { .. })
                | ModelError::ModelNotFound { .. }
                | ModelError::VersionNotFound { .. }
        )
    }
}
