//! Per-ticker volatility model.
//!
//! Stages: `Empty -> Wrangled -> Fitted -> Dumped` on the fit path and
//! `Empty -> Loaded` on the predict path. There is no way back; build a new
//! instance per request.

use super::artifact::{ArtifactMeta, ModelStore};
use super::forecast::Forecast;
use super::garch::{FittedGarch, GarchOrder};
use super::ModelError;
use crate::data::{absolute_returns, DataError, PriceRepository, ReturnSeries};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStage {
    Empty,
    Wrangled,
    Fitted,
    Dumped,
    Loaded,
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelStage::Empty => "empty",
            ModelStage::Wrangled => "wrangled",
            ModelStage::Fitted => "fitted",
            ModelStage::Dumped => "dumped",
            ModelStage::Loaded => "loaded",
        };
        f.write_str(name)
    }
}

/// Convert a caller-supplied day count into a forecast horizon.
pub fn horizon_from_signed(n_days: i64) -> Result<usize, ModelError> {
    match usize::try_from(n_days) {
        Ok(h) if h >= 1 => Ok(h),
        _ => Err(ModelError::InvalidHorizon(n_days)),
    }
}

pub struct VolatilityModel {
    ticker: String,
    use_new_data: bool,
    repo: PriceRepository,
    models: Arc<ModelStore>,
    stage: ModelStage,
    series: Option<ReturnSeries>,
    fitted: Option<FittedGarch>,
    meta: Option<ArtifactMeta>,
}

impl VolatilityModel {
    pub fn new(
        ticker: impl Into<String>,
        repo: PriceRepository,
        models: Arc<ModelStore>,
        use_new_data: bool,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            use_new_data,
            repo,
            models,
            stage: ModelStage::Empty,
            series: None,
            fitted: None,
            meta: None,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn stage(&self) -> ModelStage {
        self.stage
    }

    pub fn series(&self) -> Option<&ReturnSeries> {
        self.series.as_ref()
    }

    pub fn fitted(&self) -> Option<&FittedGarch> {
        self.fitted.as_ref()
    }

    /// Metadata of the artifact written by `dump` or read by `load`.
    pub fn meta(&self) -> Option<&ArtifactMeta> {
        self.meta.as_ref()
    }

    fn expect_stage(&self, expected: ModelStage, op: &'static str) -> Result<(), ModelError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ModelError::InvalidTransition {
                from: self.stage,
                op,
            })
        }
    }

    /// Obtain price rows and derive the trailing absolute-return series.
    ///
    /// With fresh data enabled the stored table is deleted before the remote
    /// fetch; a failed fetch leaves the ticker without stored rows.
    pub fn wrangle(&mut self, n_observations: i64) -> Result<&ReturnSeries, ModelError> {
        self.expect_stage(ModelStage::Empty, "wrangle")?;

        let rows = if self.use_new_data {
            self.repo.delete(&self.ticker)?;
            self.repo.fetch_remote(&self.ticker)?
        } else {
            self.repo
                .load(&self.ticker)?
                .ok_or_else(|| DataError::NoStoredData {
                    ticker: self.ticker.clone(),
                })?
        };

        let series = absolute_returns(&rows, n_observations);
        tracing::debug!(
            ticker = %self.ticker,
            rows = rows.len(),
            returns = series.len(),
            "wrangled return series"
        );

        self.stage = ModelStage::Wrangled;
        Ok(self.series.insert(series))
    }

    pub fn fit(&mut self, order: GarchOrder) -> Result<&FittedGarch, ModelError> {
        let series = match (self.stage, self.series.as_ref()) {
            (ModelStage::Wrangled, Some(series)) => series,
            (ModelStage::Empty, _) => return Err(ModelError::NotWrangled),
            (from, _) => return Err(ModelError::InvalidTransition { from, op: "fit" }),
        };

        let fitted = FittedGarch::fit(&series.values, order)?;
        tracing::info!(
            ticker = %self.ticker,
            p = order.p,
            q = order.q,
            n_obs = fitted.n_obs,
            iterations = fitted.iterations,
            log_likelihood = fitted.log_likelihood,
            "GARCH model fitted"
        );

        self.stage = ModelStage::Fitted;
        Ok(self.fitted.insert(fitted))
    }

    /// Variance forecast for days `"1"..="horizon"`.
    pub fn predict(&self, horizon: usize) -> Result<Forecast, ModelError> {
        if horizon == 0 {
            return Err(ModelError::InvalidHorizon(0));
        }
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted("predict"))?;
        Forecast::from_variances(&fitted.forecast_variance(horizon)?)
    }

    /// Persist the fitted model; returns the artifact path.
    pub fn dump(&mut self) -> Result<PathBuf, ModelError> {
        match self.stage {
            ModelStage::Fitted => {}
            ModelStage::Empty | ModelStage::Wrangled => return Err(ModelError::NotFitted("dump")),
            from => return Err(ModelError::InvalidTransition { from, op: "dump" }),
        }
        let (fitted, series) = match (self.fitted.as_ref(), self.series.as_ref()) {
            (Some(f), Some(s)) => (f, s),
            _ => return Err(ModelError::NotFitted("dump")),
        };

        let (path, meta) = self.models.dump(&self.ticker, fitted, series)?;
        self.meta = Some(meta);
        self.stage = ModelStage::Dumped;
        Ok(path)
    }

    /// Load the active (highest version) model for this ticker.
    pub fn load(&mut self) -> Result<&ArtifactMeta, ModelError> {
        self.expect_stage(ModelStage::Empty, "load")?;
        let artifact = self.models.load_latest(&self.ticker)?;
        self.install(artifact.model, artifact.meta)
    }

    pub fn load_version(&mut self, version: u64) -> Result<&ArtifactMeta, ModelError> {
        self.expect_stage(ModelStage::Empty, "load")?;
        let artifact = self.models.load_version(&self.ticker, version)?;
        self.install(artifact.model, artifact.meta)
    }

    fn install(&mut self, model: FittedGarch, meta: ArtifactMeta) -> Result<&ArtifactMeta, ModelError> {
        tracing::debug!(ticker = %self.ticker, version = meta.version, "model loaded");
        self.fitted = Some(model);
        self.stage = ModelStage::Loaded;
        Ok(self.meta.insert(meta))
    }
}
