//! Operations behind the HTTP endpoints and the CLI.
//!
//! Model work is synchronous and belongs on a blocking thread; chain calls are async.

use std::path::PathBuf;
use volcast_core::data::store::validate_table_name;
use volcast_core::model::{
    horizon_from_signed, ArtifactMeta, Forecast, GarchOrder, VolatilityModel,
};

use crate::error::ServiceError;
use crate::onchain::{Network, Submission};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub path: PathBuf,
    pub meta: ArtifactMeta,
}

/// Wrangle, fit and dump under the ticker's lock.
pub fn fit_model(
    state: &AppState,
    ticker: &str,
    use_new_data: bool,
    n_observations: i64,
    p: i64,
    q: i64,
) -> Result<FitOutcome, ServiceError> {
    let order = GarchOrder::from_signed(p, q)?;
    validate_table_name(ticker)?;

    state.locks.with_lock(ticker, || -> Result<FitOutcome, ServiceError> {
        let mut model = VolatilityModel::new(
            ticker,
            state.repo.clone(),
            state.models.clone(),
            use_new_data,
        );
        model.wrangle(n_observations)?;
        model.fit(order)?;
        let path = model.dump()?;
        let meta = model
            .meta()
            .cloned()
            .ok_or_else(|| ServiceError::Internal("dump recorded no metadata".into()))?;
        Ok(FitOutcome { path, meta })
    })
}

/// Load the active model (or an explicit version) and forecast `n_days`.
pub fn predict(
    state: &AppState,
    ticker: &str,
    n_days: i64,
    version: Option<u64>,
) -> Result<(Forecast, ArtifactMeta), ServiceError> {
    let horizon = horizon_from_signed(n_days)?;
    let mut model = VolatilityModel::new(ticker, state.repo.clone(), state.models.clone(), false);
    let meta = match version {
        Some(v) => model.load_version(v)?.clone(),
        None => model.load()?.clone(),
    };
    let forecast = model.predict(horizon)?;
    tracing::info!(ticker, version = meta.version, horizon, "forecast served");
    Ok((forecast, meta))
}

/// Submit with the process signing key. Fails before any network call when the key is absent.
pub async fn submit_forecast(
    state: &AppState,
    ticker: &str,
    forecast: &Forecast,
    contract_address: &str,
    network: Network,
    gas_price: Option<u64>,
) -> Result<String, ServiceError> {
    let private_key = state
        .config
        .private_key
        .as_deref()
        .ok_or(ServiceError::MissingPrivateKey)?;

    let hash = state
        .oracle
        .submit(Submission {
            ticker,
            forecast,
            contract_address,
            private_key,
            network,
            gas_price,
        })
        .await?;
    Ok(hash)
}

pub async fn latest_forecast_id(
    state: &AppState,
    ticker: &str,
    contract_address: &str,
    network: Network,
) -> Result<String, ServiceError> {
    Ok(state
        .oracle
        .latest_forecast_id(ticker, contract_address, network)
        .await?)
}
