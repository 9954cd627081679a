use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use volcast_core::model::Forecast;

use crate::error::BodyRejection;
use crate::onchain::Network;
use crate::service;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOnChainRequest {
    pub ticker: String,
    pub forecast: Forecast,
    pub contract_address: String,
    #[serde(default)]
    pub network: Network,
    /// Wei; the node's gas price when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOnChainResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestForecastIdRequest {
    pub ticker: String,
    pub contract_address: String,
    #[serde(default)]
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestForecastIdResponse {
    #[serde(flatten)]
    pub request: LatestForecastIdRequest,
    pub success: bool,
    pub message: String,
    /// Decimal string; the contract returns a uint256.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_id: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit-onchain", post(submit_onchain))
        .route("/latest-forecast-id", post(latest_forecast_id))
}

async fn submit_onchain(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitOnChainRequest>, JsonRejection>,
) -> Result<Json<SubmitOnChainResponse>, BodyRejection> {
    let Json(request) = body?;

    let result = service::submit_forecast(
        &state,
        &request.ticker,
        &request.forecast,
        &request.contract_address,
        request.network,
        request.gas_price,
    )
    .await;

    let response = match result {
        Ok(hash) => SubmitOnChainResponse {
            success: true,
            message: "Forecast submitted to Mantle Network".to_string(),
            transaction_hash: Some(hash),
            network: Some(request.network),
        },
        Err(e) => {
            tracing::warn!(ticker = %request.ticker, kind = ?e.kind(), error = %e, "on-chain submit failed");
            SubmitOnChainResponse {
                success: false,
                message: e.to_string(),
                transaction_hash: None,
                network: None,
            }
        }
    };
    Ok(Json(response))
}

async fn latest_forecast_id(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LatestForecastIdRequest>, JsonRejection>,
) -> Result<Json<LatestForecastIdResponse>, BodyRejection> {
    let Json(request) = body?;

    let result = service::latest_forecast_id(
        &state,
        &request.ticker,
        &request.contract_address,
        request.network,
    )
    .await;

    let (success, message, forecast_id) = match result {
        Ok(id) => (true, "Success".to_string(), Some(id)),
        Err(e) => {
            tracing::warn!(ticker = %request.ticker, kind = ?e.kind(), error = %e, "forecast id query failed");
            (false, e.to_string(), None)
        }
    };
    Ok(Json(LatestForecastIdResponse {
        request,
        success,
        message,
        forecast_id,
    }))
}
