use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use volcast_core::model::Forecast;

use crate::error::{BodyRejection, ServiceError};
use crate::service;
use crate::state::AppState;

// ── Request / response bodies ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRequest {
    pub ticker: String,
    pub use_new_data: bool,
    pub n_observations: i64,
    pub p: i64,
    pub q: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResponse {
    #[serde(flatten)]
    pub request: FitRequest,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
    pub n_days: i64,
    /// Explicit artifact version; the highest stored version when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub request: PredictRequest,
    pub success: bool,
    pub forecast: Forecast,
    pub message: String,
}

// ── Routes ──────────────────────────────────────────────────────────

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hello", get(hello))
        .route("/fit", post(fit))
        .route("/predict", post(predict))
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "Hello from GARCH API!" }))
}

async fn fit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FitRequest>, JsonRejection>,
) -> Result<Json<FitResponse>, BodyRejection> {
    let Json(request) = body?;

    let task_request = request.clone();
    let result = tokio::task::spawn_blocking(move || {
        service::fit_model(
            &state,
            &task_request.ticker,
            task_request.use_new_data,
            task_request.n_observations,
            task_request.p,
            task_request.q,
        )
    })
    .await
    .unwrap_or_else(|e| Err(ServiceError::Internal(format!("fit task failed: {e}"))));

    let (success, message) = match result {
        Ok(outcome) => {
            tracing::info!(
                ticker = %request.ticker,
                version = outcome.meta.version,
                path = %outcome.path.display(),
                "fit request complete"
            );
            (true, "Model trained successfully".to_string())
        }
        Err(e) => {
            tracing::warn!(ticker = %request.ticker, kind = ?e.kind(), error = %e, "fit failed");
            (false, e.to_string())
        }
    };

    Ok(Json(FitResponse {
        request,
        success,
        message,
    }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, BodyRejection> {
    let Json(request) = body?;

    let task_request = request.clone();
    let result = tokio::task::spawn_blocking(move || {
        service::predict(
            &state,
            &task_request.ticker,
            task_request.n_days,
            task_request.version,
        )
    })
    .await
    .unwrap_or_else(|e| Err(ServiceError::Internal(format!("predict task failed: {e}"))));

    let response = match result {
        Ok((forecast, _meta)) => PredictResponse {
            request,
            success: true,
            forecast,
            message: "Success".to_string(),
        },
        Err(e) => {
            tracing::warn!(ticker = %request.ticker, kind = ?e.kind(), error = %e, "predict failed");
            PredictResponse {
                request,
                success: false,
                forecast: Forecast::default(),
                message: e.to_string(),
            }
        }
    };
    Ok(Json(response))
}
