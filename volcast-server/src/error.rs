use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use volcast_core::data::DataError;
use volcast_core::model::ModelError;

use crate::onchain::OnChainError;

/// Coarse classification of a failure, independent of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    NotFound,
    RemoteFetch,
    Convergence,
    Connection,
    TransactionFailed,
    ConfigMissing,
    Internal,
}

/// Unified error type for service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    OnChain(#[from] OnChainError),

    #[error("PRIVATE_KEY not configured")]
    MissingPrivateKey,

    #[error("{0}")]
    Internal(String),
}

impl From<DataError> for ServiceError {
    fn from(e: DataError) -> Self {
        Self::Model(ModelError::Data(e))
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Model(e) => model_kind(e),
            Self::OnChain(e) => match e {
                OnChainError::Connection { .. } | OnChainError::Call(_) => ErrorKind::Connection,
                OnChainError::InvalidAddress(_)
                | OnChainError::InvalidPrivateKey
                | OnChainError::InvalidValue { .. } => ErrorKind::InputValidation,
                OnChainError::Submit(_) | OnChainError::TransactionFailed(_) => {
                    ErrorKind::TransactionFailed
                }
            },
            Self::MissingPrivateKey => ErrorKind::ConfigMissing,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A body that failed to parse: 422 with the same `{success, message}` envelope.
pub struct BodyRejection(pub JsonRejection);

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        let message = self.0.body_text();
        tracing::debug!(%message, "rejected request body");
        let body = json!({ "success": false, "message": message });
        (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for BodyRejection {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection)
    }
}

fn model_kind(e: &ModelError) -> ErrorKind {
    match e {
        ModelError::Data(d) => match d {
            DataError::NoStoredData { .. } => ErrorKind::NotFound,
            DataError::RemoteFetch { .. } | DataError::ResponseFormat { .. } => {
                ErrorKind::RemoteFetch
            }
            DataError::InvalidTableName(_) => ErrorKind::InputValidation,
            DataError::HttpClient(_) | DataError::Store(_) | DataError::Parquet(_) => {
                ErrorKind::Internal
            }
        },
        ModelError::ModelNotFound { .. } | ModelError::VersionNotFound { .. } => {
            ErrorKind::NotFound
        }
        ModelError::InvalidOrder(_)
        | ModelError::InvalidHorizon(_)
        | ModelError::HorizonTooLarge(_)
        | ModelError::InsufficientData { .. }
        | ModelError::DegenerateSeries => ErrorKind::InputValidation,
        ModelError::Convergence(_) => ErrorKind::Convergence,
        ModelError::NotWrangled
        | ModelError::NotFitted(_)
        | ModelError::InvalidTransition { .. }
        | ModelError::Artifact(_) => ErrorKind::Internal,
    }
}
