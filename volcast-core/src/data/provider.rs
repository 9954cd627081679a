//! Price row type, provider trait, and structured data errors.
//!
//! The PriceProvider trait abstracts over market-data sources so the
//! repository can be driven by Alpha Vantage in production and by stubs in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One daily adjusted price row, as delivered by the market-data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub timestamp: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: u64,
    pub dividend_amount: f64,
    pub split_coefficient: f64,
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no stored price data for '{ticker}'")]
    NoStoredData { ticker: String },

    #[error("remote fetch failed for '{ticker}': {reason}")]
    RemoteFetch { ticker: String, reason: String },

    #[error("unparsable response for '{ticker}': {reason}")]
    ResponseFormat { ticker: String, reason: String },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),
}

impl DataError {
    /// True for errors caused by the remote provider rather than local storage.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DataError::RemoteFetch { .. } | DataError::ResponseFormat { .. }
        )
    }
}

/// Trait for market-data providers.
///
/// Providers return rows in whatever order the source delivers them;
/// sorting and persistence are the repository's job.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the full daily adjusted history for a ticker. Single attempt.
    fn fetch_daily(&self, ticker: &str) -> Result<Vec<PriceRow>, DataError>;
}
