//! Absolute daily returns.
//!
//! r[t] = |close[t] / close[t-1] - 1|, first value dropped, then trimmed like a
//! tail: a non-negative `n_observations` keeps the trailing `n` entries, a
//! negative one keeps everything except the leading `|n|`. Non-finite changes
//! (NaN closes, zero prior close) are dropped the same way the undefined first
//! value is.

use super::provider::PriceRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A derived return series, aligned with the dates it was computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// BLAKE3 over the dates and values, recorded in model artifacts.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (date, value) in self.dates.iter().zip(&self.values) {
            hasher.update(date.to_string().as_bytes());
            hasher.update(&value.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Absolute percentage change of close, trimmed to `n_observations` (see module docs).
pub fn absolute_returns(rows: &[PriceRow], n_observations: i64) -> ReturnSeries {
    let mut dates = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut values = Vec::with_capacity(rows.len().saturating_sub(1));

    for w in rows.windows(2) {
        let change = (w[1].close / w[0].close - 1.0).abs();
        if change.is_finite() {
            dates.push(w[1].timestamp);
            values.push(change);
        }
    }

    let skip = match usize::try_from(n_observations) {
        Ok(keep) => values.len().saturating_sub(keep),
        Err(_) => usize::try_from(n_observations.unsigned_abs())
            .unwrap_or(usize::MAX)
            .min(values.len()),
    };
    ReturnSeries {
        dates: dates.split_off(skip),
        values: values.split_off(skip),
    }
}
