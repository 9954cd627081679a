//! Price repository: one table per ticker over a [`PriceStore`], refreshed from a [`PriceProvider`].

use super::provider::{DataError, PriceProvider, PriceRow};
use super::store::PriceStore;
use std::sync::Arc;

/// Shared price repository. Cheap to clone; clones share the same store and provider.
#[derive(Clone)]
pub struct PriceRepository {
    store: Arc<dyn PriceStore>,
    provider: Arc<dyn PriceProvider>,
}

impl PriceRepository {
    pub fn new(store: Arc<dyn PriceStore>, provider: Arc<dyn PriceProvider>) -> Self {
        Self { store, provider }
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, DataError> {
        self.store.table_exists(name)
    }

    pub fn delete(&self, name: &str) -> Result<(), DataError> {
        self.store.delete(name)
    }

    pub fn save(&self, name: &str, rows: &[PriceRow]) -> Result<(), DataError> {
        self.store.save(name, rows)
    }

    pub fn load(&self, name: &str) -> Result<Option<Vec<PriceRow>>, DataError> {
        self.store.load(name)
    }

    /// Name of the remote provider backing [`fetch_remote`](Self::fetch_remote).
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetch full history from the provider, sort ascending by date, persist, return.
    ///
    /// Nothing is written if the fetch or parse fails.
    pub fn fetch_remote(&self, ticker: &str) -> Result<Vec<PriceRow>, DataError> {
        let mut rows = self.provider.fetch_daily(ticker)?;
        rows.sort_by_key(|r| r.timestamp);
        self.save(ticker, &rows)?;
        tracing::info!(
            ticker,
            provider = self.provider.name(),
            rows = rows.len(),
            "stored fresh price history"
        );
        Ok(rows)
    }
}
