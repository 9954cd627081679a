use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use volcast_core::data::{AlphaVantageProvider, ParquetTableStore, PriceRepository};
use volcast_core::model::ModelStore;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::onchain::OracleClient;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub config: ServiceConfig,
    pub repo: PriceRepository,
    pub models: Arc<ModelStore>,
    pub oracle: OracleClient,
    pub locks: TickerLocks,
}

impl AppState {
    /// Production wiring: Parquet store, Alpha Vantage provider, model directory from config.
    ///
    /// Builds a blocking HTTP client, so call it outside the async runtime.
    pub fn new(config: ServiceConfig) -> Result<Arc<Self>, ServiceError> {
        let provider = AlphaVantageProvider::new(
            config.alpha_api_key.clone(),
            config.alpha_base_url.clone(),
        )?;
        let store = ParquetTableStore::new(&config.data_dir);
        let repo = PriceRepository::new(Arc::new(store), Arc::new(provider));
        let models = Arc::new(ModelStore::new(&config.model_directory));
        Ok(Self::with_components(config, repo, models))
    }

    pub fn with_components(
        config: ServiceConfig,
        repo: PriceRepository,
        models: Arc<ModelStore>,
    ) -> Arc<Self> {
        let oracle = OracleClient::from_config(&config);
        Arc::new(Self {
            config,
            repo,
            models,
            oracle,
            locks: TickerLocks::default(),
        })
    }
}

/// One mutex per ticker, so a fit's delete-fetch-save-fit-dump runs as a unit.
///
/// Entries live only while some caller holds or waits on them.
#[derive(Default)]
pub struct TickerLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TickerLocks {
    /// Run `f` with the ticker's mutex held.
    pub fn with_lock<T>(&self, ticker: &str, f: impl FnOnce() -> T) -> T {
        let entry = LockEntry {
            locks: self,
            ticker,
            lock: self.lock_for(ticker),
        };
        let _guard = entry.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Tickers with a live entry.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    fn lock_for(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.map().entry(ticker.to_string()).or_default().clone()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops the map entry on the way out (including unwinds) when the map and
/// this entry hold the only references.
struct LockEntry<'a> {
    locks: &'a TickerLocks,
    ticker: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        let idle = map
            .get(self.ticker)
            .is_some_and(|shared| Arc::ptr_eq(shared, &self.lock) && Arc::strong_count(shared) == 2);
        if idle {
            map.remove(self.ticker);
        }
    }
}
