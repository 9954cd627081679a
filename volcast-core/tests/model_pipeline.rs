//! End-to-end model pipeline over the Parquet store: seed, wrangle, fit, dump, load, predict.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use volcast_core::data::synthetic::{garch_price_series, SyntheticParams};
use volcast_core::data::{
    DataError, ParquetTableStore, PriceProvider, PriceRepository, PriceRow, PriceStore,
};
use volcast_core::model::{GarchOrder, ModelError, ModelStage, ModelStore, VolatilityModel};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

struct TempRoot(PathBuf);

impl TempRoot {
    fn new(tag: &str) -> Self {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "volcast_pipeline_{tag}_{}_{id}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Offline provider; the pipeline tests never reach the network.
struct OfflineProvider;

impl PriceProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn fetch_daily(&self, ticker: &str) -> Result<Vec<PriceRow>, DataError> {
        Err(DataError::RemoteFetch {
            ticker: ticker.to_string(),
            reason: "offline".into(),
        })
    }
}

fn seeded(root: &TempRoot, ticker: &str, rows: usize) -> (PriceRepository, Arc<ModelStore>) {
    let store = Arc::new(ParquetTableStore::new(root.0.join("data")));
    store
        .save(
            ticker,
            &garch_price_series(
                ticker,
                rows,
                NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
                SyntheticParams::default(),
            ),
        )
        .unwrap();
    let repo = PriceRepository::new(store, Arc::new(OfflineProvider));
    (repo, Arc::new(ModelStore::new(root.0.join("models"))))
}

#[test]
fn fit_on_seeded_series_then_predict_five_days() {
    let root = TempRoot::new("scenario");
    let (repo, models) = seeded(&root, "TEST", 1000);

    let mut model = VolatilityModel::new("TEST", repo.clone(), models.clone(), false);
    assert_eq!(model.wrangle(500).unwrap().len(), 500);
    model.fit(GarchOrder::new(1, 1).unwrap()).unwrap();
    let path = model.dump().unwrap();
    assert_eq!(path, root.0.join("models").join("TEST.json"));

    let mut serving = VolatilityModel::new("TEST", repo, models, false);
    serving.load().unwrap();
    assert_eq!(serving.stage(), ModelStage::Loaded);

    let forecast = serving.predict(5).unwrap();
    let keys: Vec<&str> = forecast.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["1", "2", "3", "4", "5"]);
    assert!(forecast.values().all(|v| v.is_finite() && v >= 0.0));
    assert_eq!(forecast, model.predict(5).unwrap());
}

#[test]
fn refit_bumps_version_and_old_version_stays_addressable_by_number() {
    let root = TempRoot::new("versions");
    let (repo, models) = seeded(&root, "TEST", 700);

    for n in [300, 600] {
        let mut model = VolatilityModel::new("TEST", repo.clone(), models.clone(), false);
        model.wrangle(n).unwrap();
        model.fit(GarchOrder::new(1, 1).unwrap()).unwrap();
        model.dump().unwrap();
    }

    let mut latest = VolatilityModel::new("TEST", repo.clone(), models.clone(), false);
    let meta = latest.load().unwrap();
    assert_eq!(meta.version, 2);
    assert_eq!(meta.n_observations, 600);

    // Dump overwrote TEST.json, so version 1 no longer exists on disk.
    let mut old = VolatilityModel::new("TEST", repo, models, false);
    assert!(matches!(
        old.load_version(1),
        Err(ModelError::VersionNotFound { version: 1, .. })
    ));
}

#[test]
fn unseen_ticker_is_not_found_on_both_paths() {
    let root = TempRoot::new("unseen");
    let (repo, models) = seeded(&root, "TEST", 100);

    let mut fit_path = VolatilityModel::new("GHOST", repo.clone(), models.clone(), false);
    assert!(fit_path.wrangle(50).unwrap_err().is_not_found());

    let mut predict_path = VolatilityModel::new("GHOST", repo, models, false);
    let err = predict_path.load().unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("GHOST"));
}

#[test]
fn fresh_data_fetch_failure_leaves_ticker_without_rows() {
    let root = TempRoot::new("fresh_fail");
    let (repo, models) = seeded(&root, "TEST", 100);

    let mut model = VolatilityModel::new("TEST", repo.clone(), models, true);
    let err = model.wrangle(50).unwrap_err();

    assert!(matches!(err, ModelError::Data(ref e) if e.is_remote()));
    assert!(!repo.table_exists("TEST").unwrap());
}

#[test]
fn too_few_observations_for_order() {
    let root = TempRoot::new("short");
    let (repo, models) = seeded(&root, "TEST", 1000);

    let mut model = VolatilityModel::new("TEST", repo, models, false);
    model.wrangle(4).unwrap();
    assert!(matches!(
        model.fit(GarchOrder::new(1, 1).unwrap()),
        Err(ModelError::InsufficientData { available: 4, .. })
    ));
}
