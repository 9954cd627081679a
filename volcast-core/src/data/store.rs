//! Table stores for price rows, keyed by ticker.
//!
//! Parquet layout: `{data_dir}/{TABLE}.parquet` plus `{data_dir}/{TABLE}.meta.json`.
//!
//! - Replace-on-write: `save` swaps the whole table (write to .tmp, rename into place)
//! - Every operation runs under the store's mutex, so concurrent callers see
//!   either the old table or the new one, never a torn write
//! - Metadata sidecar per table (row count, date range, BLAKE3 content hash)

use super::provider::{DataError, PriceRow};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Capability interface over a table-per-ticker row store.
pub trait PriceStore: Send + Sync {
    /// True iff a table with exactly this name exists.
    fn table_exists(&self, name: &str) -> Result<bool, DataError>;

    /// Remove a table. No-op if absent.
    fn delete(&self, name: &str) -> Result<(), DataError>;

    /// Replace the table's rows wholesale.
    fn save(&self, name: &str, rows: &[PriceRow]) -> Result<(), DataError>;

    /// All stored rows in storage order, or `None` if no table exists.
    fn load(&self, name: &str) -> Result<Option<Vec<PriceRow>>, DataError>;
}

/// Metadata sidecar for a stored table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub table: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: usize,
    pub data_hash: String,
    pub saved_at: chrono::NaiveDateTime,
}

impl TableMeta {
    fn for_rows(table: &str, rows: &[PriceRow]) -> Result<Self, DataError> {
        Ok(Self {
            table: table.to_string(),
            start_date: rows.first().map(|r| r.timestamp),
            end_date: rows.last().map(|r| r.timestamp),
            row_count: rows.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(rows)
                    .map_err(|e| DataError::Store(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            saved_at: chrono::Local::now().naive_local(),
        })
    }
}

/// Table names become file names, so keep them to ticker-safe characters.
pub fn validate_table_name(name: &str) -> Result<(), DataError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='));
    if ok {
        Ok(())
    } else {
        Err(DataError::InvalidTableName(name.to_string()))
    }
}

/// Parquet-backed table store.
pub struct ParquetTableStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl ParquetTableStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Root directory of the store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_path(&self, name: &str) -> Result<PathBuf, DataError> {
        validate_table_name(name)?;
        Ok(self.data_dir.join(format!("{name}.parquet")))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.meta.json"))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic mid-operation leaves no partial table behind (writes go
        // through rename), so a poisoned lock is safe to reuse.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Metadata for a stored table, if present and readable.
    pub fn get_meta(&self, name: &str) -> Option<TableMeta> {
        let content = fs::read_to_string(self.meta_path(name)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl PriceStore for ParquetTableStore {
    fn table_exists(&self, name: &str) -> Result<bool, DataError> {
        let path = self.table_path(name)?;
        let _guard = self.guard();
        Ok(path.is_file())
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        let path = self.table_path(name)?;
        let _guard = self.guard();
        for p in [path, self.meta_path(name)] {
            match fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DataError::Store(format!("delete {}: {e}", p.display()))),
            }
        }
        tracing::debug!(table = name, "deleted table");
        Ok(())
    }

    fn save(&self, name: &str, rows: &[PriceRow]) -> Result<(), DataError> {
        let path = self.table_path(name)?;
        let df = rows_to_dataframe(rows)?;
        let meta = TableMeta::for_rows(name, rows)?;
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Store(format!("meta serialization: {e}")))?;

        let _guard = self.guard();
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| DataError::Store(format!("failed to create dir: {e}")))?;

        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Store(format!("atomic rename failed: {e}"))
        })?;

        fs::write(self.meta_path(name), meta_json)
            .map_err(|e| DataError::Store(format!("meta write: {e}")))?;

        tracing::debug!(table = name, rows = rows.len(), "saved table");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<PriceRow>>, DataError> {
        let path = self.table_path(name)?;
        let _guard = self.guard();
        if !path.is_file() {
            return Ok(None);
        }
        read_parquet(&path).map(Some)
    }
}

/// In-memory table store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<PriceRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<PriceRow>>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PriceStore for MemoryStore {
    fn table_exists(&self, name: &str) -> Result<bool, DataError> {
        validate_table_name(name)?;
        Ok(self.tables().contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        validate_table_name(name)?;
        self.tables().remove(name);
        Ok(())
    }

    fn save(&self, name: &str, rows: &[PriceRow]) -> Result<(), DataError> {
        validate_table_name(name)?;
        self.tables().insert(name.to_string(), rows.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<PriceRow>>, DataError> {
        validate_table_name(name)?;
        Ok(self.tables().get(name).cloned())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn rows_to_dataframe(rows: &[PriceRow]) -> Result<DataFrame, DataError> {
    let epoch = epoch();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.timestamp - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let adj_closes: Vec<f64> = rows.iter().map(|r| r.adjusted_close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();
    let dividends: Vec<f64> = rows.iter().map(|r| r.dividend_amount).collect();
    let splits: Vec<f64> = rows.iter().map(|r| r.split_coefficient).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("adjusted_close".into(), adj_closes),
        Column::new("volume".into(), volumes),
        Column::new("dividend_amount".into(), dividends),
        Column::new("split_coefficient".into(), splits),
    ])
    .map_err(|e| DataError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Vec<PriceRow>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read: {e}")))?;
    dataframe_to_rows(&df)
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<PriceRow>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::Parquet(format!("missing column '{name}': {e}")))
    };
    let f64_col = |name: &str| -> Result<Float64Chunked, DataError> {
        col(name)?
            .f64()
            .cloned()
            .map_err(|e| DataError::Parquet(format!("{name} column type: {e}")))
    };

    let date_ca = col("timestamp")?
        .date()
        .map_err(|e| DataError::Parquet(format!("timestamp column type: {e}")))?
        .clone();
    let vol_ca = col("volume")?
        .u64()
        .map_err(|e| DataError::Parquet(format!("volume column type: {e}")))?
        .clone();
    let open_ca = f64_col("open")?;
    let high_ca = f64_col("high")?;
    let low_ca = f64_col("low")?;
    let close_ca = f64_col("close")?;
    let adj_ca = f64_col("adjusted_close")?;
    let div_ca = f64_col("dividend_amount")?;
    let split_ca = f64_col("split_coefficient")?;

    let epoch = epoch();
    let n = df.height();
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::Parquet(format!("null timestamp at row {i}")))?;

        rows.push(PriceRow {
            timestamp: epoch + chrono::Duration::days(days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            adjusted_close: adj_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            dividend_amount: div_ca.get(i).unwrap_or(0.0),
            split_coefficient: split_ca.get(i).unwrap_or(1.0),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<PriceRow> {
        vec![
            PriceRow {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: 100.0,
                high: 102.0,
                low: 99.0,
                close: 101.0,
                adjusted_close: 101.0,
                volume: 1000,
                dividend_amount: 0.0,
                split_coefficient: 1.0,
            },
            PriceRow {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                open: 101.0,
                high: 103.0,
                low: 100.0,
                close: 102.0,
                adjusted_close: 101.5,
                volume: 1100,
                dividend_amount: 0.25,
                split_coefficient: 1.0,
            },
        ]
    }

    fn exercise_contract(store: &dyn PriceStore) {
        assert!(!store.table_exists("SPY").unwrap());
        assert!(store.load("SPY").unwrap().is_none());

        store.save("SPY", &sample_rows()).unwrap();
        assert!(store.table_exists("SPY").unwrap());
        assert!(!store.table_exists("spy").unwrap());
        assert_eq!(store.load("SPY").unwrap().unwrap(), sample_rows());

        // Replace, not append.
        store.save("SPY", &sample_rows()[..1]).unwrap();
        assert_eq!(store.load("SPY").unwrap().unwrap().len(), 1);

        store.delete("SPY").unwrap();
        store.delete("SPY").unwrap();
        assert!(!store.table_exists("SPY").unwrap());
        assert!(store.load("SPY").unwrap().is_none());

        for bad in ["", "..", "../etc", "a/b", "a b"] {
            let invalid = |r: Result<(), DataError>| matches!(r, Err(DataError::InvalidTableName(_)));
            assert!(invalid(store.table_exists(bad).map(drop)), "table_exists accepted {bad:?}");
            assert!(invalid(store.load(bad).map(drop)), "load accepted {bad:?}");
            assert!(invalid(store.delete(bad)), "delete accepted {bad:?}");
            assert!(invalid(store.save(bad, &sample_rows())), "save accepted {bad:?}");
        }
    }

    #[test]
    fn parquet_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise_contract(&ParquetTableStore::new(dir.path()));
    }

    #[test]
    fn memory_store_contract() {
        exercise_contract(&MemoryStore::new());
    }

    #[test]
    fn parquet_preserves_storage_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        let mut rows = sample_rows();
        rows.reverse();

        store.save("SPY", &rows).unwrap();
        let loaded = store.load("SPY").unwrap().unwrap();
        assert_eq!(loaded[0].timestamp, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(loaded[0].dividend_amount, 0.25);
    }

    #[test]
    fn empty_table_is_present_but_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        store.save("EMPTY", &[]).unwrap();
        assert!(store.table_exists("EMPTY").unwrap());
        assert_eq!(store.load("EMPTY").unwrap().unwrap().len(), 0);
    }

    #[test]
    fn meta_sidecar_written_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        store.save("SHOPERSTOP.BSE", &sample_rows()).unwrap();

        let meta = store.get_meta("SHOPERSTOP.BSE").unwrap();
        assert_eq!(meta.table, "SHOPERSTOP.BSE");
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(meta.data_hash.len(), 64);
    }

    #[test]
    fn rejected_names_leave_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetTableStore::new(dir.path());
        assert!(store.save("../escape", &sample_rows()).is_err());
        assert!(!dir.path().join("..").join("escape.parquet").exists());
    }
}
