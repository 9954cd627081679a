//! Fitted-model artifacts on disk.
//!
//! Layout: `{model_dir}/{TICKER}.json`, optionally `{TICKER}_{tag}.json`.
//! Each file holds structured metadata next to the fitted model, and the
//! active model is chosen by metadata `(version, fitted_at)`, never by file
//! name. Writes go to a .tmp file and are renamed into place.

use super::garch::FittedGarch;
use super::ModelError;
use crate::data::store::validate_table_name;
use crate::data::ReturnSeries;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Provenance of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub ticker: String,
    /// Monotonically increasing per ticker.
    pub version: u64,
    pub fitted_at: DateTime<Utc>,
    pub n_observations: usize,
    /// BLAKE3 of the return series the model was fitted on.
    pub data_hash: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub meta: ArtifactMeta,
    pub model: FittedGarch,
}

/// Directory of model artifacts. Writes are serialized by an internal mutex.
pub struct ModelStore {
    model_dir: PathBuf,
    lock: Mutex<()>,
}

impl ModelStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Canonical artifact path for a ticker.
    pub fn path_for(&self, ticker: &str) -> Result<PathBuf, ModelError> {
        validate_table_name(ticker)?;
        Ok(self.model_dir.join(format!("{ticker}.json")))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write `model` as the next version for `ticker`, overwriting `{ticker}.json`.
    pub fn dump(
        &self,
        ticker: &str,
        model: &FittedGarch,
        series: &ReturnSeries,
    ) -> Result<(PathBuf, ArtifactMeta), ModelError> {
        let path = self.path_for(ticker)?;
        let _guard = self.guard();

        let version = self
            .candidates(ticker)?
            .iter()
            .map(|a| a.meta.version)
            .max()
            .unwrap_or(0)
            + 1;

        let artifact = ModelArtifact {
            meta: ArtifactMeta {
                ticker: ticker.to_string(),
                version,
                fitted_at: Utc::now(),
                n_observations: series.len(),
                data_hash: series.content_hash(),
                first_date: series.dates.first().copied(),
                last_date: series.dates.last().copied(),
            },
            model: model.clone(),
        };

        fs::create_dir_all(&self.model_dir).map_err(|e| {
            ModelError::Artifact(format!("create {}: {e}", self.model_dir.display()))
        })?;
        let json = serde_json::to_vec_pretty(&artifact)
            .map_err(|e| ModelError::Artifact(format!("serialize: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| ModelError::Artifact(format!("write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ModelError::Artifact(format!("atomic rename failed: {e}"))
        })?;

        tracing::info!(ticker, version, path = %path.display(), "model artifact written");
        Ok((path, artifact.meta))
    }

    /// Highest `(version, fitted_at)` artifact for `ticker`.
    pub fn load_latest(&self, ticker: &str) -> Result<ModelArtifact, ModelError> {
        validate_table_name(ticker)?;
        self.candidates(ticker)?
            .into_iter()
            .max_by(|a, b| {
                (a.meta.version, a.meta.fitted_at).cmp(&(b.meta.version, b.meta.fitted_at))
            })
            .ok_or_else(|| ModelError::ModelNotFound {
                ticker: ticker.to_string(),
            })
    }

    /// A specific version. If several files carry it, the newest fit wins.
    pub fn load_version(&self, ticker: &str, version: u64) -> Result<ModelArtifact, ModelError> {
        validate_table_name(ticker)?;
        let candidates = self.candidates(ticker)?;
        if candidates.is_empty() {
            return Err(ModelError::ModelNotFound {
                ticker: ticker.to_string(),
            });
        }
        candidates
            .into_iter()
            .filter(|a| a.meta.version == version)
            .max_by_key(|a| a.meta.fitted_at)
            .ok_or_else(|| ModelError::VersionNotFound {
                ticker: ticker.to_string(),
                version,
            })
    }

    /// Metadata of every readable artifact for `ticker`, ascending by version.
    pub fn list(&self, ticker: &str) -> Result<Vec<ArtifactMeta>, ModelError> {
        validate_table_name(ticker)?;
        let mut metas: Vec<ArtifactMeta> = self
            .candidates(ticker)?
            .into_iter()
            .map(|a| a.meta)
            .collect();
        metas.sort_by(|a, b| (a.version, a.fitted_at).cmp(&(b.version, b.fitted_at)));
        Ok(metas)
    }

    /// Parse every candidate file, skipping unreadable ones and other tickers' models.
    fn candidates(&self, ticker: &str) -> Result<Vec<ModelArtifact>, ModelError> {
        let entries = match fs::read_dir(&self.model_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ModelError::Artifact(format!(
                    "read {}: {e}",
                    self.model_dir.display()
                )))
            }
        };

        let exact = format!("{ticker}.json");
        let tagged_prefix = format!("{ticker}_");

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let is_candidate = name == exact
                || (name.starts_with(&tagged_prefix) && name.ends_with(".json"));
            if !is_candidate {
                continue;
            }

            let path = entry.path();
            match read_artifact(&path) {
                Ok(artifact) if artifact.meta.ticker == ticker => out.push(artifact),
                Ok(artifact) => {
                    tracing::debug!(
                        path = %path.display(),
                        owner = %artifact.meta.ticker,
                        "skipping artifact for another ticker"
                    );
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable model artifact");
                }
            }
        }
        Ok(out)
    }
}

fn read_artifact(path: &Path) -> Result<ModelArtifact, ModelError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ModelError::Artifact(format!("read {}: {e}", path.display())))?;
    let artifact: ModelArtifact = serde_json::from_str(&content)
        .map_err(|e| ModelError::Artifact(format!("parse {}: {e}", path.display())))?;
    artifact.model.validate()?;
    Ok(artifact)
}
