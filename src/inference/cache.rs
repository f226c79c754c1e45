//! Process-wide cache of loaded pipeline artifacts
//!
//! Entries are keyed by artifact path and remember the file's modification
//! time and length. A lookup reloads only when either changed (a retrain
//! replaces the file through an atomic rename), so concurrent requests share
//! one `Arc<ModelPipeline>` without locking the model itself.

use crate::error::{DiamondError, Result};
use crate::export::{load_pipeline, TrainingParams};
use crate::training::{ModelPipeline, RegressionMetrics};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// File state an entry was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// A loaded artifact and the file state it was read from
#[derive(Debug)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub stamp: FileStamp,
    pub pipeline: Arc<ModelPipeline>,
    pub created_at: String,
    pub params: TrainingParams,
    pub metrics: Option<RegressionMetrics>,
}

/// Cache counters snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub loads: u64,
}

#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<PathBuf, Arc<LoadedModel>>>,
    hits: AtomicU64,
    loads: AtomicU64,
}

fn file_stamp(path: &Path) -> Result<FileStamp> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(FileStamp {
            modified: meta.modified()?,
            len: meta.len(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DiamondError::ArtifactNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `path`, loading it if absent or stale
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<LoadedModel>> {
        let stamp = file_stamp(path)?;

        if let Some(entry) = self.entries.read().get(path) {
            if entry.stamp == stamp {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(entry));
            }
        }

        let artifact = load_pipeline(path)?;
        let loaded = Arc::new(LoadedModel {
            path: path.to_path_buf(),
            stamp,
            pipeline: Arc::new(artifact.pipeline),
            created_at: artifact.created_at,
            params: artifact.params,
            metrics: artifact.metrics,
        });

        self.entries.write().insert(path.to_path_buf(), Arc::clone(&loaded));
        self.loads.fetch_add(1, Ordering::Relaxed);
        info!(path = %path.display(), created_at = %loaded.created_at, "Loaded model into cache");
        Ok(loaded)
    }

    /// Drop the entry for `path`; returns whether one existed
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.write().remove(path).is_some()
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }
}
