//! Two-stage model resolution: registry first (when enabled), then local file

use super::cache::{LoadedModel, ModelCache};
use crate::error::Result;
use crate::export::{ModelRegistry, ModelUri};
use crate::training::{ModelPipeline, DEFAULT_MODEL_PATH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MODEL_URI: &str = "models:/diamonds_price_model@champion";
pub const DEFAULT_REGISTRY_DIR: &str = "mlruns/registry";

/// Where the serving process looks for its model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeConfig {
    pub model_path: PathBuf,
    pub use_registry: bool,
    pub model_uri: String,
    pub registry_dir: PathBuf,
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ServeConfig {
    /// Build from a key lookup. `USE_MLFLOW_MODEL` and `MLFLOW_MODEL_URI` are
    /// honoured when the registry names are unset.
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_registry = lookup("USE_REGISTRY_MODEL")
            .or_else(|| lookup("USE_MLFLOW_MODEL"))
            .is_some_and(|v| is_truthy(&v));
        Self {
            model_path: lookup("MODEL_PATH")
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string())
                .into(),
            use_registry,
            model_uri: lookup("MODEL_URI")
                .or_else(|| lookup("MLFLOW_MODEL_URI"))
                .unwrap_or_else(|| DEFAULT_MODEL_URI.to_string()),
            registry_dir: lookup("MODEL_REGISTRY_DIR")
                .unwrap_or_else(|| DEFAULT_REGISTRY_DIR.to_string())
                .into(),
        }
    }

    /// Local-file-only configuration
    pub fn local(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            use_registry: false,
            model_uri: DEFAULT_MODEL_URI.to_string(),
            registry_dir: DEFAULT_REGISTRY_DIR.into(),
        }
    }
}

/// Which stage produced the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSource {
    Registry { uri: String, version: u32 },
    Local { path: PathBuf },
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Registry { uri, version } => write!(f, "registry {} (version {})", uri, version),
            ModelSource::Local { path } => write!(f, "local file {}", path.display()),
        }
    }
}

/// Result of a resolution
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub source: ModelSource,
    pub model: Arc<LoadedModel>,
    /// Why the registry stage was skipped over, when it was attempted
    pub fallback_reason: Option<String>,
}

impl ResolvedModel {
    pub fn pipeline(&self) -> &Arc<ModelPipeline> {
        &self.model.pipeline
    }
}

#[derive(Debug, Clone)]
pub struct ModelResolver {
    config: ServeConfig,
    cache: Arc<ModelCache>,
}

impl ModelResolver {
    pub fn new(config: ServeConfig, cache: Arc<ModelCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Resolve through the registry when enabled, falling back to the local artifact.
    ///
    /// A registry failure is not an error here; it is carried in `fallback_reason`.
    /// Only a failure of the local stage is returned as `Err`.
    pub fn resolve(&self) -> Result<ResolvedModel> {
        let fallback_reason = if self.config.use_registry {
            match self.resolve_registry() {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    warn!(
                        uri = %self.config.model_uri,
                        error = %e,
                        "Registry model unavailable, falling back to local artifact"
                    );
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        let model = self.cache.get_or_load(&self.config.model_path)?;
        debug!(path = %self.config.model_path.display(), "Resolved local model");
        Ok(ResolvedModel {
            source: ModelSource::Local {
                path: self.config.model_path.clone(),
            },
            model,
            fallback_reason,
        })
    }

    fn resolve_registry(&self) -> Result<ResolvedModel> {
        let uri = ModelUri::parse(&self.config.model_uri)?;
        let registry = ModelRegistry::open_existing(&self.config.registry_dir)?;
        let entry = registry.resolve(&uri)?;
        let model = self.cache.get_or_load(&registry.artifact_path(&entry))?;
        debug!(uri = %uri, version = entry.version, "Resolved registry model");
        Ok(ResolvedModel {
            source: ModelSource::Registry {
                uri: uri.to_string(),
                version: entry.version,
            },
            model,
            fallback_reason: None,
        })
    }

    /// Forget every cached model so the next resolution reads from disk
    pub fn evict(&self) -> usize {
        self.cache.clear()
    }
}
