//! Application state management

use std::sync::Arc;

use crate::inference::{ModelCache, ModelResolver, Predictor, ResolvedModel};

use super::error::Result;
use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub predictor: Predictor,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let cache = Arc::new(ModelCache::new());
        let predictor = Predictor::new(ModelResolver::new(config.serve.clone(), cache));
        Self {
            config,
            predictor,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        self.predictor.resolver().cache()
    }

    /// Resolve the model off the async runtime (loading may hit the disk)
    pub async fn resolve_model(&self) -> Result<ResolvedModel> {
        let predictor = self.predictor.clone();
        let resolved = tokio::task::spawn_blocking(move || predictor.resolve()).await??;
        Ok(resolved)
    }

    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }
}
