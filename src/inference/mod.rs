//! Inference module
//!
//! - [`ModelCache`]: loaded artifacts keyed by path, refreshed when the file changes
//! - [`ModelResolver`]: registry-then-local model resolution
//! - [`Predictor`]: validates inbound rows and predicts prices

mod cache;
mod engine;
mod resolver;

pub use cache::{CacheStats, FileStamp, LoadedModel, ModelCache};
pub use engine::{Prediction, Predictor};
pub use resolver::{
    ModelResolver, ModelSource, ResolvedModel, ServeConfig, DEFAULT_MODEL_URI,
    DEFAULT_REGISTRY_DIR,
};
