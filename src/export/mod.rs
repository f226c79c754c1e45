//! Model export and registry
//!
//! - Pipeline artifact: one bincode file written atomically per training run
//! - File-backed model registry with integer versions and aliases

mod artifact;
mod versioning;

pub use artifact::{
    load_pipeline, save_pipeline, write_atomic, PipelineArtifact, TrainingParams,
    ARTIFACT_FORMAT_VERSION,
};
pub use versioning::{ModelRegistry, ModelUri, RegistryEntry};
