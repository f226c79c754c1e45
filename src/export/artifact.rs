//! Persisted pipeline artifact

use crate::error::{DiamondError, Result};
use crate::training::{ModelPipeline, RegressionMetrics};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Bumped whenever the encoded layout of [`PipelineArtifact`] changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Parameters the pipeline was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub max_depth: Option<usize>,
    pub test_size: f64,
    pub random_state: u64,
    pub n_train: usize,
    pub n_test: usize,
}

/// Everything written to disk for one trained pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    /// Must stay the first field; it is peeked before the full decode
    pub format_version: u32,
    /// RFC 3339 creation time
    pub created_at: String,
    pub params: TrainingParams,
    pub metrics: Option<RegressionMetrics>,
    pub pipeline: ModelPipeline,
}

impl PipelineArtifact {
    pub fn new(
        pipeline: ModelPipeline,
        params: TrainingParams,
        metrics: Option<RegressionMetrics>,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            params,
            metrics,
            pipeline,
        }
    }
}

/// Write bytes to a sibling temp file, then rename over `path`.
///
/// Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DiamondError::ValidationError(format!("{} is not a file path", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Encode and atomically write an artifact, replacing any previous file
pub fn save_pipeline(path: &Path, artifact: &PipelineArtifact) -> Result<()> {
    if !artifact.pipeline.is_fitted() {
        return Err(DiamondError::NotFitted);
    }
    let bytes = bincode::serialize(artifact)?;
    write_atomic(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Saved pipeline artifact");
    Ok(())
}

/// Read an artifact written by [`save_pipeline`]
pub fn load_pipeline(path: &Path) -> Result<PipelineArtifact> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DiamondError::ArtifactNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let version: u32 = bincode::deserialize(&bytes).map_err(|e| {
        DiamondError::SerializationError(format!("{} is not a pipeline artifact: {}", path.display(), e))
    })?;
    if version != ARTIFACT_FORMAT_VERSION {
        return Err(DiamondError::SerializationError(format!(
            "{} has artifact format {}, expected {}; retrain to regenerate it",
            path.display(),
            version,
            ARTIFACT_FORMAT_VERSION
        )));
    }

    let artifact: PipelineArtifact = bincode::deserialize(&bytes).map_err(|e| {
        DiamondError::SerializationError(format!("corrupt artifact {}: {}", path.display(), e))
    })?;
    if !artifact.pipeline.is_fitted() {
        return Err(DiamondError::SerializationError(format!(
            "artifact {} holds an unfitted pipeline",
            path.display()
        )));
    }

    debug!(path = %path.display(), created_at = %artifact.created_at, "Loaded pipeline artifact");
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{generate_diamonds, split_features_target};
    use crate::preprocessing::FeatureSchema;
    use crate::training::build_model;

    fn fitted_artifact() -> (PipelineArtifact, polars::prelude::DataFrame) {
        let (features, target) = split_features_target(&generate_diamonds(80, 4).unwrap()).unwrap();
        let mut model = build_model(&FeatureSchema::diamonds(), &features, Some(3)).unwrap();
        model.fit(&features, &target).unwrap();
        let params = TrainingParams {
            max_depth: Some(3),
            test_size: 0.2,
            random_state: 42,
            n_train: 80,
            n_test: 0,
        };
        (PipelineArtifact::new(model, params, None), features)
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_pipeline(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, DiamondError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, [1u8, 0, 0, 0, 0xff, 0xff]).unwrap();
        let err = load_pipeline(&path).unwrap_err();
        assert!(matches!(err, DiamondError::SerializationError(_)));
    }

    #[test]
    fn test_format_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.bin");
        let (mut artifact, _) = fitted_artifact();
        artifact.format_version = 0;
        fs::write(&path, bincode::serialize(&artifact).unwrap()).unwrap();
        let err = load_pipeline(&path).unwrap_err();
        assert!(err.to_string().contains("artifact format 0"));
    }

    #[test]
    fn test_save_creates_dirs_and_round_trips_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("model.bin");
        let (artifact, features) = fitted_artifact();

        save_pipeline(&path, &artifact).unwrap();
        let loaded = load_pipeline(&path).unwrap();

        assert_eq!(loaded.params, artifact.params);
        assert_eq!(
            loaded.pipeline.predict(&features).unwrap(),
            artifact.pipeline.predict(&features).unwrap()
        );
        // no temp files left behind
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_unfitted_pipeline_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (features, _) = split_features_target(&generate_diamonds(20, 4).unwrap()).unwrap();
        let model = build_model(&FeatureSchema::diamonds(), &features, Some(3)).unwrap();
        let params = TrainingParams {
            max_depth: Some(3),
            test_size: 0.2,
            random_state: 42,
            n_train: 0,
            n_test: 0,
        };
        let path = dir.path().join("m.bin");
        let err = save_pipeline(&path, &PipelineArtifact::new(model, params, None)).unwrap_err();
        assert!(matches!(err, DiamondError::NotFitted));
        assert!(!path.exists());
    }
}
