//! Model registry
//!
//! File-backed registry of pipeline artifacts. Each registered model name owns
//! a list of monotonically numbered versions plus named aliases
//! (`champion`, `staging`, ...) that point at one of them.
//!
//! Layout under the registry root:
//! ```text
//! index.json
//! <name>/v<version>.bin
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::artifact::{load_pipeline, write_atomic};
use crate::error::{DiamondError, Result};

/// Reference to a registered model version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    /// `models:/<name>@<alias>`
    Alias { name: String, alias: String },
    /// `models:/<name>/<version>`
    Version { name: String, version: u32 },
    /// `models:/<name>/latest`
    Latest { name: String },
}

impl ModelUri {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| DiamondError::InvalidParameter {
            name: "model_uri".to_string(),
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix("models:/")
            .ok_or_else(|| invalid("expected the models:/ scheme"))?;

        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || alias.is_empty() || alias.contains('/') {
                return Err(invalid("expected models:/<name>@<alias>"));
            }
            return Ok(ModelUri::Alias {
                name: name.to_string(),
                alias: alias.to_string(),
            });
        }

        match rest.split_once('/') {
            Some((name, "latest")) if !name.is_empty() => Ok(ModelUri::Latest {
                name: name.to_string(),
            }),
            Some((name, version)) if !name.is_empty() => {
                let version = version
                    .parse::<u32>()
                    .map_err(|_| invalid("version must be a positive integer or 'latest'"))?;
                Ok(ModelUri::Version {
                    name: name.to_string(),
                    version,
                })
            }
            _ => Err(invalid("expected models:/<name>@<alias> or models:/<name>/<version>")),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ModelUri::Alias { name, .. } | ModelUri::Version { name, .. } | ModelUri::Latest { name } => name,
        }
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUri::Alias { name, alias } => write!(f, "models:/{}@{}", name, alias),
            ModelUri::Version { name, version } => write!(f, "models:/{}/{}", name, version),
            ModelUri::Latest { name } => write!(f, "models:/{}/latest", name),
        }
    }
}

impl std::str::FromStr for ModelUri {
    type Err = DiamondError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Model registry entry (metadata only, without model data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub version: u32,
    /// Tracker run that produced the artifact
    pub run_id: Option<String>,
    /// Where the artifact was copied from
    pub source: String,
    /// File path relative to registry root
    pub path: String,
    pub registered_at: String,
}

/// Registry index
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryIndex {
    pub models: BTreeMap<String, Vec<RegistryEntry>>,
    /// model name -> alias -> version
    pub aliases: BTreeMap<String, BTreeMap<String, u32>>,
}

/// Model registry for managing versioned pipeline artifacts
#[derive(Debug)]
pub struct ModelRegistry {
    root: PathBuf,
    index: RegistryIndex,
}

impl ModelRegistry {
    /// Create or open registry at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            DiamondError::DataError(format!("Failed to create registry at {}: {}", root.display(), e))
        })?;

        let index_path = root.join("index.json");
        let index = if index_path.exists() {
            let bytes = fs::read(&index_path)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                DiamondError::SerializationError(format!("Failed to read registry index: {}", e))
            })?
        } else {
            RegistryIndex::default()
        };

        Ok(Self { root, index })
    }

    /// Open an existing registry without creating it
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        if !root.join("index.json").exists() {
            return Err(DiamondError::DataError(format!(
                "no model registry at {}",
                root.display()
            )));
        }
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn save_index(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.index)?;
        write_atomic(&self.root.join("index.json"), &bytes)
    }

    /// Copy a pipeline artifact into the registry as the next version of `name`
    pub fn register(&mut self, name: &str, artifact_path: &Path, run_id: Option<&str>) -> Result<u32> {
        validate_name(name)?;
        // Refuse to register something that cannot be served
        load_pipeline(artifact_path)?;

        let version = self
            .index
            .models
            .get(name)
            .and_then(|entries| entries.iter().map(|e| e.version).max())
            .unwrap_or(0)
            + 1;

        let relative_path = format!("{}/v{}.bin", name, version);
        let bytes = fs::read(artifact_path)?;
        write_atomic(&self.root.join(&relative_path), &bytes)?;

        let entry = RegistryEntry {
            name: name.to_string(),
            version,
            run_id: run_id.map(str::to_string),
            source: artifact_path.display().to_string(),
            path: relative_path,
            registered_at: chrono::Utc::now().to_rfc3339(),
        };
        self.index.models.entry(name.to_string()).or_default().push(entry);
        self.save_index()?;

        info!(model = name, version, "Registered model version");
        Ok(version)
    }

    /// Point `alias` at an existing version
    pub fn set_alias(&mut self, name: &str, alias: &str, version: u32) -> Result<()> {
        validate_name(alias)?;
        self.entry(name, version)?;
        self.index
            .aliases
            .entry(name.to_string())
            .or_default()
            .insert(alias.to_string(), version);
        self.save_index()?;
        info!(model = name, alias, version, "Set model alias");
        Ok(())
    }

    pub fn resolve(&self, uri: &ModelUri) -> Result<RegistryEntry> {
        match uri {
            ModelUri::Version { name, version } => self.entry(name, *version).cloned(),
            ModelUri::Latest { name } => self
                .versions(name)?
                .iter()
                .max_by_key(|e| e.version)
                .cloned()
                .ok_or_else(|| DiamondError::DataError(format!("No versions found: {}", name))),
            ModelUri::Alias { name, alias } => {
                let version = self
                    .index
                    .aliases
                    .get(name)
                    .and_then(|a| a.get(alias))
                    .ok_or_else(|| {
                        DiamondError::DataError(format!("Alias '{}' not set for model '{}'", alias, name))
                    })?;
                self.entry(name, *version).cloned()
            }
        }
    }

    /// Absolute path of an entry's stored artifact
    pub fn artifact_path(&self, entry: &RegistryEntry) -> PathBuf {
        self.root.join(&entry.path)
    }

    pub fn list_models(&self) -> Vec<String> {
        self.index.models.keys().cloned().collect()
    }

    pub fn list_versions(&self, name: &str) -> Vec<u32> {
        self.index
            .models
            .get(name)
            .map(|entries| entries.iter().map(|e| e.version).collect())
            .unwrap_or_default()
    }

    pub fn aliases(&self, name: &str) -> BTreeMap<String, u32> {
        self.index.aliases.get(name).cloned().unwrap_or_default()
    }

    fn versions(&self, name: &str) -> Result<&[RegistryEntry]> {
        self.index
            .models
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DiamondError::DataError(format!("Model not found: {}", name)))
    }

    fn entry(&self, name: &str, version: u32) -> Result<&RegistryEntry> {
        self.versions(name)?
            .iter()
            .find(|e| e.version == version)
            .ok_or_else(|| DiamondError::DataError(format!("Version {} not found for model '{}'", version, name)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && name != "."
        && name != "..";
    if ok {
        Ok(())
    } else {
        Err(DiamondError::InvalidParameter {
            name: "name".to_string(),
            value: name.to_string(),
            reason: "use letters, digits, '_', '-' or '.'".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{generate_diamonds, split_features_target};
    use crate::export::{save_pipeline, PipelineArtifact, TrainingParams};
    use crate::preprocessing::FeatureSchema;
    use crate::training::build_model;

    fn write_artifact(path: &Path) {
        let (features, target) = split_features_target(&generate_diamonds(40, 8).unwrap()).unwrap();
        let mut model = build_model(&FeatureSchema::diamonds(), &features, Some(2)).unwrap();
        model.fit(&features, &target).unwrap();
        let params = TrainingParams {
            max_depth: Some(2),
            test_size: 0.2,
            random_state: 42,
            n_train: 40,
            n_test: 0,
        };
        save_pipeline(path, &PipelineArtifact::new(model, params, None)).unwrap();
    }

    #[test]
    fn test_uri_parsing() {
        assert_eq!(
            ModelUri::parse("models:/diamonds_price_model@champion").unwrap(),
            ModelUri::Alias {
                name: "diamonds_price_model".into(),
                alias: "champion".into()
            }
        );
        assert_eq!(
            ModelUri::parse("models:/m/3").unwrap(),
            ModelUri::Version { name: "m".into(), version: 3 }
        );
        assert_eq!(
            ModelUri::parse("models:/m/latest").unwrap(),
            ModelUri::Latest { name: "m".into() }
        );
        assert!(ModelUri::parse("runs:/abc/model").is_err());
        assert!(ModelUri::parse("models:/m/x").is_err());
        assert!(ModelUri::parse("models:/@a").is_err());
    }

    #[test]
    fn test_uri_display_round_trip() {
        for s in ["models:/m@champion", "models:/m/2", "models:/m/latest"] {
            assert_eq!(ModelUri::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("model.bin");
        write_artifact(&artifact);

        let mut registry = ModelRegistry::open(dir.path().join("registry")).unwrap();
        assert_eq!(registry.register("m", &artifact, Some("run-1")).unwrap(), 1);
        assert_eq!(registry.register("m", &artifact, Some("run-2")).unwrap(), 2);
        registry.set_alias("m", "champion", 1).unwrap();

        let entry = registry.resolve(&ModelUri::parse("models:/m@champion").unwrap()).unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.run_id.as_deref(), Some("run-1"));
        assert!(registry.artifact_path(&entry).exists());

        let latest = registry.resolve(&ModelUri::parse("models:/m/latest").unwrap()).unwrap();
        assert_eq!(latest.version, 2);

        // index survives reopening
        let reopened = ModelRegistry::open(dir.path().join("registry")).unwrap();
        assert_eq!(reopened.list_versions("m"), vec![1, 2]);
        assert_eq!(reopened.aliases("m").get("champion"), Some(&1));
    }

    #[test]
    fn test_alias_to_missing_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::open(dir.path()).unwrap();
        assert!(registry.set_alias("m", "champion", 4).is_err());
    }

    #[test]
    fn test_register_rejects_bad_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::open(dir.path().join("registry")).unwrap();
        let err = registry
            .register("m", &dir.path().join("missing.bin"), None)
            .unwrap_err();
        assert!(matches!(err, DiamondError::ArtifactNotFound { .. }));
        assert!(registry.register("../evil", &dir.path().join("missing.bin"), None).is_err());
    }
}
