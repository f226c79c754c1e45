//! Diamond price regression
//!
//! Trains a preprocessing + decision-tree pipeline on the diamonds dataset,
//! evaluates it on a held-out split, persists it as a single artifact, logs
//! the run to an experiment tracker and serves predictions from a web form.
//!
//! # Modules
//!
//! - [`preprocessing`] - Declared feature schema, one-hot encoding, column plan
//! - [`training`] - CART regressor, model pipeline, metrics, training workflow
//! - [`data`] - CSV loading, dataset download, train/test split, synthetic data
//! - [`export`] - Artifact persistence and the file-backed model registry
//! - [`tracking`] - Experiment tracker trait with file and MLflow backends
//! - [`inference`] - Model cache, registry-then-local resolution, predictor
//! - [`server`] - HTML form and JSON API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod preprocessing;
pub mod training;
pub mod data;
pub mod export;
pub mod tracking;
pub mod inference;

pub mod server;
pub mod cli;

pub use error::{DiamondError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{DiamondError, Result};

    pub use crate::preprocessing::{
        ColumnTransformer, DiamondFeatures, FeatureRecord, FeatureSchema, FieldValue, OneHotEncoder,
    };

    pub use crate::training::{
        build_model, train, DecisionTreeRegressor, ModelPipeline, RegressionMetrics, TrainingConfig,
        TrainingReport, TrainingWorkflow, WorkflowStage,
    };

    pub use crate::data::{generate_diamonds, load_diamonds, split_features_target, train_test_split};

    pub use crate::export::{load_pipeline, save_pipeline, ModelRegistry, ModelUri, PipelineArtifact};

    pub use crate::tracking::{FileTracker, HttpTracker, RunStatus, Tracker, TrackingUri};

    pub use crate::inference::{ModelCache, ModelResolver, ModelSource, Predictor, ServeConfig};
}
