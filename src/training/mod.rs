//! Model training module
//!
//! - CART regression tree ([`DecisionTreeRegressor`])
//! - Preprocessing + tree pipeline ([`ModelPipeline`], [`build_model`])
//! - Hold-out evaluation ([`RegressionMetrics`])
//! - The end-to-end training workflow ([`TrainingWorkflow`])

mod config;
mod metrics;
mod pipeline;
pub mod decision_tree;
pub mod workflow;

pub use config::{
    format_max_depth, parse_max_depth, TrainingConfig, DEFAULT_ALIAS, DEFAULT_DATA_PATH,
    DEFAULT_EXPERIMENT, DEFAULT_MAX_DEPTH, DEFAULT_MODEL_PATH, DEFAULT_RANDOM_STATE,
    DEFAULT_TEST_SIZE, DEFAULT_TRACKING_URI,
};
pub use decision_tree::{DecisionTreeRegressor, TreeNode};
pub use metrics::RegressionMetrics;
pub use pipeline::{build_model, build_model_with_seed, ModelPipeline};
pub use workflow::{train, TrainingReport, TrainingWorkflow, WorkflowStage, ARTIFACT_DIR};
