//! Preprocessing plan + regressor as one fitted unit

use super::decision_tree::DecisionTreeRegressor;
use crate::error::{DiamondError, Result};
use crate::preprocessing::{ColumnTransformer, FeatureSchema};
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Build an unfitted pipeline from the declared schema and a sample of the
/// training partition.
///
/// `max_depth = None` grows the tree without a depth limit.
pub fn build_model(
    schema: &FeatureSchema,
    sample: &DataFrame,
    max_depth: Option<usize>,
) -> Result<ModelPipeline> {
    build_model_with_seed(schema, sample, max_depth, 42)
}

/// Same as [`build_model`] with an explicit tree seed
pub fn build_model_with_seed(
    schema: &FeatureSchema,
    sample: &DataFrame,
    max_depth: Option<usize>,
    random_state: u64,
) -> Result<ModelPipeline> {
    if max_depth == Some(0) {
        return Err(DiamondError::InvalidParameter {
            name: "max_depth".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1 or unbounded".to_string(),
        });
    }

    let preprocessor = ColumnTransformer::from_sample(schema, sample)?;
    let regressor = DecisionTreeRegressor::new()
        .with_max_depth(max_depth)
        .with_random_state(random_state);

    debug!(?max_depth, random_state, "Built model pipeline");

    Ok(ModelPipeline {
        preprocessor,
        regressor,
        feature_names: Vec::new(),
    })
}

/// Fitted (or fittable) preprocessing + regression pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPipeline {
    preprocessor: ColumnTransformer,
    regressor: DecisionTreeRegressor,
    feature_names: Vec<String>,
}

impl ModelPipeline {
    /// Fit preprocessing and regressor; a re-fit replaces all learned state
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<&mut Self> {
        if x.height() != y.len() {
            return Err(DiamondError::ShapeError {
                expected: format!("{} targets", x.height()),
                actual: format!("{} targets", y.len()),
            });
        }

        let matrix = self.preprocessor.fit_transform(x)?;
        self.regressor.fit(&matrix, y)?;
        self.feature_names = self.preprocessor.feature_names_out();

        info!(
            n_samples = x.height(),
            n_features = matrix.ncols(),
            depth = self.regressor.get_depth(),
            n_leaves = self.regressor.get_n_leaves(),
            "Fitted model pipeline"
        );
        Ok(self)
    }

    /// Predict prices for a frame whose columns are matched by name
    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(DiamondError::NotFitted);
        }
        let matrix = self.preprocessor.transform(x)?;
        self.regressor.predict(&matrix)
    }

    pub fn is_fitted(&self) -> bool {
        self.preprocessor.is_fitted() && self.regressor.is_fitted()
    }

    pub fn preprocessor(&self) -> &ColumnTransformer {
        &self.preprocessor
    }

    pub fn regressor(&self) -> &DecisionTreeRegressor {
        &self.regressor
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.preprocessor.schema()
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.regressor.max_depth
    }

    pub fn tree_depth(&self) -> usize {
        self.regressor.get_depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.regressor.get_n_leaves()
    }

    /// Importances keyed by output feature name, highest first
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let Some(importances) = self.regressor.feature_importances() else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(importances.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }
}
