//! Predictor: schema-checked inference over the resolved model

use super::resolver::{ModelResolver, ModelSource, ResolvedModel};
use crate::error::{DiamondError, Result};
use crate::preprocessing::{DiamondFeatures, FeatureRecord};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Prices for a batch of rows and the model that produced them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prices: Vec<f64>,
    pub source: ModelSource,
    pub fallback_reason: Option<String>,
}

/// Anything other than a missing artifact is reported as a prediction failure
fn as_prediction_failure(err: DiamondError) -> DiamondError {
    match err {
        DiamondError::ArtifactNotFound { .. } | DiamondError::PredictionFailure(_) => err,
        other => DiamondError::PredictionFailure(other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct Predictor {
    resolver: ModelResolver,
}

impl Predictor {
    pub fn new(resolver: ModelResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Resolve the current model (loading or reloading it if needed)
    pub fn resolve(&self) -> Result<ResolvedModel> {
        self.resolver.resolve().map_err(as_prediction_failure)
    }

    /// Validate rows against the model's schema (names, kinds, ranges) and predict
    pub fn predict_rows(&self, rows: &[FeatureRecord]) -> Result<Prediction> {
        let start = Instant::now();
        let resolved = self.resolve()?;
        let pipeline = resolved.pipeline();

        let frame = pipeline
            .schema()
            .records_to_frame(rows)
            .map_err(as_prediction_failure)?;
        let prices = pipeline.predict(&frame).map_err(as_prediction_failure)?;

        if let Some(bad) = prices.iter().find(|p| !p.is_finite()) {
            return Err(DiamondError::PredictionFailure(format!("model produced {}", bad)));
        }

        debug!(
            rows = rows.len(),
            source = %resolved.source,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Predicted"
        );
        Ok(Prediction {
            prices: prices.to_vec(),
            source: resolved.source,
            fallback_reason: resolved.fallback_reason,
        })
    }

    /// Predict a single typed row
    pub fn predict_one(&self, features: &DiamondFeatures) -> Result<(f64, ModelSource)> {
        let prediction = self.predict_rows(&[features.to_record()])?;
        let price = prediction
            .prices
            .first()
            .copied()
            .ok_or_else(|| DiamondError::PredictionFailure("no prediction returned".to_string()))?;
        Ok((price, prediction.source))
    }
}
