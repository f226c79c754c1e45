//! Column transformer: one-hot categorical blocks followed by numeric passthrough

use super::{encoder::OneHotEncoder, schema::FeatureSchema};
use crate::error::{DiamondError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One planned step of the transformer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnStep {
    OneHot(OneHotEncoder),
    Passthrough { column: String },
}

impl ColumnStep {
    pub fn column(&self) -> &str {
        match self {
            ColumnStep::OneHot(enc) => enc.column(),
            ColumnStep::Passthrough { column } => column,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnStep::OneHot(enc) => enc.width(),
            ColumnStep::Passthrough { .. } => 1,
        }
    }
}

/// Preprocessing plan built from a sample frame and the declared schema.
///
/// Output layout: one indicator block per categorical field (declared order,
/// categories sorted), then each numeric field unchanged (declared order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnTransformer {
    schema: FeatureSchema,
    steps: Vec<ColumnStep>,
    is_fitted: bool,
}

impl ColumnTransformer {
    /// Plan the steps after checking the sample's columns and dtypes
    pub fn from_sample(schema: &FeatureSchema, sample: &DataFrame) -> Result<Self> {
        if sample.height() == 0 {
            return Err(DiamondError::InsufficientData {
                what: "preprocessing plan".to_string(),
                required: 1,
                actual: 0,
            });
        }
        schema.check_frame(sample)?;

        let mut steps: Vec<ColumnStep> = schema
            .categorical_fields()
            .map(|f| ColumnStep::OneHot(OneHotEncoder::new(f.name.clone())))
            .collect();
        steps.extend(schema.numeric_fields().map(|f| ColumnStep::Passthrough {
            column: f.name.clone(),
        }));

        debug!(
            n_categorical = schema.categorical_fields().count(),
            n_numeric = schema.numeric_fields().count(),
            "Planned column transformer"
        );

        Ok(Self {
            schema: schema.clone(),
            steps,
            is_fitted: false,
        })
    }

    /// Learn category tables; values outside the declared vocabulary are rejected
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        self.schema.check_frame(df)?;

        for step in &mut self.steps {
            let ColumnStep::OneHot(encoder) = step else {
                continue;
            };
            let column = df.column(encoder.column())?;
            let values = column.as_materialized_series().str()?;

            if let Some(field) = self.schema.field(encoder.column()) {
                if let Some(bad) = values.into_iter().flatten().find(|v| !field.in_vocabulary(v)) {
                    return Err(DiamondError::UnknownCategory {
                        column: field.name.clone(),
                        value: bad.to_string(),
                    });
                }
            }
            encoder.fit(values);
        }

        self.is_fitted = true;
        debug!(n_features_out = self.n_features_out(), "Fitted column transformer");
        Ok(self)
    }

    /// Encode a frame into the model matrix, one output row per input row
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(DiamondError::NotFitted);
        }
        self.schema.check_frame(df)?;

        let n_rows = df.height();
        let mut out = Array2::<f64>::zeros((n_rows, self.n_features_out()));
        let mut offset = 0;

        for step in &self.steps {
            let width = step.width();
            let column = df.column(step.column())?.as_materialized_series();

            match step {
                ColumnStep::OneHot(encoder) => {
                    let values = column.str().map_err(|_| {
                        DiamondError::SchemaMismatch(format!(
                            "column '{}' must hold text, got {}",
                            encoder.column(),
                            column.dtype()
                        ))
                    })?;
                    for (i, value) in values.into_iter().enumerate() {
                        let mut row = out.row_mut(i);
                        let block = row
                            .as_slice_mut()
                            .map(|s| &mut s[offset..offset + width])
                            .ok_or_else(|| DiamondError::DataError("non-contiguous output row".to_string()))?;
                        encoder.encode_into(block, value)?;
                    }
                }
                ColumnStep::Passthrough { column: name } => {
                    let cast = column.cast(&DataType::Float64).map_err(|_| {
                        DiamondError::SchemaMismatch(format!(
                            "column '{}' must be numeric, got {}",
                            name,
                            column.dtype()
                        ))
                    })?;
                    for (i, value) in cast.f64()?.into_iter().enumerate() {
                        let v = value.ok_or_else(|| {
                            DiamondError::DataError(format!("null value in numeric column '{}' at row {}", name, i))
                        })?;
                        out[[i, offset]] = v;
                    }
                }
            }
            offset += width;
        }

        Ok(out)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Output column names in matrix order
    pub fn feature_names_out(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_features_out());
        for step in &self.steps {
            match step {
                ColumnStep::OneHot(enc) => names.extend(enc.feature_names()),
                ColumnStep::Passthrough { column } => names.push(column.clone()),
            }
        }
        names
    }

    pub fn n_features_out(&self) -> usize {
        self.steps.iter().map(ColumnStep::width).sum()
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| matches!(s, ColumnStep::OneHot(_)))
            .map(ColumnStep::column)
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| matches!(s, ColumnStep::Passthrough { .. }))
            .map(ColumnStep::column)
            .collect()
    }

    /// Learned categories for a categorical column
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.steps.iter().find_map(|s| match s {
            ColumnStep::OneHot(enc) if enc.column() == column => Some(enc.categories()),
            _ => None,
        })
    }

    pub fn steps(&self) -> &[ColumnStep] {
        &self.steps
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
