//! One-hot encoding for a single categorical column

use crate::error::{DiamondError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One-hot encoder over a sorted category table.
///
/// Categories not seen during fit encode as an all-zero block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    column: String,
    categories: Vec<String>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    /// Learn the sorted set of observed categories; nulls are skipped
    pub fn fit<'a, I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let observed: BTreeSet<&str> = values.into_iter().flatten().collect();
        self.categories = observed.into_iter().map(str::to_string).collect();
        self.is_fitted = true;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Width of the indicator block
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Output names in `<column>_<category>` form
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}_{}", self.column, c))
            .collect()
    }

    /// Write the indicator block for one value into `out`.
    ///
    /// `out` must be exactly `width()` long and is fully overwritten.
    pub fn encode_into(&self, out: &mut [f64], value: Option<&str>) -> Result<()> {
        if !self.is_fitted {
            return Err(DiamondError::NotFitted);
        }
        if out.len() != self.width() {
            return Err(DiamondError::ShapeError {
                expected: format!("{} indicator slots", self.width()),
                actual: format!("{}", out.len()),
            });
        }
        out.fill(0.0);

        let Some(value) = value else {
            return Ok(());
        };
        if let Ok(idx) = self.categories.binary_search_by(|c| c.as_str().cmp(value)) {
            out[idx] = 1.0;
        }
        Ok(())
    }
}
