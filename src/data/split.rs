//! Feature/target separation and seeded train/test split

use crate::error::{DiamondError, Result};
use crate::preprocessing::TARGET_COLUMN;
use ndarray::Array1;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Smallest training partition the workflow accepts
pub const MIN_TRAIN_ROWS: usize = 10;
/// Smallest test partition the workflow accepts
pub const MIN_TEST_ROWS: usize = 1;

/// Split a dataset into the feature frame and the price vector.
///
/// Null or negative prices are rejected.
pub fn split_features_target(df: &DataFrame) -> Result<(DataFrame, Array1<f64>)> {
    let column = df.column(TARGET_COLUMN).map_err(|_| {
        DiamondError::SchemaMismatch(format!("target column '{}' not found", TARGET_COLUMN))
    })?;

    let cast = column
        .as_materialized_series()
        .cast(&DataType::Float64)
        .map_err(|_| DiamondError::SchemaMismatch(format!("target column '{}' is not numeric", TARGET_COLUMN)))?;

    let mut target = Vec::with_capacity(df.height());
    for (i, value) in cast.f64()?.into_iter().enumerate() {
        match value {
            None => {
                return Err(DiamondError::DataError(format!("null {} at row {}", TARGET_COLUMN, i)));
            }
            Some(v) if !v.is_finite() || v < 0.0 => {
                return Err(DiamondError::DataError(format!(
                    "invalid {} {} at row {}; prices must be finite and non-negative",
                    TARGET_COLUMN, v, i
                )));
            }
            Some(v) => target.push(v),
        }
    }

    let features = df.drop(TARGET_COLUMN)?;
    Ok((features, Array1::from_vec(target)))
}

/// Train and test partitions
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Shuffle rows with a seeded ChaCha8 generator and hold out `ceil(n * test_size)` rows
pub fn train_test_split(
    features: &DataFrame,
    target: &Array1<f64>,
    test_size: f64,
    random_state: u64,
) -> Result<TrainTestSplit> {
    let n = features.height();
    if n != target.len() {
        return Err(DiamondError::ShapeError {
            expected: format!("{} targets", n),
            actual: format!("{} targets", target.len()),
        });
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DiamondError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be strictly between 0 and 1".to_string(),
        });
    }

    let n_test = (n as f64 * test_size).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test < MIN_TEST_ROWS {
        return Err(DiamondError::InsufficientData {
            what: "test partition".to_string(),
            required: MIN_TEST_ROWS,
            actual: n_test,
        });
    }
    if n_train < MIN_TRAIN_ROWS {
        return Err(DiamondError::InsufficientData {
            what: "training partition".to_string(),
            required: MIN_TRAIN_ROWS,
            actual: n_train,
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    let split = TrainTestSplit {
        x_train: take_rows(features, train_idx)?,
        x_test: take_rows(features, test_idx)?,
        y_train: train_idx.iter().map(|&i| target[i]).collect(),
        y_test: test_idx.iter().map(|&i| target[i]).collect(),
    };

    debug!(n_train, n_test, random_state, "Split dataset");
    Ok(split)
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), rows.iter().map(|&i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}
