//! Data preprocessing module
//!
//! Turns a frame of diamond features into the numeric matrix the regressor
//! consumes:
//! - Declared feature schema (names, numeric ranges, categorical vocabularies)
//! - One-hot encoding for categorical columns, unknown categories ignored
//! - Identity passthrough for numeric columns (trees need no scaling)

mod encoder;
mod pipeline;
pub mod schema;

pub use encoder::OneHotEncoder;
pub use pipeline::{ColumnStep, ColumnTransformer};
pub use schema::{
    DiamondFeatures, FeatureRecord, FeatureSchema, FieldKind, FieldSpec, FieldValue,
    TARGET_COLUMN,
};

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};

/// Column data type for preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
}

impl ColumnType {
    /// Classify a polars dtype, `None` for dtypes the pipeline cannot consume
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 |
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 |
            DataType::Float32 | DataType::Float64 => Some(ColumnType::Numeric),
            DataType::String => Some(ColumnType::Categorical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Categorical => write!(f, "categorical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_from_dtype() {
        assert_eq!(ColumnType::from_dtype(&DataType::Float64), Some(ColumnType::Numeric));
        assert_eq!(ColumnType::from_dtype(&DataType::Int64), Some(ColumnType::Numeric));
        assert_eq!(ColumnType::from_dtype(&DataType::String), Some(ColumnType::Categorical));
        assert_eq!(ColumnType::from_dtype(&DataType::Boolean), None);
    }

    #[test]
    fn test_column_type_serialize() {
        let dtype = ColumnType::Numeric;
        let json = serde_json::to_string(&dtype).unwrap();
        assert_eq!(json, "\"Numeric\"");
    }
}
