//! Declared feature schema for diamond rows
//!
//! The schema is the contract between training data, the fitted pipeline and
//! every inference surface. It is checked when the preprocessing plan is built
//! (column set and dtypes), when it is fitted (vocabularies) and when records
//! arrive from the form or the JSON API (value kinds and numeric ranges).

use super::ColumnType;
use crate::error::{DiamondError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the regression target column in training data
pub const TARGET_COLUMN: &str = "price";

pub const CUT_VALUES: [&str; 5] = ["Fair", "Good", "Very Good", "Premium", "Ideal"];
pub const COLOR_VALUES: [&str; 7] = ["D", "E", "F", "G", "H", "I", "J"];
pub const CLARITY_VALUES: [&str; 8] = ["I1", "SI2", "SI1", "VS2", "VS1", "VVS2", "VVS1", "IF"];

/// Kind of a declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Numeric field with an inclusive range enforced at inference
    Numeric { min: f64, max: f64 },
    /// Categorical field with a closed vocabulary enforced at fit
    Categorical { vocabulary: Vec<String> },
}

impl FieldKind {
    pub fn column_type(&self) -> ColumnType {
        match self {
            FieldKind::Numeric { .. } => ColumnType::Numeric,
            FieldKind::Categorical { .. } => ColumnType::Categorical,
        }
    }
}

/// A single declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn numeric(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Numeric { min, max },
        }
    }

    pub fn categorical(name: &str, vocabulary: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Categorical {
                vocabulary: vocabulary.iter().map(|v| v.to_string()).collect(),
            },
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.kind.column_type()
    }

    /// Whether a categorical value belongs to the declared vocabulary.
    /// Always true for numeric fields.
    pub fn in_vocabulary(&self, value: &str) -> bool {
        match &self.kind {
            FieldKind::Categorical { vocabulary } => vocabulary.iter().any(|v| v == value),
            FieldKind::Numeric { .. } => true,
        }
    }

    /// Check a single inbound value against the field's kind and range
    pub fn check_value(&self, value: &FieldValue) -> Result<()> {
        match (&self.kind, value) {
            (FieldKind::Numeric { min, max }, FieldValue::Number(v)) => {
                if !v.is_finite() {
                    return Err(DiamondError::ValidationError(format!(
                        "'{}' must be a finite number",
                        self.name
                    )));
                }
                if *v < *min || *v > *max {
                    return Err(DiamondError::ValidationError(format!(
                        "'{}' = {} is outside [{}, {}]",
                        self.name, v, min, max
                    )));
                }
                Ok(())
            }
            (FieldKind::Categorical { .. }, FieldValue::Text(_)) => Ok(()),
            (kind, other) => Err(DiamondError::SchemaMismatch(format!(
                "'{}' expects a {} value, got {}",
                self.name,
                kind.column_type(),
                other.kind_name()
            ))),
        }
    }
}

/// Ordered list of declared fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(DiamondError::ValidationError(
                "feature schema must declare at least one field".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DiamondError::ValidationError(format!(
                    "duplicate field '{}' in feature schema",
                    field.name
                )));
            }
            if field.name == TARGET_COLUMN {
                return Err(DiamondError::ValidationError(format!(
                    "'{}' is the target and cannot be a feature",
                    TARGET_COLUMN
                )));
            }
        }
        Ok(Self { fields })
    }

    /// The nine-field diamond schema with the form's ranges
    pub fn diamonds() -> Self {
        Self {
            fields: vec![
                FieldSpec::numeric("carat", 0.0, 5.0),
                FieldSpec::categorical("cut", &CUT_VALUES),
                FieldSpec::categorical("color", &COLOR_VALUES),
                FieldSpec::categorical("clarity", &CLARITY_VALUES),
                FieldSpec::numeric("depth", 40.0, 80.0),
                FieldSpec::numeric("table", 40.0, 80.0),
                FieldSpec::numeric("x", 0.0, 15.0),
                FieldSpec::numeric("y", 0.0, 15.0),
                FieldSpec::numeric("z", 0.0, 15.0),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn categorical_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| f.column_type() == ColumnType::Categorical)
    }

    pub fn numeric_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| f.column_type() == ColumnType::Numeric)
    }

    /// Require the given column names to equal the declared field set
    pub fn check_columns<'a, I>(&self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<&str> = columns.into_iter().collect();
        let declared: BTreeSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        let missing: Vec<&str> = declared.difference(&present).copied().collect();
        let unexpected: Vec<&str> = present.difference(&declared).copied().collect();
        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }

        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing columns [{}]", missing.join(", ")));
        }
        if !unexpected.is_empty() {
            parts.push(format!("unexpected columns [{}]", unexpected.join(", ")));
        }
        Err(DiamondError::SchemaMismatch(parts.join("; ")))
    }

    /// Check column set and per-column dtypes of a frame
    pub fn check_frame(&self, df: &DataFrame) -> Result<()> {
        self.check_columns(df.get_column_names().into_iter().map(|n| n.as_str()))?;

        for field in &self.fields {
            let dtype = df.column(&field.name)?.dtype().clone();
            // An all-null column has no usable dtype evidence either way
            if dtype == DataType::Null {
                continue;
            }
            if ColumnType::from_dtype(&dtype) != Some(field.column_type()) {
                return Err(DiamondError::SchemaMismatch(format!(
                    "column '{}' is declared {} but has dtype {}",
                    field.name,
                    field.column_type(),
                    dtype
                )));
            }
        }
        Ok(())
    }

    /// Validate inbound records and assemble them into a frame in declared order
    pub fn records_to_frame(&self, records: &[FeatureRecord]) -> Result<DataFrame> {
        if records.is_empty() {
            return Err(DiamondError::ValidationError("no rows to predict".to_string()));
        }
        for record in records {
            self.check_columns(record.keys().map(|k| k.as_str()))?;
            for field in &self.fields {
                if let Some(value) = record.get(&field.name) {
                    field.check_value(value)?;
                }
            }
        }

        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let column = match field.kind {
                FieldKind::Numeric { .. } => {
                    let values: Vec<f64> = records
                        .iter()
                        .filter_map(|r| r.get(&field.name).and_then(FieldValue::as_number))
                        .collect();
                    Column::new(field.name.as_str().into(), values)
                }
                FieldKind::Categorical { .. } => {
                    let values: Vec<&str> = records
                        .iter()
                        .filter_map(|r| r.get(&field.name).and_then(FieldValue::as_text))
                        .collect();
                    Column::new(field.name.as_str().into(), values)
                }
            };
            columns.push(column);
        }
        Ok(DataFrame::new(columns)?)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::diamonds()
    }
}

/// A single inbound field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "numeric",
            FieldValue::Text(_) => "text",
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One feature row keyed by field name
pub type FeatureRecord = BTreeMap<String, FieldValue>;

/// Typed diamond row as submitted by the form or the `predict` command.
///
/// `Default` holds the form's initial values; deserialization requires every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiamondFeatures {
    pub carat: f64,
    pub cut: String,
    pub color: String,
    pub clarity: String,
    pub depth: f64,
    pub table: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for DiamondFeatures {
    fn default() -> Self {
        Self {
            carat: 0.7,
            cut: "Premium".to_string(),
            color: "G".to_string(),
            clarity: "VS2".to_string(),
            depth: 61.5,
            table: 57.0,
            x: 5.5,
            y: 5.5,
            z: 3.4,
        }
    }
}

impl DiamondFeatures {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert("carat".into(), self.carat.into());
        record.insert("cut".into(), self.cut.as_str().into());
        record.insert("color".into(), self.color.as_str().into());
        record.insert("clarity".into(), self.clarity.as_str().into());
        record.insert("depth".into(), self.depth.into());
        record.insert("table".into(), self.table.into());
        record.insert("x".into(), self.x.into());
        record.insert("y".into(), self.y.into());
        record.insert("z".into(), self.z.into());
        record
    }

    /// Single-row frame, unvalidated
    pub fn to_frame(&self) -> Result<DataFrame> {
        let df = df!(
            "carat" => [self.carat],
            "cut" => [self.cut.as_str()],
            "color" => [self.color.as_str()],
            "clarity" => [self.clarity.as_str()],
            "depth" => [self.depth],
            "table" => [self.table],
            "x" => [self.x],
            "y" => [self.y],
            "z" => [self.z],
        )?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diamond_schema_layout() {
        let schema = FeatureSchema::diamonds();
        assert_eq!(schema.len(), 9);
        assert_eq!(schema.categorical_fields().count(), 3);
        assert_eq!(schema.numeric_fields().count(), 6);
        assert!(schema.field("price").is_none());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = FeatureSchema::new(vec![
            FieldSpec::numeric("carat", 0.0, 5.0),
            FieldSpec::numeric("carat", 0.0, 5.0),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_columns_reports_both_sides() {
        let schema = FeatureSchema::diamonds();
        let cols = ["carat", "cut", "color", "clarity", "depth", "table", "x", "y", "w"];
        let err = schema.check_columns(cols).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing columns [z]"));
        assert!(msg.contains("unexpected columns [w]"));
    }

    #[test]
    fn test_check_frame_dtype_mismatch() {
        let mut df = DiamondFeatures::default().to_frame().unwrap();
        df.replace("carat", Series::new("carat".into(), &["heavy"])).unwrap();
        let err = FeatureSchema::diamonds().check_frame(&df).unwrap_err();
        assert!(matches!(err, DiamondError::SchemaMismatch(_)));
    }

    #[test]
    fn test_check_frame_accepts_any_column_order() {
        let df = DiamondFeatures::default().to_frame().unwrap();
        let reordered = df.select(["z", "clarity", "carat", "x", "cut", "y", "table", "color", "depth"]).unwrap();
        assert!(FeatureSchema::diamonds().check_frame(&reordered).is_ok());
    }

    #[test]
    fn test_range_enforced_on_records() {
        let schema = FeatureSchema::diamonds();
        let mut record = DiamondFeatures::default().to_record();
        record.insert("carat".into(), FieldValue::Number(7.5));
        let err = schema.records_to_frame(&[record]).unwrap_err();
        assert!(matches!(err, DiamondError::ValidationError(_)));
    }

    #[test]
    fn test_kind_enforced_on_records() {
        let schema = FeatureSchema::diamonds();
        let mut record = DiamondFeatures::default().to_record();
        record.insert("cut".into(), FieldValue::Number(3.0));
        let err = schema.records_to_frame(&[record]).unwrap_err();
        assert!(matches!(err, DiamondError::SchemaMismatch(_)));
    }

    #[test]
    fn test_records_to_frame() {
        let schema = FeatureSchema::diamonds();
        let rows = vec![
            DiamondFeatures::default().to_record(),
            DiamondFeatures {
                carat: 1.2,
                cut: "Ideal".into(),
                ..Default::default()
            }
            .to_record(),
        ];
        let df = schema.records_to_frame(&rows).unwrap();
        assert_eq!(df.shape(), (2, 9));
        assert_eq!(df.get_column_names()[0].as_str(), "carat");
    }

    #[test]
    fn test_field_value_untagged_json() {
        let record: FeatureRecord =
            serde_json::from_str(r#"{"carat": 0.7, "cut": "Ideal"}"#).unwrap();
        assert_eq!(record["carat"], FieldValue::Number(0.7));
        assert_eq!(record["cut"], FieldValue::Text("Ideal".into()));
    }

    #[test]
    fn test_diamond_features_require_every_field() {
        let err = serde_json::from_str::<DiamondFeatures>(r#"{"carat": 1.0}"#).unwrap_err();
        assert!(err.to_string().contains("missing field"));

        let json = serde_json::to_string(&DiamondFeatures::default()).unwrap();
        let row: DiamondFeatures = serde_json::from_str(&json).unwrap();
        assert_eq!(row.cut, "Premium");
        assert_eq!(row.depth, 61.5);
    }
}
