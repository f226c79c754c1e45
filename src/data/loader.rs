//! CSV loading and dataset download

use crate::error::{DiamondError, Result};
use crate::export::write_atomic;
use polars::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

/// Public copy of the diamonds dataset
pub const DIAMONDS_URL: &str =
    "https://raw.githubusercontent.com/mwaskom/seaborn-data/master/diamonds.csv";

/// Load a diamonds CSV (header row, schema inferred from the first 1000 rows)
pub fn load_diamonds(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(DiamondError::DataError(format!(
            "dataset not found at {}; run `diamond-price fetch-data` or `diamond-price generate-data` first",
            path.display()
        )));
    }

    let start = Instant::now();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    info!(
        path = %path.display(),
        rows = df.height(),
        cols = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded dataset"
    );
    Ok(df)
}

/// Write a frame as CSV, replacing the target atomically
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    write_atomic(path, &buf)
}

/// Download the dataset CSV to `path`, returning the number of bytes written
pub fn download_diamonds(url: &str, path: &Path) -> Result<usize> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| DiamondError::DataError(format!("Failed to create HTTP client: {}", e)))?;

    info!(url = %url, "Downloading dataset");
    let bytes = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| DiamondError::DataError(format!("download from {} failed: {}", url, e)))?;

    let header = bytes
        .split(|b| *b == b'\n')
        .next()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    if !(header.contains("carat") && header.contains("price")) {
        return Err(DiamondError::DataError(format!(
            "{} did not return a diamonds CSV (header: '{}')",
            url,
            header.trim()
        )));
    }

    write_atomic(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Saved dataset");
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generate_diamonds;

    #[test]
    fn test_missing_file_hint() {
        let err = load_diamonds(Path::new("/nonexistent/diamonds.csv")).unwrap_err();
        assert!(err.to_string().contains("fetch-data"));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("diamonds.csv");
        let mut df = generate_diamonds(50, 9).unwrap();
        write_csv(&mut df, &path).unwrap();

        let loaded = load_diamonds(&path).unwrap();
        assert_eq!(loaded.shape(), (50, 10));
        assert_eq!(loaded.column("cut").unwrap().dtype(), &DataType::String);
    }
}
