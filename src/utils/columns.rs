//! DataFrame column helpers with validation
//!
//! Input layers arrive as Polars DataFrames read from CSV. These helpers pull
//! typed columns out of them and fail with the offending column name and the
//! available columns, so a misnamed header is obvious from the error alone.

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;

/// Read a CSV file with a header row
pub fn read_csv(path: &Path, context: &str) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("{}: Failed to create CSV reader: {:?}", context, path))?
        .finish()
        .with_context(|| format!("{}: Failed to load CSV: {:?}", context, path))
}

/// Check that every column in `columns` exists in `df`
///
/// # Errors
/// Names the first missing column and lists the available ones.
pub fn require_columns(df: &DataFrame, columns: &[&str], context: &str) -> Result<()> {
    let actual: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for &expected in columns {
        if !actual.contains(expected) {
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context,
                expected,
                actual
            ));
        }
    }

    Ok(())
}

/// Extract a column as owned strings, casting non-string keys
///
/// Null entries are rejected: keys and labels must be present on every row.
pub fn string_values(df: &DataFrame, column: &str, context: &str) -> Result<Vec<String>> {
    let casted = df
        .column(column)
        .with_context(|| format!("{}: Missing {} column", context, column))?
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' cannot be read as text", context, column))?;

    casted
        .str()?
        .into_iter()
        .enumerate()
        .map(|(idx, opt)| {
            opt.map(str::to_string)
                .ok_or_else(|| anyhow!("{}: Null value in column '{}' at row {}", context, column, idx))
        })
        .collect()
}

/// Extract a numeric column as `f64`, keeping nulls as `None`
pub fn f64_values(df: &DataFrame, column: &str, context: &str) -> Result<Vec<Option<f64>>> {
    let casted = df
        .column(column)
        .with_context(|| format!("{}: Missing {} column", context, column))?
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: Column '{}' is not numeric", context, column))?;

    Ok(casted.f64()?.into_iter().collect())
}

/// Extract a numeric column where every row must hold a value
pub fn required_f64_values(df: &DataFrame, column: &str, context: &str) -> Result<Vec<f64>> {
    f64_values(df, column, context)?
        .into_iter()
        .enumerate()
        .map(|(idx, opt)| {
            opt.ok_or_else(|| anyhow!("{}: Null value in column '{}' at row {}", context, column, idx))
        })
        .collect()
}
