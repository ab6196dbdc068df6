//! Result Emitter: the labeled social burden table and its persistence
//!
//! Rows are population groups in input order, columns are service categories
//! in service-level-table order. The persisted file carries category names as
//! its header; the population key column is only written when requested.

use crate::config::{OutputFormat, OutputOptions};
use crate::error::{BurdenError, Result, Stage};
use crate::matrix::{ensure_shape, Matrix};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct BurdenTable {
    row_keys: Vec<String>,
    categories: Vec<String>,
    ability_column: String,
    values: Matrix,
}

impl BurdenTable {
    pub fn new(
        row_keys: Vec<String>,
        categories: Vec<String>,
        ability_column: &str,
        values: Matrix,
    ) -> Result<Self> {
        ensure_shape(&values, Stage::SocialBurden, (row_keys.len(), categories.len()))?;
        Ok(Self {
            row_keys,
            categories,
            ability_column: ability_column.to_string(),
            values,
        })
    }

    pub fn row_keys(&self) -> &[String] {
        &self.row_keys
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Ability column the burden was normalised by
    pub fn ability_column(&self) -> &str {
        &self.ability_column
    }

    pub fn values(&self) -> &Matrix {
        &self.values
    }

    /// Burden for one population group and category
    pub fn value(&self, key: &str, category: &str) -> Option<f64> {
        let row = self.row_keys.iter().position(|k| k == key)?;
        let col = self.categories.iter().position(|c| c == category)?;
        Some(self.values[(row, col)])
    }

    /// Polars view of the table
    ///
    /// With `key_column` set, the population keys are prepended under that
    /// name.
    pub fn to_dataframe(&self, key_column: Option<&str>) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.categories.len() + 1);
        if let Some(name) = key_column {
            columns.push(Column::new(name.into(), self.row_keys.clone()));
        }
        for (idx, category) in self.categories.iter().enumerate() {
            let values: Vec<f64> = self.values.column(idx).iter().copied().collect();
            columns.push(Column::new(category.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Write the table as CSV or Parquet
    pub fn write(&self, path: &Path, options: &OutputOptions, key_column: &str) -> Result<()> {
        let mut df = self.to_dataframe(options.include_row_keys.then_some(key_column))?;
        let mut file = File::create(path)?;

        match options.format {
            OutputFormat::Csv => {
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(&mut df)?;
            }
            OutputFormat::Parquet => {
                ParquetWriter::new(&mut file).finish(&mut df)?;
            }
        }

        tracing::info!(
            "Saved social burden results ({}x{}) to {:?}",
            df.height(),
            self.categories.len(),
            path
        );
        Ok(())
    }
}

/// Persist `table`, failing with `NotComputed` when there is nothing to write
pub fn save_results(
    table: Option<&BurdenTable>,
    path: &Path,
    options: &OutputOptions,
    key_column: &str,
) -> Result<()> {
    let table = table.ok_or(BurdenError::NotComputed {
        what: "social burden matrix",
    })?;
    table.write(path, options, key_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::read_csv;

    fn table() -> BurdenTable {
        BurdenTable::new(
            vec!["g1".to_string(), "g2".to_string()],
            vec!["General".to_string(), "Health".to_string()],
            "ability",
            Matrix::from_row_slice(2, 2, &[0.2, 1.5, 3.0, 4.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_shape_checked() {
        let result = BurdenTable::new(
            vec!["g1".to_string()],
            vec!["General".to_string()],
            "ability",
            Matrix::zeros(2, 1),
        );
        assert!(matches!(result, Err(BurdenError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_value_lookup() {
        let t = table();
        assert_eq!(t.value("g2", "General"), Some(3.0));
        assert_eq!(t.value("g3", "General"), None);
        assert_eq!(t.value("g1", "Parks"), None);
    }

    #[test]
    fn test_dataframe_columns() {
        let t = table();

        let df = t.to_dataframe(None).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["General", "Health"]);
        assert_eq!(df.height(), 2);

        let df = t.to_dataframe(Some("GISJOIN")).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["GISJOIN", "General", "Health"]);
    }

    #[test]
    fn test_save_without_table_is_not_computed() {
        let path = std::env::temp_dir().join("social_burden_never_written.csv");
        let err = save_results(None, &path, &OutputOptions::default(), "GISJOIN").unwrap_err();
        assert!(matches!(err, BurdenError::NotComputed { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_csv_round_trip_header() {
        let path = std::env::temp_dir().join(format!(
            "social_burden_result_{}.csv",
            std::process::id()
        ));
        table().write(&path, &OutputOptions::default(), "GISJOIN").unwrap();

        let df = read_csv(&path, "test").unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["General", "Health"]);
        assert_eq!(df.height(), 2);

        std::fs::remove_file(&path).ok();
    }
}
