//! Pipeline configuration
//!
//! Loaded from JSON; every field has a default so a partial file (or none at
//! all) is valid. Column names default to the census block group layout the
//! tool was built around (`GISJOIN` keys, `CBG_*` centroid columns).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Zero-distance effort used when a facility type is absent from the table
pub const DEFAULT_ZERO_DISTANCE_EFFORT: f64 = 0.4;

/// Effort per foot used when a facility type is absent from the table
pub const DEFAULT_EFFORT_PER_FOOT: f64 = 0.05;

/// Effort assigned to a category with zero weighted service availability
pub const INACCESSIBLE_EFFORT: f64 = 1e6;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_zero_distance_effort: f64,
    pub default_effort_per_foot: f64,
    pub inaccessible_effort: f64,
    pub earth_radius_m: f64,

    /// Matrices with more cells than this are filled with Rayon
    pub parallel_threshold: usize,

    pub columns: ColumnNames,
    pub output: OutputOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_zero_distance_effort: DEFAULT_ZERO_DISTANCE_EFFORT,
            default_effort_per_foot: DEFAULT_EFFORT_PER_FOOT,
            inaccessible_effort: INACCESSIBLE_EFFORT,
            earth_radius_m: EARTH_RADIUS_M,
            parallel_threshold: 4096,
            columns: ColumnNames::default(),
            output: OutputOptions::default(),
        }
    }
}

/// Column names in the input tables
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnNames {
    pub population_key: String,
    pub population_longitude: String,
    pub population_latitude: String,
    pub facility_key: String,
    pub facility_longitude: String,
    pub facility_latitude: String,
    pub facility_type: String,
    pub zero_distance_effort: String,
    pub effort_per_foot: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            population_key: "GISJOIN".to_string(),
            population_longitude: "CBG_longitude".to_string(),
            population_latitude: "CBG_latitude".to_string(),
            facility_key: "GISJOIN".to_string(),
            facility_longitude: "Facility_longitude".to_string(),
            facility_latitude: "Facility_latitude".to_string(),
            facility_type: "Facility Type".to_string(),
            zero_distance_effort: "Zero Distance Effort".to_string(),
            effort_per_foot: "Effort Per Foot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

/// How persisted burden tables are laid out
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Prepend the population key column; off by default so the file carries
    /// category columns only
    pub include_row_keys: bool,
    pub format: OutputFormat,
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config: {:?}", path))?;

        let config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse pipeline config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject constants that would break the effort invariants (`I >= J >= 0`)
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("default_zero_distance_effort", self.default_zero_distance_effort),
            ("default_effort_per_foot", self.default_effort_per_foot),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be finite and >= 0, got {}", name, value);
            }
        }
        if !self.inaccessible_effort.is_finite() || self.inaccessible_effort <= 0.0 {
            anyhow::bail!(
                "inaccessible_effort must be finite and > 0, got {}",
                self.inaccessible_effort
            );
        }
        if !self.earth_radius_m.is_finite() || self.earth_radius_m <= 0.0 {
            anyhow::bail!("earth_radius_m must be finite and > 0, got {}", self.earth_radius_m);
        }
        Ok(())
    }

    pub(crate) fn use_parallel(&self, cells: usize) -> bool {
        cells > self.parallel_threshold
    }
}
