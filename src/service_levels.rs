//! Service Level Table
//!
//! Maps each facility type to its zero-distance effort `J`, effort per foot
//! `M`, and a row of service levels `S` across the service categories.
//!
//! Lookups are deliberately asymmetric:
//! - `zero_distance_effort` / `effort_per_foot` fall back to defaults
//!   (0.4 / 0.05 unless overridden) for facility types missing from the table
//! - `service_level` / `service_level_row` fail with a schema error for a
//!   missing type; there is no sensible default service level

use crate::config::{ColumnNames, PipelineConfig};
use crate::error::{BurdenError, Result};
use crate::utils::{read_csv, require_columns, required_f64_values, string_values};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Effort constants and service levels for one facility type
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityTypeProfile {
    pub zero_distance_effort: f64,
    pub effort_per_foot: f64,
    /// Indexed like [`ServiceLevelProvider::categories`]
    pub service_levels: Vec<f64>,
}

/// Source of per-facility-type effort constants and service levels
///
/// [`ServiceLevelTable`] is the standard implementation.
pub trait ServiceLevelProvider {
    /// Service category names, in output column order
    fn categories(&self) -> &[String];

    /// Whether the table has a row for this facility type
    fn contains(&self, facility_type: &str) -> bool;

    /// `J` for a facility type, or the default when the type is unknown
    fn zero_distance_effort(&self, facility_type: &str) -> f64;

    /// `M` for a facility type, or the default when the type is unknown
    fn effort_per_foot(&self, facility_type: &str) -> f64;

    /// `S` for one facility type and category. Unknown types are an error.
    fn service_level(&self, facility_type: &str, category: &str) -> Result<f64>;

    /// Full `S` row for a facility type. Unknown types are an error.
    fn service_level_row(&self, facility_type: &str) -> Result<&[f64]>;
}

#[derive(Debug, Clone)]
pub struct ServiceLevelTable {
    categories: Vec<String>,
    category_index: FxHashMap<String, usize>,
    profiles: FxHashMap<String, FacilityTypeProfile>,
    /// Facility types in insertion order
    facility_types: Vec<String>,
    default_zero_distance_effort: f64,
    default_effort_per_foot: f64,
}

impl ServiceLevelTable {
    /// Empty table over the given categories, with the standard defaults
    pub fn new(categories: Vec<String>) -> Result<Self> {
        let mut category_index = FxHashMap::default();
        for (idx, name) in categories.iter().enumerate() {
            if category_index.insert(name.clone(), idx).is_some() {
                return Err(BurdenError::InvalidInput(format!(
                    "service category '{}' appears more than once",
                    name
                )));
            }
        }

        let defaults = PipelineConfig::default();
        Ok(Self {
            categories,
            category_index,
            profiles: FxHashMap::default(),
            facility_types: Vec::new(),
            default_zero_distance_effort: defaults.default_zero_distance_effort,
            default_effort_per_foot: defaults.default_effort_per_foot,
        })
    }

    /// Override the fallback `J` / `M` used for unknown facility types
    pub fn with_defaults(mut self, zero_distance_effort: f64, effort_per_foot: f64) -> Self {
        self.default_zero_distance_effort = zero_distance_effort;
        self.default_effort_per_foot = effort_per_foot;
        self
    }

    /// Add one facility type
    ///
    /// # Errors
    /// `InvalidInput` for a duplicate type, negative or non-finite `J`/`M`
    /// or service levels, or a row whose length differs from the
    /// category count
    pub fn insert(&mut self, facility_type: &str, profile: FacilityTypeProfile) -> Result<()> {
        if self.profiles.contains_key(facility_type) {
            return Err(BurdenError::InvalidInput(format!(
                "facility type '{}' appears more than once in the service level table",
                facility_type
            )));
        }
        for (name, value) in [
            ("zero distance effort", profile.zero_distance_effort),
            ("effort per foot", profile.effort_per_foot),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BurdenError::InvalidInput(format!(
                    "facility type '{}': {} must be finite and >= 0, got {}",
                    facility_type, name, value
                )));
            }
        }
        if profile.service_levels.len() != self.categories.len() {
            return Err(BurdenError::InvalidInput(format!(
                "facility type '{}': {} service levels for {} categories",
                facility_type,
                profile.service_levels.len(),
                self.categories.len()
            )));
        }
        if let Some(bad) = profile
            .service_levels
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0)
        {
            return Err(BurdenError::InvalidInput(format!(
                "facility type '{}': service level {} must be finite and >= 0",
                facility_type, bad
            )));
        }

        self.facility_types.push(facility_type.to_string());
        self.profiles.insert(facility_type.to_string(), profile);
        Ok(())
    }

    /// Build from a table with a key column, the two effort columns, and one
    /// column per service category (all remaining columns, in table order)
    pub fn from_dataframe(df: &DataFrame, columns: &ColumnNames) -> anyhow::Result<Self> {
        let context = "service level table";
        let fixed = [
            columns.facility_type.as_str(),
            columns.zero_distance_effort.as_str(),
            columns.effort_per_foot.as_str(),
        ];
        require_columns(df, &fixed, context)?;

        let categories: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|name| !fixed.contains(&name.as_str()))
            .collect();
        if categories.is_empty() {
            anyhow::bail!("{}: no service category columns found", context);
        }

        let types = string_values(df, &columns.facility_type, context)?;
        let zero_distance = required_f64_values(df, &columns.zero_distance_effort, context)?;
        let per_foot = required_f64_values(df, &columns.effort_per_foot, context)?;
        let levels: Vec<Vec<f64>> = categories
            .iter()
            .map(|cat| required_f64_values(df, cat, context))
            .collect::<anyhow::Result<_>>()?;

        let mut table = Self::new(categories)?;
        for (row, facility_type) in types.iter().enumerate() {
            let profile = FacilityTypeProfile {
                zero_distance_effort: zero_distance[row],
                effort_per_foot: per_foot[row],
                service_levels: levels.iter().map(|col| col[row]).collect(),
            };
            table.insert(facility_type, profile)?;
        }

        tracing::info!(
            "Service levels loaded: {} facility types x {} categories",
            table.len(),
            table.categories.len()
        );
        Ok(table)
    }

    /// Load from CSV, applying the configured column names and defaults
    pub fn from_csv(path: &Path, config: &PipelineConfig) -> anyhow::Result<Self> {
        let df = read_csv(path, "service level table")?;
        let table = Self::from_dataframe(&df, &config.columns)?;
        Ok(table.with_defaults(
            config.default_zero_distance_effort,
            config.default_effort_per_foot,
        ))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn facility_types(&self) -> &[String] {
        &self.facility_types
    }

    /// Per-type effort constant with the table's fallback for unknown types.
    ///
    /// Pipeline runs check `contains` first and apply their own configured
    /// defaults, so this fallback only serves direct lookups.
    fn lookup_or_default(
        &self,
        facility_type: &str,
        pick: impl Fn(&FacilityTypeProfile) -> f64,
        default: f64,
    ) -> f64 {
        self.profiles.get(facility_type).map_or(default, pick)
    }

    fn require_profile(&self, facility_type: &str) -> Result<&FacilityTypeProfile> {
        self.profiles
            .get(facility_type)
            .ok_or_else(|| BurdenError::schema("service level table", facility_type))
    }
}

impl ServiceLevelProvider for ServiceLevelTable {
    fn categories(&self) -> &[String] {
        &self.categories
    }

    fn contains(&self, facility_type: &str) -> bool {
        self.profiles.contains_key(facility_type)
    }

    fn zero_distance_effort(&self, facility_type: &str) -> f64 {
        self.lookup_or_default(
            facility_type,
            |p| p.zero_distance_effort,
            self.default_zero_distance_effort,
        )
    }

    fn effort_per_foot(&self, facility_type: &str) -> f64 {
        self.lookup_or_default(
            facility_type,
            |p| p.effort_per_foot,
            self.default_effort_per_foot,
        )
    }

    fn service_level(&self, facility_type: &str, category: &str) -> Result<f64> {
        let profile = self.require_profile(facility_type)?;
        let idx = self
            .category_index
            .get(category)
            .ok_or_else(|| BurdenError::schema("service categories", category))?;
        Ok(profile.service_levels[*idx])
    }

    fn service_level_row(&self, facility_type: &str) -> Result<&[f64]> {
        Ok(&self.require_profile(facility_type)?.service_levels)
    }
}
