//! Data Loading
//!
//! Reads the population layer, ability table, facility layer and service
//! level table from CSV using Polars. Layers are expected to carry centroid
//! columns already (geometry handling happens upstream). Validation mirrors
//! what the pipeline needs: non-empty layers, the configured columns present,
//! unique keys.

use crate::config::PipelineConfig;
use crate::distance::GeoPoint;
use crate::pipeline::EffortPipeline;
use crate::providers::{
    Facility, FacilityLayer, FacilityProvider, PopulationGroup, PopulationLayer, PopulationProvider,
};
use crate::service_levels::{ServiceLevelProvider, ServiceLevelTable};
use crate::utils::{f64_values, read_csv, require_columns, required_f64_values, string_values};
use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of the four input tables
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InputPaths {
    pub population: PathBuf,
    pub abilities: PathBuf,
    pub facilities: PathBuf,
    pub service_levels: PathBuf,
}

/// Everything a pipeline run reads
pub struct BurdenInputs {
    pub population: PopulationLayer,
    pub facilities: FacilityLayer,
    pub service_levels: ServiceLevelTable,
}

impl BurdenInputs {
    /// Load and validate all input tables
    pub fn load(paths: &InputPaths, config: &PipelineConfig) -> Result<Self> {
        tracing::info!("Loading input layers...");

        let mut population = load_population_layer(&paths.population, config)?;
        load_ability_table(&paths.abilities, &mut population, config)?;
        let facilities = load_facility_layer(&paths.facilities, config)?;
        let service_levels = ServiceLevelTable::from_csv(&paths.service_levels, config)?;

        tracing::info!("  Population groups: {}", population.len());
        tracing::info!("  Ability columns: {:?}", population.ability_columns());
        tracing::info!("  Facilities: {}", facilities.len());
        tracing::info!("  Facility types in table: {}", service_levels.len());

        let unlisted: Vec<&str> = facilities
            .facility_types()
            .into_iter()
            .filter(|t| !service_levels.contains(t))
            .collect();
        if !unlisted.is_empty() {
            tracing::warn!(
                "Facility types missing from the service level table: {:?}",
                unlisted
            );
        }

        Ok(Self {
            population,
            facilities,
            service_levels,
        })
    }

    /// Fresh pipeline over these inputs
    pub fn pipeline(&self, config: PipelineConfig) -> crate::error::Result<EffortPipeline<'_>> {
        EffortPipeline::new(&self.population, &self.facilities, &self.service_levels, config)
    }
}

fn ensure_non_empty(df: &DataFrame, context: &str, path: &Path) -> Result<()> {
    if df.height() == 0 {
        anyhow::bail!("{}: {:?} has no rows", context, path);
    }
    Ok(())
}

/// Population layer: key plus centroid longitude/latitude
pub fn load_population_layer(path: &Path, config: &PipelineConfig) -> Result<PopulationLayer> {
    let context = "population layer";
    let cols = &config.columns;
    let df = read_csv(path, context)?;
    ensure_non_empty(&df, context, path)?;
    require_columns(
        &df,
        &[
            cols.population_key.as_str(),
            cols.population_longitude.as_str(),
            cols.population_latitude.as_str(),
        ],
        context,
    )?;

    let keys = string_values(&df, &cols.population_key, context)?;
    let lons = required_f64_values(&df, &cols.population_longitude, context)?;
    let lats = required_f64_values(&df, &cols.population_latitude, context)?;

    let groups = keys
        .into_iter()
        .zip(lons.into_iter().zip(lats))
        .map(|(key, (lon, lat))| PopulationGroup {
            key,
            centroid: GeoPoint::new(lon, lat),
        })
        .collect();

    let layer = PopulationLayer::new(groups).with_context(|| format!("{}: {:?}", context, path))?;
    tracing::info!("Population layer loaded with {} groups", layer.len());
    Ok(layer)
}

/// Merge every numeric column of the ability table onto `layer` by key
///
/// Non-numeric columns are skipped. Groups missing from the ability table
/// keep no value and fail later if their column is used.
pub fn load_ability_table(
    path: &Path,
    layer: &mut PopulationLayer,
    config: &PipelineConfig,
) -> Result<()> {
    let context = "ability table";
    let key_col = config.columns.population_key.as_str();
    let df = read_csv(path, context)?;
    require_columns(&df, &[key_col], context)?;

    let keys = string_values(&df, key_col, context)?;
    let numeric: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| c.name().as_str() != key_col && c.dtype().is_primitive_numeric())
        .map(|c| c.name().to_string())
        .collect();
    if numeric.is_empty() {
        anyhow::bail!("{}: {:?} has no numeric ability columns", context, path);
    }

    for column in &numeric {
        let values = f64_values(&df, column, context)?;
        let unmatched = layer
            .merge_ability_column(column, &keys, &values)
            .with_context(|| format!("{}: merging column '{}'", context, column))?;
        if unmatched > 0 {
            tracing::warn!(
                "Ability column '{}': {} population groups have no value",
                column,
                unmatched
            );
        }
    }

    tracing::info!("Ability table loaded with {} rows, {} columns", keys.len(), numeric.len());
    Ok(())
}

/// Facility layer: key, location longitude/latitude, facility type
pub fn load_facility_layer(path: &Path, config: &PipelineConfig) -> Result<FacilityLayer> {
    let context = "facility layer";
    let cols = &config.columns;
    let df = read_csv(path, context)?;
    ensure_non_empty(&df, context, path)?;
    require_columns(
        &df,
        &[
            cols.facility_key.as_str(),
            cols.facility_longitude.as_str(),
            cols.facility_latitude.as_str(),
            cols.facility_type.as_str(),
        ],
        context,
    )?;

    let keys = string_values(&df, &cols.facility_key, context)?;
    let lons = required_f64_values(&df, &cols.facility_longitude, context)?;
    let lats = required_f64_values(&df, &cols.facility_latitude, context)?;
    let types = string_values(&df, &cols.facility_type, context)?;

    let facilities = keys
        .into_iter()
        .zip(types)
        .zip(lons.into_iter().zip(lats))
        .map(|((key, facility_type), (lon, lat))| Facility {
            key,
            location: GeoPoint::new(lon, lat),
            facility_type,
        })
        .collect();

    let layer = FacilityLayer::new(facilities).with_context(|| format!("{}: {:?}", context, path))?;
    tracing::info!("Facility layer loaded with {} facilities", layer.len());
    Ok(layer)
}
