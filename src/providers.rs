//! Population groups and facilities, and the provider traits the pipeline
//! reads them through
//!
//! Order matters: row `n` of every population-indexed matrix is
//! `groups()[n]`, column `l` of every facility-indexed matrix is
//! `facilities()[l]`.

use crate::distance::GeoPoint;
use crate::error::{BurdenError, Result, Stage};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationGroup {
    pub key: String,
    pub centroid: GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub key: String,
    pub location: GeoPoint,
    pub facility_type: String,
}

pub trait PopulationProvider {
    fn groups(&self) -> &[PopulationGroup];

    /// Ability scores for `column`, aligned with `groups()`
    ///
    /// `None` marks a group with no value in that column. A column the
    /// provider does not know at all is a `Schema` error.
    fn ability_scores(&self, column: &str) -> Result<Vec<Option<f64>>>;

    fn len(&self) -> usize {
        self.groups().len()
    }

    fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }

    fn keys(&self) -> Vec<String> {
        self.groups().iter().map(|g| g.key.clone()).collect()
    }

    fn centroids(&self) -> Vec<GeoPoint> {
        self.groups().iter().map(|g| g.centroid).collect()
    }
}

pub trait FacilityProvider {
    fn facilities(&self) -> &[Facility];

    fn len(&self) -> usize {
        self.facilities().len()
    }

    fn is_empty(&self) -> bool {
        self.facilities().is_empty()
    }

    fn locations(&self) -> Vec<GeoPoint> {
        self.facilities().iter().map(|f| f.location).collect()
    }
}

fn ensure_unique_keys<'k>(keys: impl Iterator<Item = &'k str>, context: &str) -> Result<()> {
    let mut seen = FxHashSet::default();
    for key in keys {
        if !seen.insert(key) {
            return Err(BurdenError::InvalidInput(format!(
                "{}: duplicate key '{}'",
                context, key
            )));
        }
    }
    Ok(())
}

/// In-memory population layer with ability columns merged onto it
#[derive(Debug, Clone, Default)]
pub struct PopulationLayer {
    groups: Vec<PopulationGroup>,
    key_index: FxHashMap<String, usize>,
    /// Column name → values aligned with `groups`
    abilities: FxHashMap<String, Vec<Option<f64>>>,
}

impl PopulationLayer {
    pub fn new(groups: Vec<PopulationGroup>) -> Result<Self> {
        ensure_unique_keys(groups.iter().map(|g| g.key.as_str()), "population layer")?;
        let key_index = groups
            .iter()
            .enumerate()
            .map(|(idx, g)| (g.key.clone(), idx))
            .collect();
        Ok(Self {
            groups,
            key_index,
            abilities: FxHashMap::default(),
        })
    }

    /// Attach an ability column already in `groups()` order
    pub fn set_ability_column(&mut self, column: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.groups.len() {
            return Err(BurdenError::mismatch(
                Stage::SocialBurden,
                (self.groups.len(), 1),
                (values.len(), 1),
            ));
        }
        self.abilities
            .insert(column.to_string(), values.into_iter().map(Some).collect());
        Ok(())
    }

    /// Left-join an ability column by key
    ///
    /// Groups without a matching row get no value; rows whose key is not a
    /// known group are ignored. Returns the number of groups left without a
    /// usable value (unmatched or NaN).
    pub fn merge_ability_column(
        &mut self,
        column: &str,
        keys: &[String],
        values: &[Option<f64>],
    ) -> Result<usize> {
        if keys.len() != values.len() {
            return Err(BurdenError::InvalidInput(format!(
                "ability column '{}': {} keys for {} values",
                column,
                keys.len(),
                values.len()
            )));
        }
        ensure_unique_keys(keys.iter().map(String::as_str), "ability table")?;

        let mut merged = vec![None; self.groups.len()];
        for (key, value) in keys.iter().zip(values) {
            if let Some(&idx) = self.key_index.get(key) {
                merged[idx] = *value;
            }
        }
        let unmatched = merged.iter().filter(|v| v.map_or(true, f64::is_nan)).count();
        self.abilities.insert(column.to_string(), merged);
        Ok(unmatched)
    }

    pub fn ability_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.abilities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl PopulationProvider for PopulationLayer {
    fn groups(&self) -> &[PopulationGroup] {
        &self.groups
    }

    fn ability_scores(&self, column: &str) -> Result<Vec<Option<f64>>> {
        self.abilities
            .get(column)
            .cloned()
            .ok_or_else(|| BurdenError::schema("ability scores", column))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FacilityLayer {
    facilities: Vec<Facility>,
}

impl FacilityLayer {
    pub fn new(facilities: Vec<Facility>) -> Result<Self> {
        ensure_unique_keys(facilities.iter().map(|f| f.key.as_str()), "facility layer")?;
        Ok(Self { facilities })
    }

    /// Distinct facility types, in first-seen order
    pub fn facility_types(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.facilities
            .iter()
            .map(|f| f.facility_type.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }
}

impl FacilityProvider for FacilityLayer {
    fn facilities(&self) -> &[Facility] {
        &self.facilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(key: &str, lon: f64, lat: f64) -> PopulationGroup {
        PopulationGroup {
            key: key.to_string(),
            centroid: GeoPoint::new(lon, lat),
        }
    }

    #[test]
    fn test_duplicate_population_keys_rejected() {
        let result = PopulationLayer::new(vec![group("g1", 0.0, 0.0), group("g1", 1.0, 1.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_is_left_join() {
        let mut layer =
            PopulationLayer::new(vec![group("g1", 0.0, 0.0), group("g2", 0.0, 1.0)]).unwrap();

        let keys = vec!["g2".to_string(), "g9".to_string()];
        let unmatched = layer
            .merge_ability_column("income", &keys, &[Some(3.0), Some(7.0)])
            .unwrap();

        assert_eq!(unmatched, 1);
        assert_eq!(layer.ability_scores("income").unwrap(), vec![None, Some(3.0)]);

        let keys = vec!["g1".to_string(), "g2".to_string()];
        let unmatched = layer
            .merge_ability_column("transit", &keys, &[Some(f64::NAN), Some(2.0)])
            .unwrap();
        assert_eq!(unmatched, 1);
    }

    #[test]
    fn test_unknown_ability_column_is_schema_error() {
        let layer = PopulationLayer::new(vec![group("g1", 0.0, 0.0)]).unwrap();
        let err = layer.ability_scores("HHINC").unwrap_err();
        assert!(matches!(err, BurdenError::Schema { ref key, .. } if key == "HHINC"));
    }

    #[test]
    fn test_set_ability_column_length_checked() {
        let mut layer = PopulationLayer::new(vec![group("g1", 0.0, 0.0)]).unwrap();
        let err = layer.set_ability_column("a", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, BurdenError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_facility_types_first_seen_order() {
        let fac = |key: &str, t: &str| Facility {
            key: key.to_string(),
            location: GeoPoint::new(0.0, 0.0),
            facility_type: t.to_string(),
        };
        let layer = FacilityLayer::new(vec![
            fac("f1", "Library"),
            fac("f2", "Clinic"),
            fac("f3", "Library"),
        ])
        .unwrap();

        assert_eq!(layer.facility_types(), vec!["Library", "Clinic"]);
        assert_eq!(layer.len(), 3);
    }
}
