//! Effort Pipeline - lazy, cached D → I → G → E → B
//!
//! Each stage is computed at most once per pipeline instance and cached as
//! an `Option<Matrix>`. Asking for a later stage computes whatever upstream
//! stages are missing. Stages can also be seeded with precomputed matrices
//! through [`PipelineBuilder`]; a stage that is neither cached nor derivable
//! from the collaborators present fails with `PipelineOrdering`.
//!
//! Collaborators are borrowed for the pipeline's lifetime, so inputs cannot
//! change underneath a cached stage. A new run needs a new pipeline.
//!
//! Not thread-safe by contract: compute methods take `&mut self`.

use crate::config::PipelineConfig;
use crate::distance::distance_matrix;
use crate::effort::{
    effort_constants, effort_matrix, pairwise_effort, service_accessibility, service_matrix,
    social_burden, EffortMatrix, InaccessibleCell,
};
use crate::error::{BurdenError, Result, Stage};
use crate::matrix::{ensure_finite_non_negative, ensure_shape, Matrix};
use crate::providers::{FacilityProvider, PopulationProvider};
use crate::result::{save_results, BurdenTable};
use crate::service_levels::ServiceLevelProvider;
use std::path::Path;

/// Builder for [`EffortPipeline`]
///
/// Every collaborator and seed is optional; `build()` checks that whatever
/// is present agrees on `N` (population groups), `L` (facilities) and `M`
/// (service categories).
#[derive(Default)]
pub struct PipelineBuilder<'a> {
    population: Option<&'a dyn PopulationProvider>,
    facilities: Option<&'a dyn FacilityProvider>,
    service_levels: Option<&'a dyn ServiceLevelProvider>,
    config: PipelineConfig,
    distance: Option<Matrix>,
    pairwise_effort: Option<Matrix>,
    accessibility: Option<Matrix>,
    effort: Option<Matrix>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn population(mut self, population: &'a dyn PopulationProvider) -> Self {
        self.population = Some(population);
        self
    }

    pub fn facilities(mut self, facilities: &'a dyn FacilityProvider) -> Self {
        self.facilities = Some(facilities);
        self
    }

    pub fn service_levels(mut self, service_levels: &'a dyn ServiceLevelProvider) -> Self {
        self.service_levels = Some(service_levels);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed `D` (`N × L`, meters)
    pub fn distance(mut self, distance: Matrix) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Seed `I` (`N × L`)
    pub fn pairwise_effort(mut self, effort: Matrix) -> Self {
        self.pairwise_effort = Some(effort);
        self
    }

    /// Seed `G` (`N × L`)
    pub fn accessibility(mut self, accessibility: Matrix) -> Self {
        self.accessibility = Some(accessibility);
        self
    }

    /// Seed `E` (`N × M`). No inaccessibility diagnostics are available for
    /// a seeded `E`.
    pub fn effort(mut self, effort: Matrix) -> Self {
        self.effort = Some(effort);
        self
    }

    pub fn build(self) -> Result<EffortPipeline<'a>> {
        self.config
            .validate()
            .map_err(|e| BurdenError::InvalidInput(e.to_string()))?;

        let mut n = self.population.map(|p| p.len());
        let mut l = self.facilities.map(|f| f.len());
        let mut m = self.service_levels.map(|s| s.categories().len());

        let seeded_nl = [
            (Stage::Distance, &self.distance),
            (Stage::PairwiseEffort, &self.pairwise_effort),
            (Stage::ServiceAccessibility, &self.accessibility),
        ];
        for (stage, seed) in seeded_nl {
            if let Some(matrix) = seed {
                check_seed(stage, matrix, &mut n, &mut l)?;
            }
        }
        if let Some(effort) = &self.effort {
            check_seed(Stage::EffortMatrix, effort, &mut n, &mut m)?;
        }

        Ok(EffortPipeline {
            population: self.population,
            facilities: self.facilities,
            service_levels: self.service_levels,
            config: self.config,
            distance: self.distance,
            pairwise_effort: self.pairwise_effort,
            accessibility: self.accessibility,
            effort: self.effort.map(|values| EffortMatrix {
                values,
                inaccessible: Vec::new(),
            }),
            burden: None,
        })
    }
}

/// Check a seeded matrix against known dimensions, filling in unknown ones.
/// Every seeded stage holds finite, non-negative values.
fn check_seed(
    stage: Stage,
    matrix: &Matrix,
    rows: &mut Option<usize>,
    cols: &mut Option<usize>,
) -> Result<()> {
    let expected = (
        *rows.get_or_insert(matrix.nrows()),
        *cols.get_or_insert(matrix.ncols()),
    );
    ensure_shape(matrix, stage, expected)?;
    ensure_finite_non_negative(matrix, stage)
}

pub struct EffortPipeline<'a> {
    population: Option<&'a dyn PopulationProvider>,
    facilities: Option<&'a dyn FacilityProvider>,
    service_levels: Option<&'a dyn ServiceLevelProvider>,
    config: PipelineConfig,

    distance: Option<Matrix>,
    pairwise_effort: Option<Matrix>,
    accessibility: Option<Matrix>,
    effort: Option<EffortMatrix>,
    burden: Option<BurdenTable>,
}

impl<'a> EffortPipeline<'a> {
    /// Pipeline over a full set of collaborators
    pub fn new(
        population: &'a dyn PopulationProvider,
        facilities: &'a dyn FacilityProvider,
        service_levels: &'a dyn ServiceLevelProvider,
        config: PipelineConfig,
    ) -> Result<Self> {
        PipelineBuilder::new()
            .population(population)
            .facilities(facilities)
            .service_levels(service_levels)
            .config(config)
            .build()
    }

    pub fn builder() -> PipelineBuilder<'a> {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn require_population(&self, stage: Stage) -> Result<&'a dyn PopulationProvider> {
        self.population.ok_or(BurdenError::PipelineOrdering {
            stage,
            missing: "population provider",
        })
    }

    fn require_facilities(&self, stage: Stage) -> Result<&'a dyn FacilityProvider> {
        self.facilities.ok_or(BurdenError::PipelineOrdering {
            stage,
            missing: "facility provider",
        })
    }

    fn require_service_levels(&self, stage: Stage) -> Result<&'a dyn ServiceLevelProvider> {
        self.service_levels.ok_or(BurdenError::PipelineOrdering {
            stage,
            missing: "service level provider",
        })
    }

    /// `D`: great-circle distance, population centroids × facility locations
    pub fn compute_distance(&mut self) -> Result<&Matrix> {
        let distance = match self.distance.take() {
            Some(cached) => {
                tracing::debug!("Using cached {}", Stage::Distance);
                cached
            }
            None => {
                let population = self.require_population(Stage::Distance)?;
                let facilities = self.require_facilities(Stage::Distance)?;
                distance_matrix(&population.centroids(), &facilities.locations(), &self.config)?
            }
        };
        Ok(self.distance.insert(distance))
    }

    /// Stage 1, `I = J + D · M`
    pub fn compute_pairwise_effort(&mut self) -> Result<&Matrix> {
        let effort = match self.pairwise_effort.take() {
            Some(cached) => {
                tracing::debug!("Using cached {}", Stage::PairwiseEffort);
                cached
            }
            None => {
                let facilities = self.require_facilities(Stage::PairwiseEffort)?;
                let levels = self.require_service_levels(Stage::PairwiseEffort)?;
                let (zero_distance, per_foot) =
                    effort_constants(facilities.facilities(), levels, &self.config);

                let distance = self.compute_distance()?;
                let effort = pairwise_effort(distance, &zero_distance, &per_foot)?;
                tracing::info!(
                    "Computed {}: {}x{}",
                    Stage::PairwiseEffort,
                    effort.nrows(),
                    effort.ncols()
                );
                effort
            }
        };
        Ok(self.pairwise_effort.insert(effort))
    }

    /// Stage 2, `G = 1 / I` with zero effort mapped to zero
    pub fn compute_service_accessibility(&mut self) -> Result<&Matrix> {
        let accessibility = match self.accessibility.take() {
            Some(cached) => {
                tracing::debug!("Using cached {}", Stage::ServiceAccessibility);
                cached
            }
            None => {
                let accessibility = service_accessibility(self.compute_pairwise_effort()?);
                tracing::info!(
                    "Computed {}: {}x{}",
                    Stage::ServiceAccessibility,
                    accessibility.nrows(),
                    accessibility.ncols()
                );
                accessibility
            }
        };
        Ok(self.accessibility.insert(accessibility))
    }

    /// Stage 3, `E = 1 / (G · S)` with zero availability mapped to the
    /// configured inaccessible effort
    pub fn compute_effort_matrix(&mut self) -> Result<&EffortMatrix> {
        let effort = match self.effort.take() {
            Some(cached) => {
                tracing::debug!("Using cached {}", Stage::EffortMatrix);
                cached
            }
            None => {
                let facilities = self.require_facilities(Stage::EffortMatrix)?;
                let levels = self.require_service_levels(Stage::EffortMatrix)?;
                let service = service_matrix(facilities.facilities(), levels)?;

                let inaccessible_effort = self.config.inaccessible_effort;
                let parallel_threshold = self.config.parallel_threshold;
                let accessibility = self.compute_service_accessibility()?;
                // Work is N · L · M multiply-adds
                let parallel =
                    accessibility.nrows() * service.nrows() * service.ncols() > parallel_threshold;
                let effort =
                    effort_matrix(accessibility, &service, inaccessible_effort, parallel)?;
                tracing::info!(
                    "Computed {}: {}x{}",
                    Stage::EffortMatrix,
                    effort.values.nrows(),
                    effort.values.ncols()
                );
                effort
            }
        };
        Ok(self.effort.insert(effort))
    }

    /// Stage 4, `B = E / A` for the given ability column
    ///
    /// The result is cached per ability column; asking for another column
    /// recomputes only `B` from the cached `E`. A failed computation keeps
    /// the previous table.
    pub fn compute_social_burden(&mut self, ability_column: &str) -> Result<&BurdenTable> {
        let cached = self
            .burden
            .as_ref()
            .is_some_and(|b| b.ability_column() == ability_column);

        if cached {
            tracing::debug!("Using cached {} for '{}'", Stage::SocialBurden, ability_column);
        } else {
            let population = self.require_population(Stage::SocialBurden)?;
            let levels = self.require_service_levels(Stage::SocialBurden)?;
            let abilities = population.ability_scores(ability_column)?;
            let keys = population.keys();
            let categories = levels.categories().to_vec();

            let effort = &self.compute_effort_matrix()?.values;
            let values = social_burden(effort, &abilities, &keys, ability_column)?;
            tracing::info!(
                "Computed {} for '{}': {}x{}",
                Stage::SocialBurden,
                ability_column,
                values.nrows(),
                values.ncols()
            );
            self.burden = Some(BurdenTable::new(keys, categories, ability_column, values)?);
        }

        self.burden()
    }

    /// Write the last computed burden table using the configured output options
    pub fn save_results(&self, path: &Path) -> Result<()> {
        save_results(
            self.burden.as_ref(),
            path,
            &self.config.output,
            &self.config.columns.population_key,
        )
    }

    pub fn distance(&self) -> Option<&Matrix> {
        self.distance.as_ref()
    }

    pub fn pairwise_effort(&self) -> Option<&Matrix> {
        self.pairwise_effort.as_ref()
    }

    pub fn accessibility(&self) -> Option<&Matrix> {
        self.accessibility.as_ref()
    }

    pub fn effort(&self) -> Option<&EffortMatrix> {
        self.effort.as_ref()
    }

    /// Last computed burden table
    pub fn burden(&self) -> Result<&BurdenTable> {
        self.burden.as_ref().ok_or(BurdenError::NotComputed {
            what: "social burden matrix",
        })
    }

    /// Effort cells pinned to the inaccessible value, with their cause
    pub fn inaccessible_cells(&self) -> &[InaccessibleCell] {
        match &self.effort {
            Some(effort) => &effort.inaccessible,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::GeoPoint;
    use crate::effort::InaccessibilityCause;
    use crate::providers::{Facility, FacilityLayer, PopulationGroup, PopulationLayer};
    use crate::service_levels::{FacilityTypeProfile, ServiceLevelTable};
    use approx::assert_relative_eq;

    fn population(abilities: Vec<f64>) -> PopulationLayer {
        let mut layer = PopulationLayer::new(vec![
            PopulationGroup {
                key: "g1".to_string(),
                centroid: GeoPoint::new(0.0, 0.0),
            },
            PopulationGroup {
                key: "g2".to_string(),
                centroid: GeoPoint::new(0.0, 1.0),
            },
        ])
        .unwrap();
        layer.set_ability_column("ability", abilities).unwrap();
        layer
    }

    fn library(facility_type: &str) -> FacilityLayer {
        FacilityLayer::new(vec![Facility {
            key: "f1".to_string(),
            location: GeoPoint::new(0.0, 0.0),
            facility_type: facility_type.to_string(),
        }])
        .unwrap()
    }

    fn levels() -> ServiceLevelTable {
        let mut table = ServiceLevelTable::new(vec!["General".to_string()]).unwrap();
        table
            .insert(
                "Library",
                FacilityTypeProfile {
                    zero_distance_effort: 0.4,
                    effort_per_foot: 0.05,
                    service_levels: vec![1.0],
                },
            )
            .unwrap();
        table
    }

    #[test]
    fn test_two_groups_one_library() {
        let pop = population(vec![2.0, 1.0]);
        let fac = library("Library");
        let table = levels();
        let mut pipeline =
            EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        let burden = pipeline.compute_social_burden("ability").unwrap().clone();

        let d = pipeline.distance().unwrap();
        assert_eq!(d[(0, 0)], 0.0);
        assert_relative_eq!(d[(1, 0)], 111_194.93, epsilon = 0.01);

        let i = pipeline.pairwise_effort().unwrap();
        assert_relative_eq!(i[(0, 0)], 0.4);
        assert_relative_eq!(i[(1, 0)], 0.4 + 5559.7465, epsilon = 0.001);

        let g = pipeline.accessibility().unwrap();
        assert_relative_eq!(g[(0, 0)], 2.5);
        assert_relative_eq!(g[(1, 0)], 1.0 / 5560.1465, epsilon = 1e-9);

        let e = &pipeline.effort().unwrap().values;
        assert_relative_eq!(e[(0, 0)], 0.4);
        assert_relative_eq!(e[(1, 0)], 5560.1465, epsilon = 0.001);

        assert_relative_eq!(burden.value("g1", "General").unwrap(), 0.2);
        assert_relative_eq!(burden.value("g2", "General").unwrap(), 5560.1465, epsilon = 0.001);
        assert_eq!(burden.categories(), &["General".to_string()]);
        assert!(pipeline.inaccessible_cells().is_empty());
    }

    #[test]
    fn test_unknown_facility_type_defaults_then_fails_at_service_level() {
        let pop = population(vec![1.0, 1.0]);
        let fac = library("Clinic");
        let table = levels();
        let mut pipeline =
            EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        // J/M default silently
        let i = pipeline.compute_pairwise_effort().unwrap();
        assert_eq!(i[(0, 0)], 0.4);

        // S has no default
        let err = pipeline.compute_effort_matrix().unwrap_err();
        assert!(matches!(err, BurdenError::Schema { ref key, .. } if key == "Clinic"));
    }

    #[test]
    fn test_zero_ability_is_division_by_zero() {
        let pop = population(vec![1.0, 0.0]);
        let fac = library("Library");
        let table = levels();
        let mut pipeline =
            EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        let err = pipeline.compute_social_burden("ability").unwrap_err();
        assert!(matches!(err, BurdenError::DivisionByZero { index: 1, .. }));
        assert!(pipeline.burden().is_err());
    }

    #[test]
    fn test_unknown_ability_column_is_schema_error() {
        let pop = population(vec![1.0, 1.0]);
        let fac = library("Library");
        let table = levels();
        let mut pipeline =
            EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        let err = pipeline.compute_social_burden("HHINC").unwrap_err();
        assert!(matches!(err, BurdenError::Schema { .. }));
    }

    #[test]
    fn test_doubling_ability_halves_burden() {
        let fac = library("Library");
        let table = levels();

        let pop_a = population(vec![1.0, 3.0]);
        let mut a = EffortPipeline::new(&pop_a, &fac, &table, PipelineConfig::default()).unwrap();
        let burden_a = a.compute_social_burden("ability").unwrap().clone();

        let pop_b = population(vec![2.0, 6.0]);
        let mut b = EffortPipeline::new(&pop_b, &fac, &table, PipelineConfig::default()).unwrap();
        let burden_b = b.compute_social_burden("ability").unwrap();

        for key in ["g1", "g2"] {
            assert_relative_eq!(
                burden_b.value(key, "General").unwrap() * 2.0,
                burden_a.value(key, "General").unwrap(),
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_second_ability_column_reuses_effort() {
        let mut pop = population(vec![1.0, 1.0]);
        pop.set_ability_column("transit", vec![4.0, 4.0]).unwrap();
        let fac = library("Library");
        let table = levels();
        let mut pipeline =
            EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        let first = pipeline.compute_social_burden("ability").unwrap().clone();
        let effort_before = pipeline.effort().unwrap().clone();
        let second = pipeline.compute_social_burden("transit").unwrap().clone();

        assert_eq!(pipeline.effort().unwrap(), &effort_before);
        assert_eq!(second.ability_column(), "transit");
        assert_relative_eq!(
            second.value("g1", "General").unwrap() * 4.0,
            first.value("g1", "General").unwrap()
        );
    }

    #[test]
    fn test_missing_collaborator_is_ordering_error() {
        let table = levels();
        let fac = library("Library");
        let mut pipeline = EffortPipeline::builder()
            .facilities(&fac)
            .service_levels(&table)
            .build()
            .unwrap();

        let err = pipeline.compute_effort_matrix().unwrap_err();
        assert!(matches!(
            err,
            BurdenError::PipelineOrdering {
                stage: Stage::Distance,
                missing: "population provider"
            }
        ));

        let mut empty = EffortPipeline::builder().build().unwrap();
        assert!(matches!(
            empty.compute_effort_matrix(),
            Err(BurdenError::PipelineOrdering { .. })
        ));
    }

    #[test]
    fn test_seeded_accessibility_skips_distance() {
        let table = levels();
        let fac = library("Library");
        let g = Matrix::from_row_slice(2, 1, &[0.5, 0.0]);
        let mut pipeline = EffortPipeline::builder()
            .facilities(&fac)
            .service_levels(&table)
            .accessibility(g)
            .build()
            .unwrap();

        let effort = pipeline.compute_effort_matrix().unwrap();
        assert_relative_eq!(effort.values[(0, 0)], 2.0);
        assert_eq!(effort.values[(1, 0)], 1e6);
        assert_eq!(
            pipeline.inaccessible_cells()[0].cause,
            InaccessibilityCause::NoAccessibility
        );
        assert!(pipeline.distance().is_none());
    }

    #[test]
    fn test_seed_shape_mismatch_detected_at_build() {
        let pop = population(vec![1.0, 1.0]);
        let fac = library("Library");
        let result = EffortPipeline::builder()
            .population(&pop)
            .facilities(&fac)
            .distance(Matrix::zeros(3, 1))
            .build();
        assert!(matches!(
            result,
            Err(BurdenError::DimensionMismatch {
                stage: Stage::Distance,
                ..
            })
        ));

        let result = EffortPipeline::builder()
            .distance(Matrix::zeros(2, 4))
            .pairwise_effort(Matrix::zeros(2, 3))
            .build();
        assert!(matches!(
            result,
            Err(BurdenError::DimensionMismatch {
                stage: Stage::PairwiseEffort,
                ..
            })
        ));
    }

    #[test]
    fn test_save_before_compute_is_not_computed() {
        let pop = population(vec![1.0, 1.0]);
        let fac = library("Library");
        let table = levels();
        let pipeline = EffortPipeline::new(&pop, &fac, &table, PipelineConfig::default()).unwrap();

        let path = std::env::temp_dir().join("social_burden_pipeline_unsaved.csv");
        let err = pipeline.save_results(&path).unwrap_err();
        assert!(matches!(err, BurdenError::NotComputed { .. }));
    }

    #[test]
    fn test_configured_defaults_apply_to_unknown_type() {
        let pop = population(vec![1.0, 1.0]);
        let fac = library("Clinic");
        let table = levels();
        let config = PipelineConfig {
            default_zero_distance_effort: 1.0,
            default_effort_per_foot: 0.1,
            ..PipelineConfig::default()
        };
        let mut pipeline = EffortPipeline::new(&pop, &fac, &table, config).unwrap();

        let i = pipeline.compute_pairwise_effort().unwrap();
        // g1 sits on the clinic
        assert_eq!(i[(0, 0)], 1.0);
        assert_relative_eq!(i[(1, 0)], 1.0 + 11_119.493, epsilon = 0.001);
    }

    #[test]
    fn test_seeded_values_must_be_finite_and_non_negative() {
        let negative_distance = EffortPipeline::builder()
            .distance(Matrix::from_row_slice(1, 2, &[10.0, -5.0]))
            .build();
        assert!(matches!(negative_distance, Err(BurdenError::InvalidInput(_))));

        let nan_accessibility = EffortPipeline::builder()
            .accessibility(Matrix::from_row_slice(1, 1, &[f64::NAN]))
            .build();
        assert!(matches!(nan_accessibility, Err(BurdenError::InvalidInput(_))));

        let infinite_effort = EffortPipeline::builder()
            .effort(Matrix::from_row_slice(1, 1, &[f64::INFINITY]))
            .build();
        assert!(matches!(infinite_effort, Err(BurdenError::InvalidInput(_))));

        let valid = EffortPipeline::builder()
            .pairwise_effort(Matrix::from_row_slice(1, 2, &[0.4, 12.0]))
            .build();
        assert!(valid.is_ok());
    }
}
