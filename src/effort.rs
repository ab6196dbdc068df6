//! Effort stages: I → G → E → B
//!
//! Each stage is a pure function of the previous stage's matrix. Caching and
//! ordering live in [`crate::pipeline::EffortPipeline`].
//!
//! ```text
//! I[n,l] = J[l] + D[n,l] · M[l]              pairwise effort
//! G[n,l] = 1 / I[n,l]   (0 when I[n,l] = 0)  service accessibility
//! W[n,m] = Σ_l G[n,l] · S[l,m]               weighted service availability
//! E[n,m] = 1 / W[n,m]   (1e6 when W[n,m] = 0)
//! B[n,m] = E[n,m] / A[n]                     social burden
//! ```

use crate::config::PipelineConfig;
use crate::error::{BurdenError, Result, Stage};
use crate::matrix::{product, Matrix};
use crate::providers::Facility;
use crate::service_levels::ServiceLevelProvider;
use rustc_hash::FxHashSet;

/// Why a cell of `W` is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InaccessibilityCause {
    /// No facility type offers this category (`S` column is all zero)
    NoServiceOffered,
    /// Facilities offer it, but none is reachable (`G` is zero wherever `S` is not)
    NoAccessibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InaccessibleCell {
    pub row: usize,
    pub category: usize,
    pub cause: InaccessibilityCause,
}

/// `E` plus the cells that were pinned to the inaccessible effort value
#[derive(Debug, Clone, PartialEq)]
pub struct EffortMatrix {
    pub values: Matrix,
    pub inaccessible: Vec<InaccessibleCell>,
}

/// Per-facility `J` and `M`, keyed by each facility's type
///
/// Types missing from `levels` take the run's configured defaults; each such
/// type is logged once.
pub fn effort_constants(
    facilities: &[Facility],
    levels: &dyn ServiceLevelProvider,
    config: &PipelineConfig,
) -> (Vec<f64>, Vec<f64>) {
    let mut defaulted = FxHashSet::default();
    let mut zero_distance = Vec::with_capacity(facilities.len());
    let mut per_foot = Vec::with_capacity(facilities.len());

    for facility in facilities {
        let ft = facility.facility_type.as_str();
        if levels.contains(ft) {
            zero_distance.push(levels.zero_distance_effort(ft));
            per_foot.push(levels.effort_per_foot(ft));
            continue;
        }
        if defaulted.insert(ft) {
            tracing::warn!(
                "Facility type '{}' not in service level table; using default effort constants",
                ft
            );
        }
        zero_distance.push(config.default_zero_distance_effort);
        per_foot.push(config.default_effort_per_foot);
    }

    (zero_distance, per_foot)
}

/// Stage 1: `I = J + D · M`, broadcasting `J` and `M` across rows
pub fn pairwise_effort(distance: &Matrix, zero_distance: &[f64], per_foot: &[f64]) -> Result<Matrix> {
    let l = distance.ncols();
    // D must have one column per facility
    for constants in [zero_distance, per_foot] {
        if constants.len() != l {
            return Err(BurdenError::mismatch(
                Stage::PairwiseEffort,
                (distance.nrows(), constants.len()),
                distance.shape(),
            ));
        }
    }

    Ok(Matrix::from_fn(distance.nrows(), l, |row, col| {
        zero_distance[col] + distance[(row, col)] * per_foot[col]
    }))
}

/// Stage 2: `G = 1 / I`, with zero effort mapped to zero accessibility
pub fn service_accessibility(effort: &Matrix) -> Matrix {
    effort.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 })
}

/// `S` (`L × M`): row `l` is the service-level row of facility `l`'s type
///
/// # Errors
/// `Schema` if a facility's type has no service-level row.
pub fn service_matrix(facilities: &[Facility], levels: &dyn ServiceLevelProvider) -> Result<Matrix> {
    let m = levels.categories().len();
    let mut data = Vec::with_capacity(facilities.len() * m);
    for facility in facilities {
        let row = levels.service_level_row(&facility.facility_type).map_err(|_| {
            BurdenError::schema(
                format!("service level row for facility '{}'", facility.key),
                facility.facility_type.as_str(),
            )
        })?;
        if row.len() != m {
            return Err(BurdenError::mismatch(
                Stage::EffortMatrix,
                (facilities.len(), m),
                (facilities.len(), row.len()),
            ));
        }
        data.extend_from_slice(row);
    }
    Ok(Matrix::from_row_slice(facilities.len(), m, &data))
}

/// Stage 3: `E = 1 / (G · S)`
///
/// Cells where `G · S` is zero get `inaccessible_effort`, and are reported in
/// [`EffortMatrix::inaccessible`] with their cause. A positive `W` so small
/// that `1 / W` overflows is treated the same way.
pub fn effort_matrix(
    accessibility: &Matrix,
    service: &Matrix,
    inaccessible_effort: f64,
    parallel: bool,
) -> Result<EffortMatrix> {
    let weighted = product(accessibility, service, Stage::EffortMatrix, parallel)?;

    let offered: Vec<bool> = service
        .column_iter()
        .map(|column| column.iter().any(|&s| s > 0.0))
        .collect();

    let mut inaccessible = Vec::new();
    let mut values = weighted.clone();
    for row in 0..weighted.nrows() {
        for category in 0..weighted.ncols() {
            let w = weighted[(row, category)];
            let e = if w > 0.0 { 1.0 / w } else { f64::INFINITY };
            if e.is_finite() {
                values[(row, category)] = e;
                continue;
            }
            let cause = if offered[category] {
                InaccessibilityCause::NoAccessibility
            } else {
                InaccessibilityCause::NoServiceOffered
            };
            inaccessible.push(InaccessibleCell { row, category, cause });
            values[(row, category)] = inaccessible_effort;
        }
    }

    if !inaccessible.is_empty() {
        tracing::warn!(
            "{} of {} effort cells have no weighted service availability; set to {}",
            inaccessible.len(),
            values.len(),
            inaccessible_effort
        );
    }

    Ok(EffortMatrix {
        values,
        inaccessible,
    })
}

/// Stage 4: `B = E / A`, dividing row `n` by group `n`'s ability
///
/// # Errors
/// - `DimensionMismatch` when `abilities`/`keys` do not match `E`'s rows
/// - `Schema` for a group with no ability value (null or NaN)
/// - `DivisionByZero` for a zero ability
/// - `InvalidInput` for an infinite ability
pub fn social_burden(
    effort: &Matrix,
    abilities: &[Option<f64>],
    keys: &[String],
    column: &str,
) -> Result<Matrix> {
    let n = effort.nrows();
    if abilities.len() != n || keys.len() != n {
        return Err(BurdenError::mismatch(
            Stage::SocialBurden,
            (n, effort.ncols()),
            (abilities.len().min(keys.len()), effort.ncols()),
        ));
    }

    let mut scores = Vec::with_capacity(n);
    let mut negative = 0usize;
    for (index, (ability, key)) in abilities.iter().zip(keys).enumerate() {
        let a = ability.filter(|a| !a.is_nan()).ok_or_else(|| {
            BurdenError::schema(format!("ability column '{}'", column), key.as_str())
        })?;
        if a == 0.0 {
            return Err(BurdenError::DivisionByZero {
                key: key.clone(),
                index,
                column: column.to_string(),
            });
        }
        if a.is_infinite() {
            return Err(BurdenError::InvalidInput(format!(
                "ability column '{}': infinite score {} for population group '{}'",
                column, a, key
            )));
        }
        if a < 0.0 {
            negative += 1;
        }
        scores.push(a);
    }
    if negative > 0 {
        tracing::warn!(
            "Ability column '{}' has {} negative scores; burden will be negative for those groups",
            column,
            negative
        );
    }

    Ok(Matrix::from_fn(n, effort.ncols(), |row, col| {
        effort[(row, col)] / scores[row]
    }))
}
