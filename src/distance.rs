//! Distance Engine: great-circle distances between population centroids and
//! facility locations
//!
//! Haversine on a sphere of the configured radius (mean Earth radius,
//! 6,371,000 m, by default):
//!
//! ```text
//! a = sin²(Δφ/2) + cos φ₁ · cos φ₂ · sin²(Δλ/2)
//! d = 2 · R · asin(√a)
//! ```
//!
//! Per-point radians and `cos φ` are computed once per input sequence, so the
//! `N × L` fill does only the pairwise terms. Rows are filled with Rayon above
//! the configured cell threshold; every cell is computed independently, so the
//! parallel matrix equals the sequential one bit for bit.

use crate::config::PipelineConfig;
use crate::error::{BurdenError, Result, Stage};
use crate::matrix::{fill_rows, Matrix};

/// A location in degrees (WGS84-style longitude/latitude)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Point prepared for repeated haversine evaluation
#[derive(Debug, Clone, Copy)]
struct PreparedPoint {
    lon: f64,
    lat: f64,
    cos_lat: f64,
}

impl PreparedPoint {
    fn from_degrees(point: GeoPoint) -> Self {
        let lat = point.latitude.to_radians();
        Self {
            lon: point.longitude.to_radians(),
            lat,
            cos_lat: lat.cos(),
        }
    }

    /// Central angle in radians
    #[inline]
    fn angle_to(&self, other: &PreparedPoint) -> f64 {
        let half_dlat = ((other.lat - self.lat) * 0.5).sin();
        let half_dlon = ((other.lon - self.lon) * 0.5).sin();
        let a = half_dlat * half_dlat + self.cos_lat * other.cos_lat * half_dlon * half_dlon;
        // Rounding can push `a` a hair outside [0, 1] for antipodal points
        2.0 * a.clamp(0.0, 1.0).sqrt().asin()
    }
}

/// Great-circle distance between two points, in the units of `radius`
pub fn haversine_distance(a: GeoPoint, b: GeoPoint, radius: f64) -> f64 {
    PreparedPoint::from_degrees(a).angle_to(&PreparedPoint::from_degrees(b)) * radius
}

fn prepare(points: &[GeoPoint], side: &str) -> Result<Vec<PreparedPoint>> {
    points
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            if !p.longitude.is_finite() || !p.latitude.is_finite() {
                return Err(BurdenError::InvalidInput(format!(
                    "{} location {} has non-finite coordinates ({}, {})",
                    side, idx, p.longitude, p.latitude
                )));
            }
            if p.latitude.abs() > 90.0 {
                return Err(BurdenError::InvalidInput(format!(
                    "{} location {} has latitude {} outside [-90, 90]; coordinates must be in degrees",
                    side, idx, p.latitude
                )));
            }
            Ok(PreparedPoint::from_degrees(*p))
        })
        .collect()
}

/// Dense `N × L` distance matrix in meters
///
/// Row `n` is `population[n]`, column `l` is `facilities[l]`.
pub fn distance_matrix(
    population: &[GeoPoint],
    facilities: &[GeoPoint],
    config: &PipelineConfig,
) -> Result<Matrix> {
    let pop = prepare(population, "population")?;
    let fac = prepare(facilities, "facility")?;
    let radius = config.earth_radius_m;
    let parallel = config.use_parallel(pop.len() * fac.len());

    let matrix = fill_rows(pop.len(), fac.len(), parallel, |row, out| {
        let origin = &pop[row];
        for (slot, target) in out.iter_mut().zip(&fac) {
            *slot = origin.angle_to(target) * radius;
        }
    });

    tracing::info!(
        "Computed {}: {}x{} ({})",
        Stage::Distance,
        matrix.nrows(),
        matrix.ncols(),
        if parallel { "parallel" } else { "sequential" }
    );
    Ok(matrix)
}
