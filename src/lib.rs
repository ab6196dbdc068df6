//! Social Burden Calculator
//!
//! Measures how much effort each population group must spend, relative to its
//! ability, to reach each category of social infrastructure service.
//!
//! Pipeline (one instance per run, each stage cached once computed):
//! - `D`: great-circle distance, population centroids × facilities (`distance`)
//! - `I = J + D · M`: pairwise effort (`effort`)
//! - `G = 1 / I`: service accessibility
//! - `E = 1 / (G · S)`: effort per service category
//! - `B = E / A`: social burden per population group and category
//!
//! Module layout:
//! - `service_levels`: facility type → effort constants and service levels
//! - `providers`: population and facility collaborators
//! - `pipeline`: the staged state machine
//! - `result`: labeled output table and persistence
//! - `data`: CSV loaders with Polars

pub mod config;
pub mod data;
pub mod distance;
pub mod effort;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod pipeline;
pub mod providers;
pub mod result;
pub mod service_levels;
pub mod utils;

// Re-export commonly used types
pub use config::{ColumnNames, OutputFormat, OutputOptions, PipelineConfig};
pub use data::{BurdenInputs, InputPaths};
pub use distance::{distance_matrix, haversine_distance, GeoPoint};
pub use effort::{EffortMatrix, InaccessibilityCause, InaccessibleCell};
pub use error::{BurdenError, Result, Stage};
pub use matrix::Matrix;
pub use pipeline::{EffortPipeline, PipelineBuilder};
pub use providers::{
    Facility, FacilityLayer, FacilityProvider, PopulationGroup, PopulationLayer,
    PopulationProvider,
};
pub use result::BurdenTable;
pub use service_levels::{FacilityTypeProfile, ServiceLevelProvider, ServiceLevelTable};
