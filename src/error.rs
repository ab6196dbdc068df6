//! Error types for the burden pipeline
//!
//! Every stage reports failures through [`BurdenError`]. Variants carry the
//! stage, key or index that triggered them so bad input rows can be traced
//! back to the source layer.

use thiserror::Error;

/// Pipeline stage names, used in error context and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Distance,
    PairwiseEffort,
    ServiceAccessibility,
    EffortMatrix,
    SocialBurden,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Distance => "distance matrix D",
            Stage::PairwiseEffort => "pairwise effort I",
            Stage::ServiceAccessibility => "service accessibility G",
            Stage::EffortMatrix => "effort matrix E",
            Stage::SocialBurden => "social burden B",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum BurdenError {
    /// A required column or key is absent from an input collaborator
    #[error("{context}: missing '{key}'")]
    Schema { context: String, key: String },

    #[error("{stage}: expected {expected_rows}x{expected_cols} matrix, found {found_rows}x{found_cols}")]
    DimensionMismatch {
        stage: Stage,
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("{stage} cannot be computed: {missing} not available")]
    PipelineOrdering { stage: Stage, missing: &'static str },

    #[error("{what} has not been computed yet")]
    NotComputed { what: &'static str },

    #[error("zero ability score in column '{column}' for population group '{key}' (row {index})")]
    DivisionByZero {
        key: String,
        index: usize,
        column: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl BurdenError {
    pub(crate) fn schema(context: impl Into<String>, key: impl Into<String>) -> Self {
        BurdenError::Schema {
            context: context.into(),
            key: key.into(),
        }
    }

    pub(crate) fn mismatch(stage: Stage, expected: (usize, usize), found: (usize, usize)) -> Self {
        BurdenError::DimensionMismatch {
            stage,
            expected_rows: expected.0,
            expected_cols: expected.1,
            found_rows: found.0,
            found_cols: found.1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BurdenError>;
