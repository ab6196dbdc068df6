//! Utility modules for the burden pipeline
//!
//! - Column helpers: CSV reading and typed column extraction with schema checks

pub mod columns;

// Re-export commonly used helpers
pub use columns::{f64_values, read_csv, require_columns, required_f64_values, string_values};
