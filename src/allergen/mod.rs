//! Deterministic allergen correlation: trigger registry, lexical matcher and
//! the fail-safe risk scorer built on top of them.

pub mod matcher;
pub mod registry;
pub mod scorer;

pub use matcher::*;
pub use registry::*;
pub use scorer::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Allergy category label must not be empty")]
    EmptyLabel,

    #[error("Duplicate allergy category key: {0}")]
    DuplicateKey(String),
}

/// Faults inside the deterministic layer. Never returned to callers: the
/// scorer converts every variant into a no-risk assessment.
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Allergen matching failed: {0}")]
    MatchEngineFault(String),
}
