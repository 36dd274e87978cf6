// src/error.rs

//! Error types shared by the solver, ordering, leveling and hashing layers

use thiserror::Error;

/// Errors produced by arbor operations
///
/// Every operation returns either a complete result or one of these, never
/// a partial result alongside an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The constraint system has no solution
    #[error("unsatisfiable: {explanation}")]
    Unsatisfiable { explanation: String },

    /// A requested selector or package cannot be resolved against the catalog
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Internal consistency failure in upstream graph construction
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A dependency cycle was found while ordering or leveling
    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The decoded explanation carried by an unsatisfiable result
    pub fn explanation(&self) -> Option<&str> {
        match self {
            Self::Unsatisfiable { explanation } => Some(explanation),
            _ => None,
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Self::Unsatisfiable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
