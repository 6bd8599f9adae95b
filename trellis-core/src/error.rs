//! Error types for the reactive runtime.

use thiserror::Error;

use crate::reactive::ScopeId;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The scope was disposed before the operation ran.
    #[error("scope {0:?} has already been disposed")]
    ScopeDisposed(ScopeId),

    /// A chain of re-entrant writes nested deeper than the configured limit.
    ///
    /// This almost always means an effect writes to a signal it also reads,
    /// with a value that never settles.
    #[error("emission nested deeper than {limit} levels; a reactive cycle keeps re-triggering itself")]
    EmitDepthExceeded { limit: usize },

    /// The runtime configuration failed validation.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// The runtime configuration could not be parsed.
    #[error("failed to parse runtime configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
