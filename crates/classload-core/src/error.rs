//! Error types for factory bookkeeping, registry lookups and library loading.

/// Errors surfaced by factories, the registry and loader contexts.
///
/// Idempotent ownership changes never produce an error. A panic raised by a
/// plugin constructor is not translated and unwinds through `create()`.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Factory for class '{name}' has no owning loader")]
    Orphaned { name: String },

    #[error("Factory name must not be empty")]
    EmptyName,

    #[error("Class '{name}' not registered for base '{base}'")]
    NotFound { base: String, name: String },

    #[error("Class '{name}' already provided by '{existing}', refusing '{incoming}'")]
    Conflict {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("Library not loaded: {0}")]
    LibraryNotLoaded(String),

    #[error("Failed to load library '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Symbol '{symbol}' not found in '{path}'")]
    SymbolNotFound { path: String, symbol: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FactoryError {
    /// Whether the error is a caller contract violation rather than an
    /// environmental failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, FactoryError::Orphaned { .. } | FactoryError::EmptyName)
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, FactoryError>;
