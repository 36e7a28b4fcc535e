//! Engine-level error type.

use crate::config::ConfigLoadError;

/// Errors surfaced while building the engine.
///
/// Read and write failures are reported per operation, through
/// `AggregateResult` and `MutationOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
