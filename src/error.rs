//! Engine error types.

use thiserror::Error;

/// Errors surfaced by persona loading, catalog validation, and state
/// persistence.
///
/// Per-turn math never produces these: malformed deltas degrade to
/// no-op updates and empty catalogs degrade to empty outputs. The only
/// fatal conditions are configuration problems caught once at load time
/// and I/O failures around the state files.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A phase definition carries an out-of-bounds or non-finite bias value.
    #[error("invalid phase catalog: phase '{phase}': {detail}")]
    Catalog { phase: String, detail: String },

    /// The persona definition document is not valid JSON.
    #[error("persona definition error: {0}")]
    Definition(#[from] serde_json::Error),

    /// Reading or writing a persisted state file failed.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted state file exists but cannot be interpreted.
    #[error("state file error: {0}")]
    State(String),
}
