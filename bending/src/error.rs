//! Error types for the bending core.
//!
//! The per-frame pipeline never fails: degenerate volumes are skipped and unknown
//! handles are ignored. Errors only surface at the configuration boundary.

use thiserror::Error;

/// Errors produced when building or reconfiguring a bending world.
#[derive(Debug, Error)]
pub enum BendingError {
    /// A settings value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Settings JSON could not be parsed.
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BendingError>;
