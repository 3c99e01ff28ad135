//! Error types for the analysis pipeline.
//!
//! These are failures of the tool itself, not findings: contract findings are
//! always reported as [`attest_core::Diagnostic`]s. An [`AnalysisError`] aborts
//! the analysis of one module and is reported once for that module.

use std::path::PathBuf;

use attest_core::CoreError;
use thiserror::Error;

/// Internal failures that abort analysis of a single module.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A recursive call group did not reach its fixed point within the
    /// lattice-height bound. Unreachable for a well-formed lattice.
    #[error("fixed point not reached for call group [{members}] after {passes} passes (bound {bound})")]
    FixpointDiverged {
        members: String,
        passes: usize,
        bound: usize,
    },

    /// Analysis was cancelled at a pass boundary.
    #[error("analysis cancelled")]
    Cancelled,

    /// The unit arena was inconsistent.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors raised while loading an [`AnalysisConfig`](crate::config::AnalysisConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
