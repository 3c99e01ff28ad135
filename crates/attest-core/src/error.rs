//! Core error types for attest-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of building the per-module unit arena.

use crate::id::{ClassId, UnitId};
use thiserror::Error;

/// Core errors produced by the attest-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two declarations in one module resolve to the same qualified name.
    #[error("duplicate declaration: '{name}'")]
    DuplicateUnit { name: String },

    /// A unit handle does not address an arena slot.
    #[error("unit not found: UnitId({id})", id = id.0)]
    UnitNotFound { id: UnitId },

    /// A class handle does not address an arena slot.
    #[error("class not found: ClassId({id})", id = id.0)]
    ClassNotFound { id: ClassId },
}
