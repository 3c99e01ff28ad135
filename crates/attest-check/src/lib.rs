//! Static contract and effect verification for attest.
//!
//! Pipeline, per module: [`extract`] parses contract decorators into
//! contracts and units, [`infer`] computes an effect fact for every unit,
//! [`check`] compares the two, and [`report`] shapes the diagnostics.
//! [`analyze`] drives the pipeline and runs modules in parallel.

pub mod analyze;
pub mod check;
pub mod config;
pub mod error;
pub mod extract;
pub mod infer;
pub mod report;

pub use analyze::{analyze_module, analyze_module_with_cancel, analyze_modules, ModuleReport, UnitFact};
pub use config::{AnalysisConfig, EffectEntry, UnresolvedPolicy};
pub use error::{AnalysisError, ConfigError};
