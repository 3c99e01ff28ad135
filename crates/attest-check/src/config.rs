//! Analysis configuration.
//!
//! [`AnalysisConfig`] has sensible defaults and can be loaded from a TOML
//! file:
//!
//! ```toml
//! namespace = "deal"
//! unresolved_policy = "permissive"
//! report_unused_raises = true
//! pure_builtins = ["mylib.clamp"]
//!
//! [[effects]]
//! name = "mylib.fetch"
//! io = ["network"]
//! raises = ["TimeoutError"]
//! ```

use std::path::Path;

use attest_core::IoChannel;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How calls whose exceptions cannot be determined count against
/// `pure`, `safe`, and predicate purity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Unknown raises violate `pure`/`safe` (more false positives).
    #[default]
    Conservative,
    /// Unknown raises are ignored by `pure`/`safe` (possible false negatives).
    Permissive,
}

/// Effects of one external callable, declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectEntry {
    /// Fully qualified name; a trailing `.*` matches a whole module.
    pub name: String,
    pub io: Vec<IoChannel>,
    pub nondeterministic: bool,
    pub raises: Vec<String>,
}

/// Configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Module prefix contract decorators are imported from. Empty accepts
    /// unqualified decorator names.
    pub namespace: String,
    pub unresolved_policy: UnresolvedPolicy,
    /// Emit `UnusedRaisesDeclaration` diagnostics.
    pub report_unused_raises: bool,
    /// Additional known-effect entries; these override built-in ones.
    pub effects: Vec<EffectEntry>,
    /// Additional external callables known to have no effects.
    pub pure_builtins: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            namespace: "deal".to_string(),
            unresolved_policy: UnresolvedPolicy::Conservative,
            report_unused_raises: true,
            effects: Vec::new(),
            pure_builtins: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parses a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Returns `true` if unknown raises are ignored by purity checks.
    pub fn is_permissive(&self) -> bool {
        self.unresolved_policy == UnresolvedPolicy::Permissive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.namespace, "deal");
        assert_eq!(config.unresolved_policy, UnresolvedPolicy::Conservative);
        assert!(config.report_unused_raises);
        assert!(!config.is_permissive());
    }

    #[test]
    fn empty_toml_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn parses_full_config() {
        let text = r#"
            namespace = "contracts"
            unresolved_policy = "permissive"
            report_unused_raises = false
            pure_builtins = ["mylib.clamp"]

            [[effects]]
            name = "mylib.fetch"
            io = ["network"]
            raises = ["TimeoutError"]

            [[effects]]
            name = "mylib.clock.*"
            nondeterministic = true
        "#;
        let config = AnalysisConfig::from_toml_str(text).unwrap();
        assert_eq!(config.namespace, "contracts");
        assert!(config.is_permissive());
        assert!(!config.report_unused_raises);
        assert_eq!(config.pure_builtins, vec!["mylib.clamp".to_string()]);
        assert_eq!(config.effects.len(), 2);
        assert_eq!(config.effects[0].io, vec![IoChannel::Network]);
        assert_eq!(config.effects[0].raises, vec!["TimeoutError".to_string()]);
        assert!(config.effects[1].nondeterministic);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = AnalysisConfig::from_toml_str(r#"unresolved_policy = "lenient""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AnalysisConfig::load(Path::new("/nonexistent/attest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/attest.toml"));
    }
}
