//! Diagnostic reporter: reshapes analysis output for consumers.
//!
//! - [`LintMessage`] for a host linting plugin.
//! - [`ContractMetadata`] for a type-checker plugin.
//! - [`render_text`] / [`render_json`] for the command line.
//!
//! No analysis happens here.

use std::fmt::Write as _;

use serde::Serialize;

use attest_core::{ContractKind, Diagnostic, FactSummary, Severity, UnitTable};

/// One message in the shape linting hosts expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintMessage {
    pub line: u32,
    pub col: u32,
    /// `"<CODE> <message>"`.
    pub text: String,
    pub severity: Severity,
}

impl From<&Diagnostic> for LintMessage {
    fn from(diagnostic: &Diagnostic) -> Self {
        LintMessage {
            line: diagnostic.line,
            col: diagnostic.column,
            text: format!("{} {}", diagnostic.code, diagnostic.message),
            severity: diagnostic.severity,
        }
    }
}

/// Number of predicates attached per contract kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PredicateCounts {
    pub pre: usize,
    pub post: usize,
    pub ensure: usize,
    pub reason: usize,
}

/// Contract summary of one function, for a type-checker plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractMetadata {
    pub function: String,
    pub line: u32,
    pub declared_raises: Vec<String>,
    pub pure: bool,
    pub safe: bool,
    pub markers: Vec<String>,
    pub predicates: PredicateCounts,
    /// Inferred effects, if inference completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred: Option<FactSummary>,
}

/// Metadata for every function and method with at least one contract.
pub fn contract_metadata(units: &UnitTable<'_>) -> Vec<ContractMetadata> {
    units
        .iter()
        .filter(|u| u.has_contracts() && !u.is_predicate())
        .map(|unit| {
            let mut meta = ContractMetadata {
                function: unit.name.clone(),
                line: unit.span.line,
                declared_raises: Vec::new(),
                pure: false,
                safe: false,
                markers: Vec::new(),
                predicates: PredicateCounts::default(),
                inferred: unit.fact.as_ref().map(|f| f.summary()),
            };
            for contract in &unit.contracts {
                match contract.kind {
                    ContractKind::Raises => meta
                        .declared_raises
                        .extend(contract.declared_kinds().iter().map(|d| d.kind.to_string())),
                    ContractKind::Has => meta
                        .markers
                        .extend(contract.markers().iter().map(|m| m.0.clone())),
                    ContractKind::Pure => meta.pure = true,
                    ContractKind::Safe => meta.safe = true,
                    ContractKind::Pre => meta.predicates.pre += 1,
                    ContractKind::Post => meta.predicates.post += 1,
                    ContractKind::Ensure => meta.predicates.ensure += 1,
                    ContractKind::Reason => meta.predicates.reason += 1,
                    ContractKind::Invariant => {}
                }
            }
            meta.declared_raises.dedup();
            meta
        })
        .collect()
}

/// One line per diagnostic: `module:line:col: severity CODE message`.
pub fn render_text(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for d in diagnostics {
        let _ = writeln!(
            out,
            "{}:{}:{}: {} {} {}",
            d.module_id, d.line, d.column, d.severity, d.code, d.message
        );
    }
    out
}

/// Pretty-printed JSON of any serializable report.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
