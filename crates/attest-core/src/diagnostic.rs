//! Diagnostic records produced by contract extraction and checking.
//!
//! A [`Diagnostic`] is created once and handed to the reporter; the analysis
//! core never retains it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Machine-readable diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// A contract expression could not be parsed; the contract is dropped.
    MalformedContract,
    /// A raised kind is not covered by the `raises` declaration.
    UndeclaredException,
    /// A declared kind is never raised.
    UnusedRaisesDeclaration,
    /// Inferred effects contradict `pure`, `safe`, or `has`.
    ContractViolationStatic,
    /// A contract predicate is not side-effect free.
    ImpureContractExpression,
}

impl DiagnosticCode {
    /// Short code shown by linters.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::MalformedContract => "ATT001",
            DiagnosticCode::UndeclaredException => "ATT011",
            DiagnosticCode::UnusedRaisesDeclaration => "ATT012",
            DiagnosticCode::ContractViolationStatic => "ATT021",
            DiagnosticCode::ImpureContractExpression => "ATT031",
        }
    }

    /// Severity every diagnostic with this code carries.
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticCode::UnusedRaisesDeclaration => Severity::Info,
            DiagnosticCode::MalformedContract => Severity::Warning,
            DiagnosticCode::UndeclaredException
            | DiagnosticCode::ContractViolationStatic
            | DiagnosticCode::ImpureContractExpression => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// One diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub module_id: String,
    /// Qualified name of the function or class the diagnostic belongs to.
    pub function: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
}

impl Diagnostic {
    /// Builds a diagnostic with the code's default severity.
    pub fn new(
        code: DiagnosticCode,
        message: impl Into<String>,
        module_id: &str,
        function: &str,
        span: Span,
    ) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            module_id: module_id.to_string(),
            function: function.to_string(),
            line: span.line,
            column: span.column,
            severity: code.severity(),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }
}

/// Orders diagnostics by ascending location, then by code, so output is
/// deterministic.
pub fn sort_by_location(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        a.span()
            .cmp(&b.span())
            .then(a.code.cmp(&b.code))
            .then_with(|| a.message.cmp(&b.message))
    });
}
