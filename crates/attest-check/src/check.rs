//! Consistency checks between declared contracts and inferred facts.
//!
//! Checks are independent per unit and read only the facts attached to the
//! unit table. Diagnostics come out grouped by owning declaration in source
//! order, each group sorted by location.

use attest_core::diagnostic::sort_by_location;
use attest_core::{
    Contract, ContractKind, Diagnostic, DiagnosticCode, EffectFact, ExceptionHierarchy,
    ExceptionKind, FunctionUnit, Marker, Span, UnitTable,
};

use crate::config::AnalysisConfig;

/// Compares contracts against facts for every unit and class of a module.
pub struct Checker<'c, 'a> {
    module_id: &'c str,
    units: &'c UnitTable<'a>,
    hierarchy: &'c ExceptionHierarchy,
    config: &'c AnalysisConfig,
}

/// A property of a fact that contradicts a contract, with its witness.
struct Violation {
    what: &'static str,
    site: Span,
}

impl<'c, 'a> Checker<'c, 'a> {
    pub fn new(
        module_id: &'c str,
        units: &'c UnitTable<'a>,
        hierarchy: &'c ExceptionHierarchy,
        config: &'c AnalysisConfig,
    ) -> Self {
        Checker {
            module_id,
            units,
            hierarchy,
            config,
        }
    }

    /// Runs every check.
    pub fn check(&self) -> Vec<Diagnostic> {
        let mut groups: Vec<(Span, Vec<Diagnostic>)> = Vec::new();
        for unit in self.units.iter().filter(|u| u.has_contracts()) {
            let mut diagnostics = self.check_unit(unit);
            if !diagnostics.is_empty() {
                sort_by_location(&mut diagnostics);
                groups.push((unit.span, diagnostics));
            }
        }
        for class in self.units.classes() {
            let mut diagnostics = Vec::new();
            for contract in &class.contracts {
                self.check_predicate(&class.name, contract, &mut diagnostics);
            }
            if !diagnostics.is_empty() {
                sort_by_location(&mut diagnostics);
                groups.push((class.span, diagnostics));
            }
        }
        groups.sort_by_key(|(span, _)| *span);
        groups.into_iter().flat_map(|(_, d)| d).collect()
    }

    /// Diagnostics of one unit, unsorted.
    pub fn check_unit(&self, unit: &FunctionUnit<'_>) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let Some(fact) = unit.fact.as_ref() else {
            tracing::debug!(unit = %unit.name, "no fact attached; skipping checks");
            return out;
        };

        self.check_raises(unit, fact, &mut out);
        for contract in &unit.contracts {
            match contract.kind {
                ContractKind::Pure => {
                    for violation in self.purity_violations(fact) {
                        out.push(self.diagnostic(
                            DiagnosticCode::ContractViolationStatic,
                            format!("function is declared `pure` but {}", violation.what),
                            &unit.name,
                            violation.site,
                        ));
                    }
                }
                ContractKind::Safe => {
                    if let Some(violation) = self.raises_violation(fact) {
                        out.push(self.diagnostic(
                            DiagnosticCode::ContractViolationStatic,
                            format!("function is declared `safe` but {}", violation.what),
                            &unit.name,
                            violation.site,
                        ));
                    }
                }
                ContractKind::Has => {}
                _ => self.check_predicate(&unit.name, contract, &mut out),
            }
        }
        self.check_markers(unit, fact, &mut out);
        out
    }

    fn diagnostic(
        &self,
        code: DiagnosticCode,
        message: String,
        owner: &str,
        site: Span,
    ) -> Diagnostic {
        Diagnostic::new(code, message, self.module_id, owner, site)
    }

    fn check_raises(&self, unit: &FunctionUnit<'_>, fact: &EffectFact, out: &mut Vec<Diagnostic>) {
        let mut declared: Vec<(&ExceptionKind, Span)> = Vec::new();
        let mut any = false;
        for contract in unit.contracts.iter().filter(|c| c.kind == ContractKind::Raises) {
            any = true;
            for entry in contract.declared_kinds() {
                if !declared.iter().any(|(k, _)| *k == &entry.kind) {
                    declared.push((&entry.kind, entry.span));
                }
            }
        }
        if !any {
            return;
        }

        for (kind, site) in fact.raises() {
            if !self.hierarchy.covered_by(kind, declared.iter().map(|(k, _)| *k)) {
                out.push(self.diagnostic(
                    DiagnosticCode::UndeclaredException,
                    format!("`{kind}` may be raised but is not declared in `raises`"),
                    &unit.name,
                    *site,
                ));
            }
        }

        if !self.config.report_unused_raises || fact.has_unknown_raises() {
            return;
        }
        for (declared_kind, span) in &declared {
            let used = fact
                .raise_kinds()
                .any(|raised| self.hierarchy.is_subclass(raised, declared_kind));
            if !used {
                out.push(self.diagnostic(
                    DiagnosticCode::UnusedRaisesDeclaration,
                    format!("`{declared_kind}` is declared in `raises` but never raised"),
                    &unit.name,
                    *span,
                ));
            }
        }
    }

    /// The raises property: known raises, plus unknown raises under the
    /// conservative policy. One violation at the earliest witness.
    fn raises_violation(&self, fact: &EffectFact) -> Option<Violation> {
        let known = fact.first_raise_site();
        let unknown = if self.config.is_permissive() {
            None
        } else {
            fact.unknown_raises()
        };
        let site = match (known, unknown) {
            (Some(a), Some(b)) => a.first(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };
        let what = if known.is_some() {
            "may raise an exception"
        } else {
            "calls code whose exceptions cannot be determined"
        };
        Some(Violation { what, site })
    }

    fn purity_violations(&self, fact: &EffectFact) -> Vec<Violation> {
        let mut violations = Vec::new();
        if let Some(site) = fact.first_io_site() {
            violations.push(Violation {
                what: "performs I/O",
                site,
            });
        }
        if let Some(site) = fact.global_access() {
            violations.push(Violation {
                what: "accesses global or non-local state",
                site,
            });
        }
        if let Some(site) = fact.nondeterminism() {
            violations.push(Violation {
                what: "is not deterministic",
                site,
            });
        }
        violations.extend(self.raises_violation(fact));
        violations
    }

    fn check_markers(&self, unit: &FunctionUnit<'_>, fact: &EffectFact, out: &mut Vec<Diagnostic>) {
        if !unit.contracts.iter().any(|c| c.kind == ContractKind::Has) {
            return;
        }
        let markers: Vec<&Marker> = unit
            .contracts
            .iter()
            .filter(|c| c.kind == ContractKind::Has)
            .flat_map(|c| c.markers())
            .collect();
        for (channel, site) in fact.io() {
            if !markers.iter().any(|m| m.permits_io(*channel)) {
                out.push(self.diagnostic(
                    DiagnosticCode::ContractViolationStatic,
                    format!("`{channel}` I/O is not permitted by `has`"),
                    &unit.name,
                    *site,
                ));
            }
        }
        if let Some(site) = fact.global_access() {
            if !markers.iter().any(|m| m.permits_global()) {
                out.push(self.diagnostic(
                    DiagnosticCode::ContractViolationStatic,
                    "global state access is not permitted by `has`".to_string(),
                    &unit.name,
                    site,
                ));
            }
        }
    }

    fn check_predicate(&self, owner: &str, contract: &Contract, out: &mut Vec<Diagnostic>) {
        let Some(id) = contract.predicate_unit() else {
            return;
        };
        let Some(fact) = self.units.get(id).and_then(|u| u.fact.as_ref()) else {
            return;
        };
        if let Some(violation) = self.purity_violations(fact).into_iter().next() {
            out.push(self.diagnostic(
                DiagnosticCode::ImpureContractExpression,
                format!("`{}` predicate {}", contract.kind.keyword(), violation.what),
                owner,
                contract.span,
            ));
        }
    }
}
