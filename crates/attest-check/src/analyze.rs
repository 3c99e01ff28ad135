//! Module driver: extraction, inference, checking, and reporting for one
//! module, plus a parallel entry point over many modules.

use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use serde::Serialize;

use attest_core::{Diagnostic, FactSummary, ModuleAst, Severity};

use crate::check::Checker;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::extract::extract_module;
use crate::infer::{GroupStats, Inferencer, KnownEffects};
use crate::report::{contract_metadata, ContractMetadata};

/// Inferred fact of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFact {
    pub function: String,
    #[serde(flatten)]
    pub fact: FactSummary,
}

/// Everything produced for one module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub module_id: String,
    pub diagnostics: Vec<Diagnostic>,
    pub facts: Vec<UnitFact>,
    pub metadata: Vec<ContractMetadata>,
    pub stats: Vec<GroupStats>,
    /// Internal failure that aborted the module. Diagnostics are then
    /// limited to extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ModuleReport {
    /// Number of error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}

/// Analyzes one module.
pub fn analyze_module(module: &ModuleAst, config: &AnalysisConfig) -> ModuleReport {
    run(module, config, None)
}

/// Analyzes one module, polling `cancel` between fixed-point passes.
pub fn analyze_module_with_cancel(
    module: &ModuleAst,
    config: &AnalysisConfig,
    cancel: &AtomicBool,
) -> ModuleReport {
    run(module, config, Some(cancel))
}

/// Analyzes modules in parallel. Reports come back in input order.
pub fn analyze_modules(modules: &[ModuleAst], config: &AnalysisConfig) -> Vec<ModuleReport> {
    modules
        .par_iter()
        .map(|module| analyze_module(module, config))
        .collect()
}

fn run(module: &ModuleAst, config: &AnalysisConfig, cancel: Option<&AtomicBool>) -> ModuleReport {
    let mut report = ModuleReport {
        module_id: module.id.clone(),
        diagnostics: Vec::new(),
        facts: Vec::new(),
        metadata: Vec::new(),
        stats: Vec::new(),
        failure: None,
    };

    let extraction = match extract_module(module, config) {
        Ok(extraction) => extraction,
        Err(err) => {
            tracing::warn!(module = %module.id, error = %err, "extraction failed");
            report.failure = Some(err.to_string());
            return report;
        }
    };
    report.diagnostics = extraction.diagnostics;
    let mut units = extraction.units;

    let known = KnownEffects::from_config(config);
    let solved = {
        let mut inferencer = Inferencer::new(
            &units,
            &extraction.hierarchy,
            &known,
            extraction.mutable_globals,
        );
        if let Some(flag) = cancel {
            inferencer = inferencer.with_cancel(flag);
        }
        inferencer
            .solve_all()
            .map(|()| (inferencer.stats().to_vec(), inferencer.into_facts()))
    };
    let (stats, facts) = match solved {
        Ok(solved) => solved,
        Err(err) => return failed(report, err),
    };

    for (index, fact) in facts.into_iter().enumerate() {
        let Some(fact) = fact else { continue };
        let id = attest_core::UnitId(index as u32);
        if let Err(err) = units.attach_fact(id, fact) {
            return failed(report, err.into());
        }
    }
    report.stats = stats;
    report.facts = units
        .iter()
        .filter_map(|unit| {
            unit.fact.as_ref().map(|fact| UnitFact {
                function: unit.name.clone(),
                fact: fact.summary(),
            })
        })
        .collect();

    let checker = Checker::new(&module.id, &units, &extraction.hierarchy, config);
    report.diagnostics.extend(checker.check());
    report.metadata = contract_metadata(&units);

    tracing::info!(
        module = %module.id,
        units = units.len(),
        diagnostics = report.diagnostics.len(),
        errors = report.error_count(),
        "module analyzed"
    );
    report
}

/// Aborts the module: inference results are discarded, extraction
/// diagnostics are kept.
fn failed(mut report: ModuleReport, err: AnalysisError) -> ModuleReport {
    tracing::warn!(module = %report.module_id, error = %err, "analysis aborted");
    report.failure = Some(err.to_string());
    report
}
