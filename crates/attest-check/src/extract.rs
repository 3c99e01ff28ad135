//! Contract extraction.
//!
//! Two passes over a module's declarations: the first registers every
//! function, method, and class as a unit (and every exception class in the
//! hierarchy), the second parses decorators into contracts. Named predicates
//! may therefore refer to functions declared later in the module.
//!
//! A malformed contract yields one `MalformedContract` diagnostic and is
//! dropped; extraction of the remaining contracts continues.

use std::collections::HashSet;

use attest_core::ast::{ClassDecl, Decl, Expr, FunctionDecl, Literal, ModuleAst};
use attest_core::contract::DeclaredKind;
use attest_core::{
    ClassId, Contract, ContractKind, CoreError, Diagnostic, DiagnosticCode, ExceptionHierarchy,
    ExceptionKind, Marker, Span, UnitBody, UnitId, UnitKind, UnitOwner, UnitTable,
};

use crate::config::AnalysisConfig;

/// Result of extracting one module.
#[derive(Debug)]
pub struct Extraction<'a> {
    pub units: UnitTable<'a>,
    /// `MalformedContract` diagnostics, in declaration order.
    pub diagnostics: Vec<Diagnostic>,
    /// Built-in hierarchy extended with the module's exception classes.
    pub hierarchy: ExceptionHierarchy,
    /// Module-level bindings that may change at run time.
    pub mutable_globals: HashSet<String>,
}

/// Words of the contract vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Word {
    Contract(ContractKind),
    Chain,
}

impl Word {
    fn parse(word: &str) -> Option<Word> {
        let kind = match word {
            "pre" => ContractKind::Pre,
            "post" => ContractKind::Post,
            "ensure" => ContractKind::Ensure,
            "inv" => ContractKind::Invariant,
            "raises" => ContractKind::Raises,
            "reason" => ContractKind::Reason,
            "pure" => ContractKind::Pure,
            "safe" => ContractKind::Safe,
            "has" => ContractKind::Has,
            "chain" => return Some(Word::Chain),
            _ => return None,
        };
        Some(Word::Contract(kind))
    }
}

/// Declaration contracts are being extracted for.
#[derive(Debug, Clone, Copy)]
enum Target<'n> {
    Unit { id: UnitId, name: &'n str, is_method: bool },
    Class { id: ClassId, name: &'n str },
}

impl Target<'_> {
    fn name(&self) -> &str {
        match self {
            Target::Unit { name, .. } | Target::Class { name, .. } => name,
        }
    }

    fn owner(&self) -> UnitOwner {
        match *self {
            Target::Unit { id, .. } => UnitOwner::Unit(id),
            Target::Class { id, .. } => UnitOwner::Class(id),
        }
    }
}

/// Extracts units and contracts from `module`.
///
/// Fails only on structurally invalid input (two declarations with the
/// same qualified name).
pub fn extract_module<'a>(
    module: &'a ModuleAst,
    config: &AnalysisConfig,
) -> Result<Extraction<'a>, CoreError> {
    let mut units = UnitTable::new();
    let mut hierarchy = ExceptionHierarchy::builtin();

    // Pass 1: units, classes, exception classes.
    let mut slots = Vec::with_capacity(module.declarations.len());
    for decl in &module.declarations {
        match decl {
            Decl::Function(func) => {
                let id = register_function(&mut units, func, func.name.clone(), UnitKind::Function)?;
                slots.push(Slot::Function(id));
            }
            Decl::Class(class) => {
                let class_id = units.add_class(class.name.clone(), class.span)?;
                for method in &class.methods {
                    let name = format!("{}.{}", class.name, method.name);
                    let id = register_function(
                        &mut units,
                        method,
                        name,
                        UnitKind::Method { class: class_id },
                    )?;
                    units.add_method(class_id, id)?;
                }
                slots.push(Slot::Class(class_id));
            }
        }
    }
    let added = hierarchy.register_classes(module.declarations.iter().filter_map(|decl| match decl {
        Decl::Class(class) => Some((class.name.as_str(), class.bases.as_slice())),
        Decl::Function(_) => None,
    }));
    if !added.is_empty() {
        tracing::debug!(module = %module.id, classes = added.len(), "registered exception classes");
    }

    // Pass 2: contracts.
    let mut extractor = Extractor {
        module_id: &module.id,
        namespace: &config.namespace,
        units,
        diagnostics: Vec::new(),
    };
    for (decl, slot) in module.declarations.iter().zip(slots) {
        match (decl, slot) {
            (Decl::Function(func), Slot::Function(id)) => {
                let target = Target::Unit {
                    id,
                    name: &func.name,
                    is_method: false,
                };
                let contracts = extractor.contracts(target, &func.decorators)?;
                extractor.units.attach_contracts(id, contracts)?;
            }
            (Decl::Class(class), Slot::Class(id)) => extractor.class(class, id)?,
            _ => {}
        }
    }

    let mutable_globals = module
        .bindings
        .iter()
        .filter(|b| b.mutable)
        .map(|b| b.name.clone())
        .collect();

    Ok(Extraction {
        units: extractor.units,
        diagnostics: extractor.diagnostics,
        hierarchy,
        mutable_globals,
    })
}

/// Arena handle registered for each declaration in pass 1.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Function(UnitId),
    Class(ClassId),
}

fn register_function<'a>(
    units: &mut UnitTable<'a>,
    func: &'a FunctionDecl,
    name: String,
    kind: UnitKind,
) -> Result<UnitId, CoreError> {
    units.add_unit(
        name,
        func.span,
        kind,
        func.params.as_slice(),
        UnitBody::Block(func.body.as_slice()),
    )
}

struct Extractor<'m, 'a> {
    module_id: &'m str,
    namespace: &'m str,
    units: UnitTable<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl<'m, 'a> Extractor<'m, 'a> {
    fn malformed(&mut self, owner: &str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticCode::MalformedContract,
            message,
            self.module_id,
            owner,
            span,
        ));
    }

    /// Vocabulary word named by a decorator head, if any.
    fn word(&self, head: &Expr) -> Option<Word> {
        let path = head.dotted_path()?;
        let word = if self.namespace.is_empty() {
            path.as_str()
        } else {
            path.strip_prefix(self.namespace)?.strip_prefix('.')?
        };
        Word::parse(word)
    }

    fn class(&mut self, class: &'a ClassDecl, class_id: ClassId) -> Result<(), CoreError> {
        let target = Target::Class {
            id: class_id,
            name: &class.name,
        };
        let contracts = self.contracts(target, &class.decorators)?;
        self.units.attach_class_contracts(class_id, contracts)?;

        for method in &class.methods {
            let name = format!("{}.{}", class.name, method.name);
            let Some(id) = self.units.lookup(&name) else {
                continue;
            };
            let target = Target::Unit {
                id,
                name: &name,
                is_method: true,
            };
            let contracts = self.contracts(target, &method.decorators)?;
            self.units.attach_contracts(id, contracts)?;
        }
        Ok(())
    }

    /// Parses the decorators of one declaration, outermost first.
    fn contracts(
        &mut self,
        target: Target<'_>,
        decorators: &'a [Expr],
    ) -> Result<Vec<Contract>, CoreError> {
        let mut contracts = Vec::new();
        let mut counter = PredicateCounter::default();
        for decorator in decorators {
            self.decorator(target, decorator, &mut counter, &mut contracts)?;
        }

        let invariants = contracts
            .iter()
            .filter(|c| c.kind == ContractKind::Invariant)
            .count();
        if invariants > 1 {
            let mut seen = false;
            let mut duplicates = Vec::new();
            contracts.retain(|c| {
                if c.kind != ContractKind::Invariant {
                    return true;
                }
                if seen {
                    duplicates.push(c.span);
                    return false;
                }
                seen = true;
                true
            });
            for span in duplicates {
                self.malformed(target.name(), span, "class declares more than one invariant");
            }
        }
        Ok(contracts)
    }

    fn decorator(
        &mut self,
        target: Target<'_>,
        expr: &'a Expr,
        counter: &mut PredicateCounter,
        out: &mut Vec<Contract>,
    ) -> Result<(), CoreError> {
        let (head, call) = match expr {
            Expr::Call {
                func,
                args,
                keywords,
                ..
            } => (func.as_ref(), Some((args.as_slice(), keywords.len()))),
            other => (other, None),
        };
        let Some(word) = self.word(head) else {
            return Ok(());
        };
        let span = expr.span();
        let owner = target.name().to_string();

        let kind = match word {
            Word::Chain => {
                let Some((args, _)) = call else {
                    self.malformed(&owner, span, "`chain` must be called with contracts");
                    return Ok(());
                };
                for arg in args {
                    let head = match arg {
                        Expr::Call { func, .. } => func.as_ref(),
                        other => other,
                    };
                    if self.word(head).is_some() {
                        self.decorator(target, arg, counter, out)?;
                    } else {
                        self.malformed(&owner, arg.span(), "`chain` argument is not a contract");
                    }
                }
                return Ok(());
            }
            Word::Contract(kind) => kind,
        };

        match (kind, target) {
            (ContractKind::Invariant, Target::Unit { is_method, .. }) => {
                let what = if is_method { "method" } else { "function" };
                self.malformed(&owner, span, format!("invariant attached to a {what}"));
                return Ok(());
            }
            (ContractKind::Invariant, Target::Class { .. }) => {}
            (_, Target::Class { .. }) => {
                self.malformed(
                    &owner,
                    span,
                    format!("`{}` cannot be attached to a class", kind.keyword()),
                );
                return Ok(());
            }
            _ => {}
        }

        let contract = match kind {
            ContractKind::Pure | ContractKind::Safe => match call {
                Some((args, keywords)) if !args.is_empty() || keywords > 0 => {
                    self.malformed(&owner, span, format!("`{}` takes no arguments", kind.keyword()));
                    None
                }
                _ if kind == ContractKind::Pure => Some(Contract::pure(span)),
                _ => Some(Contract::safe(span)),
            },
            ContractKind::Raises => match call {
                Some((args, _)) => self.exception_kinds(&owner, args).map(|kinds| Contract::raises(kinds, span)),
                None => {
                    self.malformed(&owner, span, "`raises` must be called with exception types");
                    None
                }
            },
            ContractKind::Has => match call {
                Some((args, _)) => self.markers(&owner, args).map(|markers| Contract::has(markers, span)),
                None => {
                    self.malformed(&owner, span, "`has` must be called with markers");
                    None
                }
            },
            ContractKind::Reason => match call {
                Some(([exc, predicate], _)) => {
                    match self.exception_kinds(&owner, std::slice::from_ref(exc)) {
                        Some(mut kinds) => match self.predicate(target, kind, predicate, counter)? {
                            Some(unit) => {
                                let declared = kinds.remove(0);
                                Some(Contract::reason(declared.kind, unit, span))
                            }
                            None => None,
                        },
                        None => None,
                    }
                }
                _ => {
                    self.malformed(&owner, span, "`reason` takes an exception type and a predicate");
                    None
                }
            },
            ContractKind::Pre | ContractKind::Post | ContractKind::Ensure | ContractKind::Invariant => {
                match call {
                    Some(([predicate], _)) => self
                        .predicate(target, kind, predicate, counter)?
                        .map(|unit| Contract::predicate(kind, unit, span)),
                    Some(([], _)) | None => {
                        self.malformed(&owner, span, format!("`{}` requires a predicate", kind.keyword()));
                        None
                    }
                    Some(_) => {
                        self.malformed(
                            &owner,
                            span,
                            format!("`{}` takes exactly one predicate", kind.keyword()),
                        );
                        None
                    }
                }
            }
        };
        out.extend(contract);
        Ok(())
    }

    fn exception_kinds(&mut self, owner: &str, args: &[Expr]) -> Option<Vec<DeclaredKind>> {
        let mut kinds = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expr::Name { .. } | Expr::Attribute { .. } => {
                    if let Some(path) = arg.dotted_path() {
                        kinds.push(DeclaredKind {
                            kind: ExceptionKind::from_path(&path),
                            span: arg.span(),
                        });
                        continue;
                    }
                    self.malformed(owner, arg.span(), "exception type is not a constant name");
                    return None;
                }
                _ => {
                    self.malformed(owner, arg.span(), "exception type is not a constant name");
                    return None;
                }
            }
        }
        Some(kinds)
    }

    fn markers(&mut self, owner: &str, args: &[Expr]) -> Option<Vec<Marker>> {
        let mut markers = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expr::Constant {
                    value: Literal::Str(marker),
                    ..
                } => markers.push(Marker(marker.clone())),
                _ => {
                    self.malformed(owner, arg.span(), "`has` marker is not a string literal");
                    return None;
                }
            }
        }
        Some(markers)
    }

    /// Resolves a predicate argument to a unit: a lambda becomes a synthetic
    /// unit, a name must refer to a module function.
    fn predicate(
        &mut self,
        target: Target<'_>,
        kind: ContractKind,
        expr: &'a Expr,
        counter: &mut PredicateCounter,
    ) -> Result<Option<UnitId>, CoreError> {
        match expr {
            Expr::Lambda { params, body, span } => {
                let index = counter.next(kind);
                let name = format!("{}.<{}#{}>", target.name(), kind.keyword(), index);
                let id = self.units.add_unit(
                    name,
                    *span,
                    UnitKind::Predicate {
                        owner: target.owner(),
                    },
                    params.as_slice(),
                    UnitBody::Expr(body.as_ref()),
                )?;
                Ok(Some(id))
            }
            Expr::Name { id, resolved: None, .. } => match module_function(&self.units, id) {
                Some(unit) => Ok(Some(unit)),
                None => {
                    self.malformed(
                        target.name(),
                        expr.span(),
                        format!("predicate `{id}` is not a function of this module"),
                    );
                    Ok(None)
                }
            },
            _ => {
                self.malformed(target.name(), expr.span(), "predicate is not callable");
                Ok(None)
            }
        }
    }
}

/// Per-declaration numbering of synthetic predicate units.
#[derive(Debug, Default)]
struct PredicateCounter {
    counts: Vec<(ContractKind, usize)>,
}

impl PredicateCounter {
    fn next(&mut self, kind: ContractKind) -> usize {
        match self.counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => {
                *count += 1;
                *count - 1
            }
            None => {
                self.counts.push((kind, 1));
                0
            }
        }
    }
}

/// Module-level function named `name`; methods and predicates excluded.
fn module_function(units: &UnitTable<'_>, name: &str) -> Option<UnitId> {
    let id = units.lookup(name)?;
    match units.get(id)?.kind {
        UnitKind::Function => Some(id),
        UnitKind::Method { .. } | UnitKind::Predicate { .. } => None,
    }
}
