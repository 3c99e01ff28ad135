//! Function units and the per-module arena that owns them.
//!
//! A [`FunctionUnit`] is the analysis view of one function: its identity,
//! contracts, and a borrowed handle to its body in the adapter's syntax tree.
//! Class methods are units named `Class.method`; inline contract predicates
//! are synthetic units named `owner.<kind#n>` so that they can be analyzed
//! like any other function.
//!
//! [`UnitTable`] is the arena. Units are addressed by [`UnitId`], which is
//! also the node index of the unit in the call graph.

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::{Expr, Stmt};
use crate::contract::Contract;
use crate::effect::EffectFact;
use crate::error::CoreError;
use crate::id::{ClassId, UnitId};
use crate::span::Span;

/// Where a unit comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitKind {
    /// A module-level function.
    Function,
    /// A method of a class declared in the module.
    Method { class: ClassId },
    /// An inline contract predicate attached to `owner`.
    Predicate { owner: UnitOwner },
}

/// Declaration an inline predicate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "owner", content = "id", rename_all = "snake_case")]
pub enum UnitOwner {
    Unit(UnitId),
    Class(ClassId),
}

/// Borrowed body of a unit.
#[derive(Debug, Clone, Copy)]
pub enum UnitBody<'a> {
    /// Statement block of a function or method.
    Block(&'a [Stmt]),
    /// Expression body of a lambda predicate.
    Expr(&'a Expr),
}

/// Analysis view of one function.
#[derive(Debug, Clone)]
pub struct FunctionUnit<'a> {
    /// Handle into the arena.
    pub id: UnitId,
    /// Qualified name within the module.
    pub name: String,
    pub span: Span,
    pub kind: UnitKind,
    /// Parameter names in declaration order.
    pub params: &'a [String],
    pub body: UnitBody<'a>,
    /// Contracts in declaration order.
    pub contracts: Vec<Contract>,
    /// Inferred effects, attached once inference has run.
    pub fact: Option<EffectFact>,
}

impl FunctionUnit<'_> {
    /// Returns `true` for synthetic predicate units.
    pub fn is_predicate(&self) -> bool {
        matches!(self.kind, UnitKind::Predicate { .. })
    }

    /// Returns `true` if any contract is attached.
    pub fn has_contracts(&self) -> bool {
        !self.contracts.is_empty()
    }
}

/// A class declaration with its class-level contracts.
#[derive(Debug, Clone)]
pub struct ClassUnit {
    pub id: ClassId,
    pub name: String,
    pub span: Span,
    /// Class-level contracts (at most one invariant).
    pub contracts: Vec<Contract>,
    /// Method units in declaration order.
    pub methods: Vec<UnitId>,
}

/// Arena of the units and classes of one module.
#[derive(Debug, Clone, Default)]
pub struct UnitTable<'a> {
    units: Vec<FunctionUnit<'a>>,
    classes: Vec<ClassUnit>,
    by_name: IndexMap<String, UnitId>,
    classes_by_name: IndexMap<String, ClassId>,
}

impl<'a> UnitTable<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit and returns its handle.
    ///
    /// Returns [`CoreError::DuplicateUnit`] if the qualified name is taken.
    pub fn add_unit(
        &mut self,
        name: String,
        span: Span,
        kind: UnitKind,
        params: &'a [String],
        body: UnitBody<'a>,
    ) -> Result<UnitId, CoreError> {
        if self.by_name.contains_key(&name) {
            return Err(CoreError::DuplicateUnit { name });
        }
        let id = UnitId(self.units.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.units.push(FunctionUnit {
            id,
            name,
            span,
            kind,
            params,
            body,
            contracts: Vec::new(),
            fact: None,
        });
        Ok(id)
    }

    /// Adds a class and returns its handle.
    pub fn add_class(&mut self, name: String, span: Span) -> Result<ClassId, CoreError> {
        if self.classes_by_name.contains_key(&name) {
            return Err(CoreError::DuplicateUnit { name });
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes_by_name.insert(name.clone(), id);
        self.classes.push(ClassUnit {
            id,
            name,
            span,
            contracts: Vec::new(),
            methods: Vec::new(),
        });
        Ok(id)
    }

    /// Registers `method` as a member of `class`.
    pub fn add_method(&mut self, class: ClassId, method: UnitId) -> Result<(), CoreError> {
        let entry = self
            .classes
            .get_mut(class.index())
            .ok_or(CoreError::ClassNotFound { id: class })?;
        entry.methods.push(method);
        Ok(())
    }

    pub fn get(&self, id: UnitId) -> Option<&FunctionUnit<'a>> {
        self.units.get(id.index())
    }

    /// Looks up a unit, failing with [`CoreError::UnitNotFound`].
    pub fn unit(&self, id: UnitId) -> Result<&FunctionUnit<'a>, CoreError> {
        self.get(id).ok_or(CoreError::UnitNotFound { id })
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassUnit> {
        self.classes.get(id.index())
    }

    /// Resolves a qualified function or method name.
    pub fn lookup(&self, name: &str) -> Option<UnitId> {
        self.by_name.get(name).copied()
    }

    /// Resolves a class name.
    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.classes_by_name.get(name).copied()
    }

    /// Appends contracts to a unit, preserving order.
    pub fn attach_contracts(&mut self, id: UnitId, contracts: Vec<Contract>) -> Result<(), CoreError> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(CoreError::UnitNotFound { id })?;
        unit.contracts.extend(contracts);
        Ok(())
    }

    /// Appends contracts to a class, preserving order.
    pub fn attach_class_contracts(
        &mut self,
        id: ClassId,
        contracts: Vec<Contract>,
    ) -> Result<(), CoreError> {
        let class = self
            .classes
            .get_mut(id.index())
            .ok_or(CoreError::ClassNotFound { id })?;
        class.contracts.extend(contracts);
        Ok(())
    }

    /// Attaches the inferred fact of a unit. This is the only mutation a
    /// unit sees after extraction.
    pub fn attach_fact(&mut self, id: UnitId, fact: EffectFact) -> Result<(), CoreError> {
        let unit = self
            .units
            .get_mut(id.index())
            .ok_or(CoreError::UnitNotFound { id })?;
        unit.fact = Some(fact);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All units in arena order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionUnit<'a>> {
        self.units.iter()
    }

    /// All classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassUnit> {
        self.classes.iter()
    }
}
