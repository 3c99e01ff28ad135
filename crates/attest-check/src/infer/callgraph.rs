//! Intra-module call graph and its strongly connected call groups.
//!
//! Nodes are added in arena order, so the node index of a unit equals its
//! [`UnitId`]. Edges point from caller to callee and carry the first call
//! site.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use attest_core::ast::{Expr, Stmt};
use attest_core::{CallTarget, Span, UnitBody, UnitId, UnitTable};

/// What a `CallTarget::Local` name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTarget {
    /// A function or method unit.
    Unit(UnitId),
    /// A class constructor, with its `__init__` unit if declared.
    Constructor(Option<UnitId>),
    /// Nothing in the module has that name.
    Missing,
}

/// Resolves a module-local call target name.
pub fn resolve_local(units: &UnitTable<'_>, name: &str) -> LocalTarget {
    if let Some(id) = units.lookup(name) {
        return LocalTarget::Unit(id);
    }
    if units.lookup_class(name).is_some() {
        return LocalTarget::Constructor(units.lookup(&format!("{name}.__init__")));
    }
    LocalTarget::Missing
}

/// Calls `visit` for every call expression in a statement block, including
/// calls nested in lambdas and comprehensions.
pub fn for_each_call<F>(stmts: &[Stmt], visit: &mut F)
where
    F: FnMut(&CallTarget, Span),
{
    for stmt in stmts {
        match stmt {
            Stmt::Expr { value } => for_each_call_expr(value, visit),
            Stmt::Assign { targets, value, .. } => {
                for_each_call_expr(value, visit);
                for target in targets {
                    for_each_call_expr(target, visit);
                }
            }
            Stmt::AugAssign { target, value, .. } => {
                for_each_call_expr(target, visit);
                for_each_call_expr(value, visit);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    for_each_call_expr(value, visit);
                }
            }
            Stmt::Raise { exc, cause, .. } => {
                for expr in exc.iter().chain(cause.iter()) {
                    for_each_call_expr(expr, visit);
                }
            }
            Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
                for_each_call_expr(test, visit);
                for_each_call(body, visit);
                for_each_call(orelse, visit);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                for_each_call_expr(target, visit);
                for_each_call_expr(iter, visit);
                for_each_call(body, visit);
                for_each_call(orelse, visit);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for_each_call(body, visit);
                for handler in handlers {
                    for_each_call(&handler.body, visit);
                }
                for_each_call(orelse, visit);
                for_each_call(finalbody, visit);
            }
            Stmt::With { items, body } => {
                for item in items {
                    for_each_call_expr(&item.context, visit);
                }
                for_each_call(body, visit);
            }
            Stmt::Assert { test, msg, .. } => {
                for_each_call_expr(test, visit);
                if let Some(msg) = msg {
                    for_each_call_expr(msg, visit);
                }
            }
            Stmt::Global { .. }
            | Stmt::Nonlocal { .. }
            | Stmt::Import { .. }
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue => {}
        }
    }
}

/// Expression counterpart of [`for_each_call`].
pub fn for_each_call_expr<F>(expr: &Expr, visit: &mut F)
where
    F: FnMut(&CallTarget, Span),
{
    match expr {
        Expr::Call {
            func,
            args,
            keywords,
            target,
            span,
        } => {
            visit(target, *span);
            for_each_call_expr(func, visit);
            for arg in args {
                for_each_call_expr(arg, visit);
            }
            for keyword in keywords {
                for_each_call_expr(&keyword.value, visit);
            }
        }
        Expr::Name { .. } | Expr::Constant { .. } => {}
        Expr::Attribute { value, .. } | Expr::UnaryOp { operand: value, .. } => {
            for_each_call_expr(value, visit)
        }
        Expr::Lambda { body, .. } => for_each_call_expr(body, visit),
        Expr::BinOp { left, right, .. }
        | Expr::Subscript {
            value: left,
            index: right,
            ..
        } => {
            for_each_call_expr(left, visit);
            for_each_call_expr(right, visit);
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            for_each_call_expr(left, visit);
            for comparator in comparators {
                for_each_call_expr(comparator, visit);
            }
        }
        Expr::BoolOp { values: children, .. }
        | Expr::Collection { elts: children, .. }
        | Expr::Comprehension { parts: children, .. }
        | Expr::Other { children, .. } => {
            for child in children {
                for_each_call_expr(child, visit);
            }
        }
    }
}

/// Call graph over the units of one module.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<UnitId, Span>,
}

impl CallGraph {
    /// Builds the graph from every unit body in `units`.
    pub fn build(units: &UnitTable<'_>) -> Self {
        let mut graph = DiGraph::with_capacity(units.len(), units.len());
        for unit in units.iter() {
            let node = graph.add_node(unit.id);
            debug_assert_eq!(node.index(), unit.id.index());
        }

        for unit in units.iter() {
            // First call site per callee.
            let mut callees: HashMap<UnitId, Span> = HashMap::new();
            let mut record = |target: &CallTarget, site: Span| {
                let CallTarget::Local(name) = target else {
                    return;
                };
                let callee = match resolve_local(units, name) {
                    LocalTarget::Unit(id) | LocalTarget::Constructor(Some(id)) => id,
                    LocalTarget::Constructor(None) | LocalTarget::Missing => return,
                };
                callees
                    .entry(callee)
                    .and_modify(|existing| *existing = existing.first(site))
                    .or_insert(site);
            };
            match unit.body {
                UnitBody::Block(stmts) => for_each_call(stmts, &mut record),
                UnitBody::Expr(expr) => for_each_call_expr(expr, &mut record),
            }

            let mut callees: Vec<(UnitId, Span)> = callees.into_iter().collect();
            callees.sort();
            for (callee, site) in callees {
                graph.add_edge(unit.id.into(), callee.into(), site);
            }
        }
        CallGraph { graph }
    }

    /// Strongly connected call groups, callees before callers. Members of
    /// each group are sorted by handle.
    pub fn groups(&self) -> Vec<Vec<UnitId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<UnitId> = scc.into_iter().map(UnitId::from).collect();
                members.sort();
                members
            })
            .collect()
    }

    /// Units called by `unit`.
    pub fn callees(&self, unit: UnitId) -> impl Iterator<Item = UnitId> + '_ {
        self.graph
            .edges(NodeIndex::from(unit))
            .map(|edge| UnitId::from(edge.target()))
    }

    /// Returns `true` if `unit` calls itself directly.
    pub fn calls_itself(&self, unit: UnitId) -> bool {
        self.graph.contains_edge(unit.into(), unit.into())
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
