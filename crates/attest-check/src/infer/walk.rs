//! Body walker: computes the effect fact of one unit from its syntax and the
//! current facts of its callees.
//!
//! The walk is path-insensitive. Effects of every statement are joined into
//! one fact, including statements that follow a `return` or `raise` in the
//! same block. Exits end a path but never remove an effect, so adding a
//! statement can only grow the fact.

use std::collections::HashSet;

use smallvec::SmallVec;

use attest_core::ast::{Expr, Handler, Keyword, Literal, Stmt};
use attest_core::exceptions::BASE_EXCEPTION;
use attest_core::{
    CallTarget, EffectFact, ExceptionHierarchy, ExceptionKind, FunctionUnit, IoChannel, Span,
    UnitBody, UnitTable,
};

use super::callgraph::{resolve_local, LocalTarget};
use super::known::KnownEffects;

/// Module-wide inputs shared by every walk.
#[derive(Debug)]
pub struct Scope<'s, 'a> {
    pub units: &'s UnitTable<'a>,
    pub hierarchy: &'s ExceptionHierarchy,
    pub known: &'s KnownEffects,
    /// Module-level bindings that may change at run time.
    pub mutable_globals: &'s HashSet<String>,
}

/// What an enclosing `except` clause re-raises.
#[derive(Debug)]
struct HandlerFrame {
    kinds: SmallVec<[ExceptionKind; 2]>,
    unknown: bool,
    alias: Option<String>,
}

/// What a `raise <expr>` raises.
enum Raised {
    Kind(ExceptionKind),
    /// The exception bound by the handler frame at this depth.
    Bound(usize),
    Unknown,
}

/// Names bound inside a function body. Names declared `global` or
/// `nonlocal` are excluded.
pub fn local_names(params: &[String], body: UnitBody<'_>) -> HashSet<String> {
    let mut locals: HashSet<String> = params.iter().cloned().collect();
    let mut declared = HashSet::new();
    if let UnitBody::Block(stmts) = body {
        collect_locals(stmts, &mut locals, &mut declared);
    }
    for name in &declared {
        locals.remove(name);
    }
    locals
}

fn collect_locals(stmts: &[Stmt], locals: &mut HashSet<String>, declared: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for target in targets {
                    bind_target(target, locals);
                }
            }
            Stmt::AugAssign { target, .. } => bind_target(target, locals),
            Stmt::For {
                target,
                body,
                orelse,
                ..
            } => {
                bind_target(target, locals);
                collect_locals(body, locals, declared);
                collect_locals(orelse, locals, declared);
            }
            Stmt::If { body, orelse, .. } | Stmt::While { body, orelse, .. } => {
                collect_locals(body, locals, declared);
                collect_locals(orelse, locals, declared);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_locals(body, locals, declared);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        locals.insert(name.clone());
                    }
                    collect_locals(&handler.body, locals, declared);
                }
                collect_locals(orelse, locals, declared);
                collect_locals(finalbody, locals, declared);
            }
            Stmt::With { items, body } => {
                for item in items {
                    if let Some(alias) = &item.alias {
                        locals.insert(alias.clone());
                    }
                }
                collect_locals(body, locals, declared);
            }
            Stmt::Import { names, .. } => locals.extend(names.iter().cloned()),
            Stmt::Global { names, .. } | Stmt::Nonlocal { names, .. } => {
                declared.extend(names.iter().cloned())
            }
            Stmt::Expr { .. }
            | Stmt::Return { .. }
            | Stmt::Raise { .. }
            | Stmt::Assert { .. }
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue => {}
        }
    }
}

fn bind_target(target: &Expr, locals: &mut HashSet<String>) {
    match target {
        Expr::Name { id, .. } => {
            locals.insert(id.clone());
        }
        Expr::Collection { elts, .. } => {
            for elt in elts {
                bind_target(elt, locals);
            }
        }
        _ => {}
    }
}

/// Computes the fact of `unit`. `facts` holds the current fact of every
/// unit already solved or being iterated; missing entries read as bottom.
pub fn infer_unit(
    scope: &Scope<'_, '_>,
    unit: &FunctionUnit<'_>,
    locals: &HashSet<String>,
    facts: &[Option<EffectFact>],
) -> EffectFact {
    let mut walker = Walker {
        scope,
        unit_name: &unit.name,
        locals,
        scoped: Vec::new(),
        facts,
        handlers: Vec::new(),
    };
    let mut fact = EffectFact::bottom();
    match unit.body {
        UnitBody::Block(stmts) => {
            walker.block(stmts, &mut fact);
        }
        UnitBody::Expr(expr) => walker.expr(expr, &mut fact),
    }
    fact
}

struct Walker<'w, 's, 'a> {
    scope: &'w Scope<'s, 'a>,
    unit_name: &'w str,
    locals: &'w HashSet<String>,
    /// Names bound by enclosing lambdas and comprehensions.
    scoped: Vec<String>,
    facts: &'w [Option<EffectFact>],
    handlers: Vec<HandlerFrame>,
}

impl Walker<'_, '_, '_> {
    fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name) || self.scoped.iter().any(|s| s == name)
    }

    fn is_mutable_global(&self, name: &str) -> bool {
        !self.is_local(name) && self.scope.mutable_globals.contains(name)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn block(&mut self, stmts: &[Stmt], fact: &mut EffectFact) {
        for stmt in stmts {
            self.stmt(stmt, fact);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, fact: &mut EffectFact) {
        match stmt {
            Stmt::Expr { value } => self.expr(value, fact),
            Stmt::Assign { targets, value, .. } => {
                self.expr(value, fact);
                for target in targets {
                    self.store(target, fact);
                }
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(value, fact);
                self.expr(target, fact);
                self.store(target, fact);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value, fact);
                }
            }
            Stmt::Raise { exc, cause, span } => {
                self.raise(exc.as_ref(), cause.as_ref(), *span, fact);
            }
            Stmt::If { test, body, orelse } => {
                self.expr(test, fact);
                self.block(body, fact);
                self.block(orelse, fact);
            }
            Stmt::While { test, body, orelse } => {
                self.expr(test, fact);
                self.block(body, fact);
                self.block(orelse, fact);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.expr(iter, fact);
                self.store(target, fact);
                self.block(body, fact);
                self.block(orelse, fact);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.try_stmt(body, handlers, orelse, finalbody, fact),
            Stmt::With { items, body } => {
                for item in items {
                    self.expr(&item.context, fact);
                }
                self.block(body, fact);
            }
            Stmt::Assert { test, msg, span } => {
                self.expr(test, fact);
                if let Some(msg) = msg {
                    self.expr(msg, fact);
                }
                fact.add_raise(ExceptionKind::from("AssertionError"), *span);
            }
            Stmt::Global { span, .. } | Stmt::Nonlocal { span, .. } => {
                fact.mark_global_access(*span);
            }
            Stmt::Import { span, .. } => fact.add_io(IoChannel::Import, *span),
            Stmt::Pass | Stmt::Break | Stmt::Continue => {}
        }
    }

    /// Assignment target.
    fn store(&mut self, target: &Expr, fact: &mut EffectFact) {
        match target {
            Expr::Name { id, span, .. } => {
                if self.is_mutable_global(id) {
                    fact.mark_global_access(*span);
                }
            }
            Expr::Collection { elts, .. } => {
                for elt in elts {
                    self.store(elt, fact);
                }
            }
            // `obj.attr = v` and `obj[k] = v` read `obj`.
            other => self.expr(other, fact),
        }
    }

    fn try_stmt(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        fact: &mut EffectFact,
    ) {
        let mut guarded = EffectFact::bottom();
        self.block(body, &mut guarded);

        // Exceptions raised by the else clause are not handled by this try.
        self.block(orelse, fact);

        let mut handled = EffectFact::bottom();
        for handler in handlers {
            let filters: SmallVec<[ExceptionKind; 2]> = handler
                .kinds
                .iter()
                .map(|k| ExceptionKind::from_path(k))
                .collect();
            let catch_all =
                handler.is_catch_all() || filters.iter().any(ExceptionHierarchy::is_catch_all);

            let body_unknown = guarded.has_unknown_raises();
            let hierarchy = self.scope.hierarchy;
            let matched = guarded.take_raises_where(|kind| {
                catch_all || filters.iter().any(|f| hierarchy.is_subclass(kind, f))
            });
            let unknown_caught = catch_all && body_unknown;
            if catch_all {
                guarded.clear_unknown_raises();
            }

            let mut kinds: SmallVec<[ExceptionKind; 2]> =
                matched.into_iter().map(|(kind, _)| kind).collect();
            if kinds.is_empty() || body_unknown {
                for filter in &filters {
                    if !kinds.contains(filter) {
                        kinds.push(filter.clone());
                    }
                }
            }
            kinds.retain(|k| k.as_str() != BASE_EXCEPTION || !unknown_caught);

            self.handlers.push(HandlerFrame {
                kinds,
                unknown: unknown_caught,
                alias: handler.name.clone(),
            });
            self.block(&handler.body, &mut handled);
            self.handlers.pop();
        }

        fact.join(&guarded);
        fact.join(&handled);

        self.block(finalbody, fact);
    }

    fn raise(
        &mut self,
        exc: Option<&Expr>,
        cause: Option<&Expr>,
        site: Span,
        fact: &mut EffectFact,
    ) {
        if let Some(cause) = cause {
            self.expr(cause, fact);
        }
        let Some(exc) = exc else {
            self.reraise(self.handlers.len().checked_sub(1), site, fact);
            return;
        };
        match self.classify_raised(exc) {
            Raised::Kind(kind) => {
                if let Expr::Call {
                    args,
                    keywords,
                    target,
                    span,
                    ..
                } = exc
                {
                    for arg in args {
                        self.expr(arg, fact);
                    }
                    for keyword in keywords {
                        self.expr(&keyword.value, fact);
                    }
                    // External exception classes are constructed without effect.
                    if let CallTarget::Local(_) = target {
                        self.call(target, args, keywords, *span, fact);
                    }
                }
                fact.add_raise(kind, site);
            }
            Raised::Bound(depth) => self.reraise(Some(depth), site, fact),
            Raised::Unknown => {
                self.expr(exc, fact);
                fact.mark_unknown_raises(site);
            }
        }
    }

    fn reraise(&self, depth: Option<usize>, site: Span, fact: &mut EffectFact) {
        match depth.and_then(|d| self.handlers.get(d)) {
            Some(frame) => {
                for kind in &frame.kinds {
                    fact.add_raise(kind.clone(), site);
                }
                if frame.unknown {
                    fact.mark_unknown_raises(site);
                }
            }
            None => fact.add_raise(ExceptionKind::from("RuntimeError"), site),
        }
    }

    fn classify_raised(&self, exc: &Expr) -> Raised {
        match exc {
            Expr::Call { func, target, .. } => {
                let path = match target {
                    CallTarget::External(path) => Some(path.clone()),
                    CallTarget::Local(name) if self.scope.units.lookup_class(name).is_some() => {
                        Some(name.clone())
                    }
                    CallTarget::Local(_) => None,
                    CallTarget::Dynamic => func.dotted_path().filter(|_| !self.names_local(func)),
                };
                match path {
                    Some(path) if self.is_exception_path(&path) => {
                        Raised::Kind(ExceptionKind::from_path(&path))
                    }
                    _ => Raised::Unknown,
                }
            }
            Expr::Name { id, resolved, .. } => {
                if self.is_local(id) {
                    return self
                        .handlers
                        .iter()
                        .rposition(|frame| frame.alias.as_deref() == Some(id.as_str()))
                        .map_or(Raised::Unknown, Raised::Bound);
                }
                let path = resolved.as_deref().unwrap_or(id);
                if self.is_exception_path(path) {
                    Raised::Kind(ExceptionKind::from_path(path))
                } else {
                    Raised::Unknown
                }
            }
            Expr::Attribute { .. } if !self.names_local(exc) => match exc.dotted_path() {
                Some(path) if self.is_exception_path(&path) => {
                    Raised::Kind(ExceptionKind::from_path(&path))
                }
                _ => Raised::Unknown,
            },
            _ => Raised::Unknown,
        }
    }

    /// Returns `true` if the root name of a name/attribute chain is local.
    fn names_local(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Name { id, .. } => self.is_local(id),
            Expr::Attribute { value, .. } => self.names_local(value),
            _ => false,
        }
    }

    fn is_exception_path(&self, path: &str) -> bool {
        let kind = ExceptionKind::from_path(path);
        self.scope.hierarchy.contains(&kind)
            || kind.as_str().chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr, fact: &mut EffectFact) {
        match expr {
            Expr::Name { id, resolved, span } => {
                if self.is_mutable_global(id) {
                    fact.mark_global_access(*span);
                }
                if let Some(path) = resolved {
                    if self.scope.known.nondeterministic_access(path) {
                        fact.mark_nondeterministic(*span);
                    }
                }
            }
            Expr::Attribute { value, span, .. } => {
                if !self.names_local(expr) {
                    if let Some(path) = expr.dotted_path() {
                        if self.scope.known.nondeterministic_access(&path) {
                            fact.mark_nondeterministic(*span);
                        }
                    }
                }
                self.expr(value, fact);
            }
            Expr::Call {
                func,
                args,
                keywords,
                target,
                span,
            } => {
                self.expr(func, fact);
                for arg in args {
                    self.expr(arg, fact);
                }
                for keyword in keywords {
                    self.expr(&keyword.value, fact);
                }
                self.call(target, args, keywords, *span, fact);
            }
            Expr::Constant { .. } => {}
            Expr::Lambda { params, body, .. } => {
                let mark = self.scoped.len();
                self.scoped.extend(params.iter().cloned());
                self.expr(body, fact);
                self.scoped.truncate(mark);
            }
            Expr::Comprehension { targets, parts, .. } => {
                let mark = self.scoped.len();
                self.scoped.extend(targets.iter().cloned());
                for part in parts {
                    self.expr(part, fact);
                }
                self.scoped.truncate(mark);
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand, fact),
            Expr::BinOp { left, right, .. }
            | Expr::Subscript {
                value: left,
                index: right,
                ..
            } => {
                self.expr(left, fact);
                self.expr(right, fact);
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left, fact);
                for comparator in comparators {
                    self.expr(comparator, fact);
                }
            }
            Expr::BoolOp { values: children, .. }
            | Expr::Collection { elts: children, .. }
            | Expr::Other { children, .. } => {
                for child in children {
                    self.expr(child, fact);
                }
            }
        }
    }

    fn call(
        &mut self,
        target: &CallTarget,
        args: &[Expr],
        keywords: &[Keyword],
        site: Span,
        fact: &mut EffectFact,
    ) {
        match target {
            CallTarget::Local(name) => match resolve_local(self.scope.units, name) {
                LocalTarget::Unit(callee) | LocalTarget::Constructor(Some(callee)) => {
                    if let Some(Some(callee_fact)) = self.facts.get(callee.index()) {
                        fact.join_at(callee_fact, site);
                    }
                }
                LocalTarget::Constructor(None) => {}
                LocalTarget::Missing => {
                    tracing::debug!(unit = self.unit_name, target = %name, "unresolved local call target");
                    fact.mark_unknown_raises(site);
                }
            },
            CallTarget::External(path) => {
                if KnownEffects::is_open(path) {
                    let mode = args
                        .get(1)
                        .or_else(|| keywords.iter().find(|k| k.name == "mode").map(|k| &k.value))
                        .map(|mode| match mode {
                            Expr::Constant {
                                value: Literal::Str(mode),
                                ..
                            } => Some(mode.as_str()),
                            _ => None,
                        });
                    for channel in KnownEffects::open_channels(mode) {
                        fact.add_io(channel, site);
                    }
                } else if let Some(effect) = self.scope.known.lookup(path) {
                    for channel in &effect.io {
                        fact.add_io(*channel, site);
                    }
                    if effect.nondeterministic {
                        fact.mark_nondeterministic(site);
                    }
                    for kind in &effect.raises {
                        fact.add_raise(kind.clone(), site);
                    }
                } else if self.is_builtin_exception(path) {
                    // Constructing an exception object has no effect.
                } else {
                    tracing::debug!(unit = self.unit_name, target = %path, "unresolved external call target");
                    fact.mark_unknown_raises(site);
                }
            }
            CallTarget::Dynamic => {
                tracing::debug!(unit = self.unit_name, "dynamic call target");
                fact.mark_unknown_raises(site);
            }
        }
    }

    fn is_builtin_exception(&self, path: &str) -> bool {
        let name = path.strip_prefix("builtins.").unwrap_or(path);
        !name.contains('.') && self.scope.hierarchy.contains(&ExceptionKind::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::ast::WithItem;

    fn at(line: u32) -> Span {
        Span::new(line, 0)
    }

    #[test]
    fn local_names_cover_every_binding_form() {
        let params = vec!["a".to_string()];
        let body = vec![
            Stmt::assign("b", Expr::int(1, at(1)), at(1)),
            Stmt::For {
                target: Expr::Collection {
                    elts: vec![Expr::name("c", at(2)), Expr::name("d", at(2))],
                    span: at(2),
                },
                iter: Expr::name("a", at(2)),
                body: vec![Stmt::Pass],
                orelse: vec![],
            },
            Stmt::With {
                items: vec![WithItem {
                    context: Expr::name("a", at(3)),
                    alias: Some("e".into()),
                }],
                body: vec![Stmt::Import {
                    names: vec!["json".into()],
                    span: at(4),
                }],
            },
            Stmt::Try {
                body: vec![Stmt::Pass],
                handlers: vec![Handler {
                    kinds: vec!["KeyError".into()],
                    name: Some("err".into()),
                    body: vec![Stmt::Pass],
                    span: at(6),
                }],
                orelse: vec![],
                finalbody: vec![],
            },
        ];
        let locals = local_names(&params, UnitBody::Block(&body));
        for name in ["a", "b", "c", "d", "e", "json", "err"] {
            assert!(locals.contains(name), "{name} should be local");
        }
        assert_eq!(locals.len(), 7);
    }

    #[test]
    fn declared_globals_are_not_local() {
        let body = vec![
            Stmt::Global {
                names: vec!["COUNT".into()],
                span: at(1),
            },
            Stmt::assign("COUNT", Expr::int(0, at(2)), at(2)),
        ];
        let locals = local_names(&[], UnitBody::Block(&body));
        assert!(locals.is_empty());
    }

    #[test]
    fn expression_bodies_bind_only_parameters() {
        let body = Expr::name("x", at(1));
        let params = vec!["x".to_string()];
        let locals = local_names(&params, UnitBody::Expr(&body));
        assert_eq!(locals.len(), 1);
    }
}
