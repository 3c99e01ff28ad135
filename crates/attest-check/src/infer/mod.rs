//! Effect inference over the units of one module.
//!
//! # Architecture
//!
//! - [`CallGraph`] links units through module-local calls; its strongly
//!   connected components are the call groups, ordered callees first.
//! - [`Inferencer`] owns the memo arena of facts, indexed by [`UnitId`].
//!   A group is solved on first demand, after the groups it depends on.
//! - Within a group, members are walked in handle order, each new fact
//!   joined into the previous one, until a full pass adds nothing.
//!
//! Facts only grow, so each changing pass adds at least one lattice member.
//! The pass count of a group is therefore bounded by its lattice height;
//! exceeding that bound is reported as [`AnalysisError::FixpointDiverged`].

pub mod callgraph;
pub mod known;
pub mod walk;

pub use callgraph::{resolve_local, CallGraph, LocalTarget};
pub use known::{KnownEffect, KnownEffects};

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use attest_core::effect::FLAG_HEIGHT;
use attest_core::{EffectFact, ExceptionHierarchy, UnitId, UnitTable};

use crate::error::AnalysisError;
use walk::{infer_unit, local_names, Scope};

/// Solver statistics for one call group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub members: Vec<UnitId>,
    pub passes: usize,
    /// More than one member, or a member calling itself.
    pub recursive: bool,
}

/// Memoizing fixed-point solver for one module.
pub struct Inferencer<'s, 'a> {
    units: &'s UnitTable<'a>,
    hierarchy: &'s ExceptionHierarchy,
    known: &'s KnownEffects,
    mutable_globals: HashSet<String>,
    graph: CallGraph,
    groups: Vec<Vec<UnitId>>,
    group_of: Vec<usize>,
    solved: Vec<bool>,
    locals: Vec<HashSet<String>>,
    facts: Vec<Option<EffectFact>>,
    stats: Vec<GroupStats>,
    cancel: Option<&'s AtomicBool>,
}

impl<'s, 'a> Inferencer<'s, 'a> {
    /// Prepares inference for `units`. `mutable_globals` names the
    /// module-level bindings that may change at run time.
    pub fn new(
        units: &'s UnitTable<'a>,
        hierarchy: &'s ExceptionHierarchy,
        known: &'s KnownEffects,
        mutable_globals: HashSet<String>,
    ) -> Self {
        let graph = CallGraph::build(units);
        let groups = graph.groups();
        let mut group_of = vec![0; units.len()];
        for (index, group) in groups.iter().enumerate() {
            for member in group {
                group_of[member.index()] = index;
            }
        }
        let locals = units.iter().map(|u| local_names(u.params, u.body)).collect();
        Inferencer {
            units,
            hierarchy,
            known,
            mutable_globals,
            solved: vec![false; groups.len()],
            graph,
            groups,
            group_of,
            locals,
            facts: vec![None; units.len()],
            stats: Vec::new(),
            cancel: None,
        }
    }

    /// Polls `flag` at every pass boundary; once set, solving fails with
    /// [`AnalysisError::Cancelled`].
    pub fn with_cancel(mut self, flag: &'s AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The fact of `id`, solving its group (and dependencies) on demand.
    pub fn fact(&mut self, id: UnitId) -> Result<&EffectFact, AnalysisError> {
        let group = *self
            .group_of
            .get(id.index())
            .ok_or(attest_core::CoreError::UnitNotFound { id })?;
        self.ensure_group(group)?;
        self.facts[id.index()]
            .as_ref()
            .ok_or(AnalysisError::Core(attest_core::CoreError::UnitNotFound { id }))
    }

    /// Solves every group.
    pub fn solve_all(&mut self) -> Result<(), AnalysisError> {
        for group in 0..self.groups.len() {
            self.ensure_group(group)?;
        }
        Ok(())
    }

    /// Statistics of the groups solved so far, in solving order.
    pub fn stats(&self) -> &[GroupStats] {
        &self.stats
    }

    /// Consumes the solver, returning facts in arena order. Units of
    /// unsolved groups are absent.
    pub fn into_facts(self) -> Vec<Option<EffectFact>> {
        self.facts
    }

    fn ensure_group(&mut self, target: usize) -> Result<(), AnalysisError> {
        let mut stack = vec![(target, false)];
        while let Some((group, expanded)) = stack.pop() {
            if self.solved[group] {
                continue;
            }
            if expanded {
                self.solve_group(group)?;
                continue;
            }
            stack.push((group, true));
            let deps: BTreeSet<usize> = self.groups[group]
                .iter()
                .flat_map(|member| self.graph.callees(*member))
                .map(|callee| self.group_of[callee.index()])
                .filter(|dep| *dep != group && !self.solved[*dep])
                .collect();
            stack.extend(deps.into_iter().map(|dep| (dep, false)));
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(AnalysisError::Cancelled),
            _ => Ok(()),
        }
    }

    fn solve_group(&mut self, group: usize) -> Result<(), AnalysisError> {
        let members = self.groups[group].clone();
        let recursive = members.len() > 1 || self.graph.calls_itself(members[0]);
        for member in &members {
            self.facts[member.index()] = Some(EffectFact::bottom());
        }

        let scope = Scope {
            units: self.units,
            hierarchy: self.hierarchy,
            known: self.known,
            mutable_globals: &self.mutable_globals,
        };

        let mut passes = 0;
        loop {
            self.check_cancelled()?;
            passes += 1;
            let mut changed = false;
            for member in &members {
                let unit = self.units.unit(*member)?;
                let next = infer_unit(&scope, unit, &self.locals[member.index()], &self.facts);
                let slot = self.facts[member.index()].get_or_insert_with(EffectFact::bottom);
                changed |= slot.join(&next);
            }
            if !recursive || !changed {
                break;
            }

            let kinds: BTreeSet<_> = members
                .iter()
                .filter_map(|m| self.facts[m.index()].as_ref())
                .flat_map(|f| f.raise_kinds())
                .collect();
            let bound = members.len() * (kinds.len() + FLAG_HEIGHT) + 1;
            if passes >= bound {
                let names: Vec<&str> = members
                    .iter()
                    .filter_map(|m| self.units.get(*m).map(|u| u.name.as_str()))
                    .collect();
                tracing::warn!(group = ?names, passes, bound, "fixed point not reached");
                return Err(AnalysisError::FixpointDiverged {
                    members: names.join(", "),
                    passes,
                    bound,
                });
            }
        }

        tracing::debug!(group, members = members.len(), passes, recursive, "call group solved");
        self.solved[group] = true;
        self.stats.push(GroupStats {
            members,
            passes,
            recursive,
        });
        Ok(())
    }
}
