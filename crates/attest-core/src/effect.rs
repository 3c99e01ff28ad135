//! The inferred effect summary of a function.
//!
//! [`EffectFact`] is a join-semilattice: every member is either a set that
//! only grows or a flag that only turns on. Bottom is the fact of a function
//! that raises nothing, performs no I/O, touches no shared state, and is
//! deterministic. Inference only ever joins into a fact, so facts grow
//! monotonically while a recursive call group is iterated to its fixed point.
//!
//! Each member also remembers the earliest source location that witnesses
//! it, so diagnostics can point at the raise or the offending call.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exceptions::ExceptionKind;
use crate::span::Span;

/// I/O channels distinguished for `has(...)` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoChannel {
    Read,
    Write,
    Stdout,
    Stderr,
    Network,
    Process,
    Import,
}

impl IoChannel {
    pub const ALL: [IoChannel; 7] = [
        IoChannel::Read,
        IoChannel::Write,
        IoChannel::Stdout,
        IoChannel::Stderr,
        IoChannel::Network,
        IoChannel::Process,
        IoChannel::Import,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IoChannel::Read => "read",
            IoChannel::Write => "write",
            IoChannel::Stdout => "stdout",
            IoChannel::Stderr => "stderr",
            IoChannel::Network => "network",
            IoChannel::Process => "process",
            IoChannel::Import => "import",
        }
    }
}

impl fmt::Display for IoChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of non-exception members in the lattice: every I/O channel plus
/// global access, nondeterminism, and unknown raises.
pub const FLAG_HEIGHT: usize = IoChannel::ALL.len() + 3;

/// Conservative effect summary of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectFact {
    /// Exception kinds that may escape, with their earliest raise site.
    raises: BTreeMap<ExceptionKind, Span>,
    /// I/O channels used, with their earliest site.
    io: BTreeMap<IoChannel, Span>,
    /// Earliest access to module-level or enclosing mutable state.
    global_access: Option<Span>,
    /// Earliest call to a nondeterministic primitive.
    nondeterminism: Option<Span>,
    /// Earliest call whose exceptions could not be determined.
    unknown_raises: Option<Span>,
}

fn earliest(slot: &mut Option<Span>, site: Span) {
    *slot = Some(match *slot {
        Some(existing) => existing.first(site),
        None => site,
    });
}

fn earliest_in<K: Ord>(map: &mut BTreeMap<K, Span>, key: K, site: Span) {
    map.entry(key)
        .and_modify(|existing| *existing = existing.first(site))
        .or_insert(site);
}

impl EffectFact {
    /// The bottom element.
    pub fn bottom() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn raises(&self) -> &BTreeMap<ExceptionKind, Span> {
        &self.raises
    }

    pub fn raise_kinds(&self) -> impl Iterator<Item = &ExceptionKind> {
        self.raises.keys()
    }

    pub fn io(&self) -> &BTreeMap<IoChannel, Span> {
        &self.io
    }

    pub fn has_io(&self) -> bool {
        !self.io.is_empty()
    }

    pub fn has_global_access(&self) -> bool {
        self.global_access.is_some()
    }

    pub fn global_access(&self) -> Option<Span> {
        self.global_access
    }

    pub fn is_deterministic(&self) -> bool {
        self.nondeterminism.is_none()
    }

    pub fn nondeterminism(&self) -> Option<Span> {
        self.nondeterminism
    }

    pub fn has_unknown_raises(&self) -> bool {
        self.unknown_raises.is_some()
    }

    pub fn unknown_raises(&self) -> Option<Span> {
        self.unknown_raises
    }

    /// No I/O, no global access, deterministic, and nothing raised (known or unknown).
    pub fn is_pure(&self) -> bool {
        self.is_pure_ignoring_unknown() && !self.has_unknown_raises()
    }

    /// Purity with unknown raises disregarded (permissive policy).
    pub fn is_pure_ignoring_unknown(&self) -> bool {
        !self.has_io() && !self.has_global_access() && self.is_deterministic() && self.raises.is_empty()
    }

    /// Earliest raise site over all kinds.
    pub fn first_raise_site(&self) -> Option<Span> {
        self.raises.values().copied().min()
    }

    /// Earliest I/O site over all channels.
    pub fn first_io_site(&self) -> Option<Span> {
        self.io.values().copied().min()
    }

    // -----------------------------------------------------------------------
    // Growth
    // -----------------------------------------------------------------------

    pub fn add_raise(&mut self, kind: ExceptionKind, site: Span) {
        earliest_in(&mut self.raises, kind, site);
    }

    pub fn add_io(&mut self, channel: IoChannel, site: Span) {
        earliest_in(&mut self.io, channel, site);
    }

    pub fn mark_global_access(&mut self, site: Span) {
        earliest(&mut self.global_access, site);
    }

    pub fn mark_nondeterministic(&mut self, site: Span) {
        earliest(&mut self.nondeterminism, site);
    }

    pub fn mark_unknown_raises(&mut self, site: Span) {
        earliest(&mut self.unknown_raises, site);
    }

    /// Number of lattice members present (raised kinds, I/O channels, flags).
    pub fn height(&self) -> usize {
        self.raises.len()
            + self.io.len()
            + usize::from(self.global_access.is_some())
            + usize::from(self.nondeterminism.is_some())
            + usize::from(self.unknown_raises.is_some())
    }

    /// Least upper bound, in place. Returns `true` if a member was added.
    /// Witness sites may move earlier without counting as growth.
    pub fn join(&mut self, other: &EffectFact) -> bool {
        let before = self.height();
        for (kind, site) in &other.raises {
            self.add_raise(kind.clone(), *site);
        }
        for (channel, site) in &other.io {
            self.add_io(*channel, *site);
        }
        if let Some(site) = other.global_access {
            self.mark_global_access(site);
        }
        if let Some(site) = other.nondeterminism {
            self.mark_nondeterministic(site);
        }
        if let Some(site) = other.unknown_raises {
            self.mark_unknown_raises(site);
        }
        self.height() != before
    }

    /// Joins a callee's fact as seen from a call site: every member the
    /// callee contributes is witnessed at `site`.
    pub fn join_at(&mut self, callee: &EffectFact, site: Span) {
        for kind in callee.raises.keys() {
            self.add_raise(kind.clone(), site);
        }
        for channel in callee.io.keys() {
            self.add_io(*channel, site);
        }
        if callee.global_access.is_some() {
            self.mark_global_access(site);
        }
        if callee.nondeterminism.is_some() {
            self.mark_nondeterministic(site);
        }
        if callee.unknown_raises.is_some() {
            self.mark_unknown_raises(site);
        }
    }

    // -----------------------------------------------------------------------
    // Exception containment (used by try/except modelling)
    // -----------------------------------------------------------------------

    /// Removes and returns the raised kinds matching `caught`.
    pub fn take_raises_where<F>(&mut self, mut caught: F) -> Vec<(ExceptionKind, Span)>
    where
        F: FnMut(&ExceptionKind) -> bool,
    {
        let taken: Vec<ExceptionKind> = self.raises.keys().filter(|&k| caught(k)).cloned().collect();
        taken
            .into_iter()
            .filter_map(|k| self.raises.remove(&k).map(|site| (k, site)))
            .collect()
    }

    /// Drops the unknown-raises witness (a catch-all handler contains it).
    pub fn clear_unknown_raises(&mut self) {
        self.unknown_raises = None;
    }

    /// Flattened view with the field names used in reports.
    pub fn summary(&self) -> FactSummary {
        FactSummary {
            raises: self.raises.keys().map(|k| k.0.clone()).collect(),
            has_io: self.has_io(),
            io: self.io.keys().copied().collect(),
            has_global_access: self.has_global_access(),
            is_deterministic: self.is_deterministic(),
            is_pure: self.is_pure(),
            unknown_raises: self.has_unknown_raises(),
        }
    }
}

/// Location-free rendering of an [`EffectFact`] for reports and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSummary {
    pub raises: Vec<String>,
    pub has_io: bool,
    pub io: Vec<IoChannel>,
    pub has_global_access: bool,
    pub is_deterministic: bool,
    pub is_pure: bool,
    pub unknown_raises: bool,
}
