//! Contract records attached to function and class declarations.
//!
//! A contract is parsed once from its attachment expression into a
//! [`Contract`]: a kind tag plus a payload. Contracts are kept in declaration
//! order because composition is sequential.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effect::IoChannel;
use crate::exceptions::ExceptionKind;
use crate::id::UnitId;
use crate::span::Span;

/// The kind of a declared contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Checked at function entry.
    Pre,
    /// Checked against the return value.
    Post,
    /// Checked against the arguments together with the return value.
    Ensure,
    /// Class invariant.
    Invariant,
    /// Closed set of exception kinds the function may raise.
    Raises,
    /// Predicate that must hold when a given exception is raised.
    Reason,
    /// No side effects, deterministic, raises nothing.
    Pure,
    /// Raises nothing.
    Safe,
    /// Capabilities the function is allowed to use.
    Has,
}

impl ContractKind {
    /// Vocabulary word used at the attachment site.
    pub fn keyword(self) -> &'static str {
        match self {
            ContractKind::Pre => "pre",
            ContractKind::Post => "post",
            ContractKind::Ensure => "ensure",
            ContractKind::Invariant => "inv",
            ContractKind::Raises => "raises",
            ContractKind::Reason => "reason",
            ContractKind::Pure => "pure",
            ContractKind::Safe => "safe",
            ContractKind::Has => "has",
        }
    }

    /// Returns `true` for kinds whose payload includes a predicate.
    pub fn has_predicate(self) -> bool {
        matches!(
            self,
            ContractKind::Pre
                | ContractKind::Post
                | ContractKind::Ensure
                | ContractKind::Invariant
                | ContractKind::Reason
        )
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// An exception kind named in a `raises(...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredKind {
    pub kind: ExceptionKind,
    pub span: Span,
}

/// A capability marker named in `has(...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(pub String);

impl Marker {
    /// Returns `true` if this marker permits I/O on `channel`.
    pub fn permits_io(&self, channel: IoChannel) -> bool {
        match self.0.as_str() {
            "io" => true,
            "read" => channel == IoChannel::Read,
            "write" => channel == IoChannel::Write,
            "print" | "stdout" => channel == IoChannel::Stdout,
            "stderr" => channel == IoChannel::Stderr,
            "network" | "socket" => channel == IoChannel::Network,
            "process" => channel == IoChannel::Process,
            "import" => channel == IoChannel::Import,
            _ => false,
        }
    }

    /// Returns `true` if this marker permits access to shared mutable state.
    pub fn permits_global(&self) -> bool {
        matches!(self.0.as_str(), "global" | "nonlocal")
    }
}

/// What a contract carries besides its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum Payload {
    /// `pure`, `safe`.
    None,
    /// Predicate analyzed as its own unit.
    Predicate { unit: UnitId },
    /// `raises(...)`.
    Exceptions { kinds: Vec<DeclaredKind> },
    /// `has(...)`.
    Markers { markers: Vec<Marker> },
    /// `reason(kind, predicate)`.
    Reason { kind: ExceptionKind, unit: UnitId },
}

/// A declared behavioral contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub kind: ContractKind,
    pub payload: Payload,
    /// Location of the attachment expression.
    pub span: Span,
}

impl Contract {
    /// A predicate contract (`pre`, `post`, `ensure`, `inv`).
    pub fn predicate(kind: ContractKind, unit: UnitId, span: Span) -> Self {
        Contract {
            kind,
            payload: Payload::Predicate { unit },
            span,
        }
    }

    pub fn raises(kinds: Vec<DeclaredKind>, span: Span) -> Self {
        Contract {
            kind: ContractKind::Raises,
            payload: Payload::Exceptions { kinds },
            span,
        }
    }

    pub fn reason(kind: ExceptionKind, unit: UnitId, span: Span) -> Self {
        Contract {
            kind: ContractKind::Reason,
            payload: Payload::Reason { kind, unit },
            span,
        }
    }

    pub fn has(markers: Vec<Marker>, span: Span) -> Self {
        Contract {
            kind: ContractKind::Has,
            payload: Payload::Markers { markers },
            span,
        }
    }

    pub fn pure(span: Span) -> Self {
        Contract {
            kind: ContractKind::Pure,
            payload: Payload::None,
            span,
        }
    }

    pub fn safe(span: Span) -> Self {
        Contract {
            kind: ContractKind::Safe,
            payload: Payload::None,
            span,
        }
    }

    /// The predicate unit, for kinds that carry one.
    pub fn predicate_unit(&self) -> Option<UnitId> {
        match &self.payload {
            Payload::Predicate { unit } | Payload::Reason { unit, .. } => Some(*unit),
            _ => None,
        }
    }

    /// Declared exception kinds of a `raises` contract.
    pub fn declared_kinds(&self) -> &[DeclaredKind] {
        match &self.payload {
            Payload::Exceptions { kinds } => kinds,
            _ => &[],
        }
    }

    /// Markers of a `has` contract.
    pub fn markers(&self) -> &[Marker] {
        match &self.payload {
            Payload::Markers { markers } => markers,
            _ => &[],
        }
    }
}
