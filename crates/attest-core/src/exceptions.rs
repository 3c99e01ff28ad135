//! Exception kinds and the subtype hierarchy used for coverage checks.
//!
//! A declared `raises(K)` covers every kind whose ancestor chain reaches `K`.
//! The hierarchy starts with the built-in exception tree and is extended with
//! the exception classes a module declares.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An exception class identified by its unqualified name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionKind(pub String);

impl ExceptionKind {
    /// Builds a kind from a possibly qualified path, keeping the last segment.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('.').next().unwrap_or(path);
        ExceptionKind(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExceptionKind {
    fn from(name: &str) -> Self {
        ExceptionKind::from_path(name)
    }
}

/// Root of every exception hierarchy.
pub const BASE_EXCEPTION: &str = "BaseException";
/// Parent assumed for kinds the hierarchy has never seen.
pub const DEFAULT_PARENT: &str = "Exception";

/// (child, parent) pairs of the built-in tree.
const BUILTIN_TREE: &[(&str, &str)] = &[
    ("SystemExit", "BaseException"),
    ("KeyboardInterrupt", "BaseException"),
    ("GeneratorExit", "BaseException"),
    ("Exception", "BaseException"),
    ("StopIteration", "Exception"),
    ("StopAsyncIteration", "Exception"),
    ("ArithmeticError", "Exception"),
    ("FloatingPointError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("AssertionError", "Exception"),
    ("AttributeError", "Exception"),
    ("BufferError", "Exception"),
    ("EOFError", "Exception"),
    ("ImportError", "Exception"),
    ("ModuleNotFoundError", "ImportError"),
    ("LookupError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("MemoryError", "Exception"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("OSError", "Exception"),
    ("IOError", "OSError"),
    ("EnvironmentError", "OSError"),
    ("BlockingIOError", "OSError"),
    ("ChildProcessError", "OSError"),
    ("ConnectionError", "OSError"),
    ("BrokenPipeError", "ConnectionError"),
    ("ConnectionAbortedError", "ConnectionError"),
    ("ConnectionRefusedError", "ConnectionError"),
    ("ConnectionResetError", "ConnectionError"),
    ("FileExistsError", "OSError"),
    ("FileNotFoundError", "OSError"),
    ("InterruptedError", "OSError"),
    ("IsADirectoryError", "OSError"),
    ("NotADirectoryError", "OSError"),
    ("PermissionError", "OSError"),
    ("ProcessLookupError", "OSError"),
    ("TimeoutError", "OSError"),
    ("ReferenceError", "Exception"),
    ("RuntimeError", "Exception"),
    ("NotImplementedError", "RuntimeError"),
    ("RecursionError", "RuntimeError"),
    ("SyntaxError", "Exception"),
    ("IndentationError", "SyntaxError"),
    ("SystemError", "Exception"),
    ("TypeError", "Exception"),
    ("ValueError", "Exception"),
    ("UnicodeError", "ValueError"),
    ("UnicodeDecodeError", "UnicodeError"),
    ("UnicodeEncodeError", "UnicodeError"),
];

/// Child -> parent map over exception kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionHierarchy {
    parents: IndexMap<ExceptionKind, ExceptionKind>,
}

impl Default for ExceptionHierarchy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExceptionHierarchy {
    /// The built-in exception tree.
    pub fn builtin() -> Self {
        let parents = BUILTIN_TREE
            .iter()
            .map(|(child, parent)| (ExceptionKind::from(*child), ExceptionKind::from(*parent)))
            .collect();
        ExceptionHierarchy { parents }
    }

    /// Returns `true` if `kind` is a registered exception class.
    pub fn contains(&self, kind: &ExceptionKind) -> bool {
        kind.as_str() == BASE_EXCEPTION || self.parents.contains_key(kind)
    }

    /// Registers module-declared classes given as `(name, bases)`.
    ///
    /// A class is an exception class if any of its bases is one. Classes may
    /// be declared in any order, so registration repeats until no new class
    /// is added. Returns the names that were registered.
    pub fn register_classes<'a, I>(&mut self, classes: I) -> Vec<ExceptionKind>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut pending: Vec<(&str, &[String])> = classes.into_iter().collect();
        let mut added = Vec::new();
        loop {
            let before = pending.len();
            pending.retain(|(name, bases)| {
                let parent = bases
                    .iter()
                    .map(|b| ExceptionKind::from_path(b))
                    .find(|b| self.contains(b));
                match parent {
                    Some(parent) => {
                        let kind = ExceptionKind::from_path(name);
                        self.parents.insert(kind.clone(), parent);
                        added.push(kind);
                        false
                    }
                    None => true,
                }
            });
            if pending.len() == before {
                break;
            }
        }
        added
    }

    /// Parent of `kind`. Unknown kinds are assumed to derive from `Exception`.
    pub fn parent(&self, kind: &ExceptionKind) -> Option<ExceptionKind> {
        if kind.as_str() == BASE_EXCEPTION {
            return None;
        }
        Some(
            self.parents
                .get(kind)
                .cloned()
                .unwrap_or_else(|| ExceptionKind::from(DEFAULT_PARENT)),
        )
    }

    /// Returns `true` if `kind` is `ancestor` or derives from it.
    pub fn is_subclass(&self, kind: &ExceptionKind, ancestor: &ExceptionKind) -> bool {
        let mut current = Some(kind.clone());
        // Bounded walk: a malformed map with a cycle cannot loop forever.
        for _ in 0..=self.parents.len() + 1 {
            match current {
                Some(ref k) if k == ancestor => return true,
                Some(k) => current = self.parent(&k),
                None => return false,
            }
        }
        false
    }

    /// Returns `true` if any of `declared` covers `kind`.
    pub fn covered_by<'k, I>(&self, kind: &ExceptionKind, declared: I) -> bool
    where
        I: IntoIterator<Item = &'k ExceptionKind>,
    {
        declared.into_iter().any(|d| self.is_subclass(kind, d))
    }

    /// Returns `true` if a handler filtering on `kind` catches everything.
    pub fn is_catch_all(kind: &ExceptionKind) -> bool {
        kind.as_str() == BASE_EXCEPTION
    }
}
