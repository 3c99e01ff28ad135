//! Table of external callables with known effects.
//!
//! Lookup order for a call path: exact entry, then the longest matching
//! module prefix. Configuration entries are inserted after the built-in ones
//! and therefore win. A path that matches nothing is unresolved.

use attest_core::{ExceptionKind, IoChannel};
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::config::AnalysisConfig;

/// Effects contributed by one external callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownEffect {
    pub io: SmallVec<[IoChannel; 2]>,
    pub nondeterministic: bool,
    pub raises: SmallVec<[ExceptionKind; 1]>,
}

impl KnownEffect {
    fn io(channels: &[IoChannel]) -> Self {
        KnownEffect {
            io: channels.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn nondeterministic() -> Self {
        KnownEffect {
            nondeterministic: true,
            ..Default::default()
        }
    }

    fn raising(kind: &str) -> Self {
        KnownEffect {
            raises: SmallVec::from_elem(ExceptionKind::from(kind), 1),
            ..Default::default()
        }
    }

    /// Returns `true` if the entry contributes nothing.
    pub fn is_pure(&self) -> bool {
        self.io.is_empty() && !self.nondeterministic && self.raises.is_empty()
    }
}

use IoChannel::{Import, Network, Process, Read, Stderr, Stdout, Write};

const PURE_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "bytes", "callable", "chr", "complex",
    "dict", "divmod", "enumerate", "filter", "float", "format", "frozenset", "hash", "hex",
    "int", "isinstance", "issubclass", "iter", "len", "list", "map", "max", "min", "oct",
    "ord", "pow", "range", "repr", "reversed", "round", "set", "slice", "sorted", "str",
    "sum", "tuple", "type", "zip", "copy.copy", "copy.deepcopy", "dataclasses.replace",
    "json.dumps", "json.loads",
];

const PURE_PREFIXES: &[&str] = &[
    "math.", "cmath.", "operator.", "itertools.", "functools.", "string.", "re.",
    "collections.", "typing.", "decimal.", "fractions.", "statistics.",
];

const NONDETERMINISTIC_PREFIXES: &[&str] = &["random.", "secrets.", "uuid.", "time."];

const NONDETERMINISTIC: &[&str] = &[
    "os.getenv", "os.urandom", "os.getpid", "os.getcwd", "datetime.datetime.now",
    "datetime.datetime.utcnow", "datetime.datetime.today", "datetime.date.today", "id",
];

/// Attribute reads that observe process state.
const NONDETERMINISTIC_ACCESS: &[&str] = &["os.environ", "sys.argv", "sys.stdin", "sys.path"];

/// Dispatch table for external callables.
#[derive(Debug, Clone)]
pub struct KnownEffects {
    exact: IndexMap<String, KnownEffect>,
    /// Module prefixes ending in `.`, longest first after construction.
    prefixes: Vec<(String, KnownEffect)>,
    on_access: IndexSet<String>,
}

impl Default for KnownEffects {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnownEffects {
    /// The built-in table.
    pub fn builtin() -> Self {
        let mut exact = IndexMap::new();
        let mut prefixes = Vec::new();

        for name in PURE_BUILTINS {
            exact.insert(name.to_string(), KnownEffect::default());
        }
        for name in NONDETERMINISTIC {
            exact.insert(name.to_string(), KnownEffect::nondeterministic());
        }
        for (name, channels) in [
            ("print", &[Stdout][..]),
            ("input", &[Read, Stdout][..]),
            ("sys.stdout.write", &[Stdout][..]),
            ("sys.stderr.write", &[Stderr][..]),
            ("os.remove", &[Write][..]),
            ("os.unlink", &[Write][..]),
            ("os.rename", &[Write][..]),
            ("os.mkdir", &[Write][..]),
            ("os.makedirs", &[Write][..]),
            ("os.rmdir", &[Write][..]),
            ("os.listdir", &[Read][..]),
            ("os.scandir", &[Read][..]),
            ("os.path.exists", &[Read][..]),
            ("os.path.isfile", &[Read][..]),
            ("os.path.isdir", &[Read][..]),
            ("os.system", &[Process][..]),
            ("os.popen", &[Process][..]),
            ("os.kill", &[Process][..]),
            ("importlib.import_module", &[Import][..]),
            ("__import__", &[Import][..]),
        ] {
            exact.insert(name.to_string(), KnownEffect::io(channels));
        }
        for name in ["sys.exit", "exit", "quit"] {
            exact.insert(name.to_string(), KnownEffect::raising("SystemExit"));
        }

        for prefix in PURE_PREFIXES {
            prefixes.push((prefix.to_string(), KnownEffect::default()));
        }
        for prefix in NONDETERMINISTIC_PREFIXES {
            prefixes.push((prefix.to_string(), KnownEffect::nondeterministic()));
        }
        for (prefix, channels) in [
            ("os.environ.", &[][..]),
            ("socket.", &[Network][..]),
            ("requests.", &[Network][..]),
            ("urllib.request.", &[Network][..]),
            ("http.client.", &[Network][..]),
            ("subprocess.", &[Process][..]),
            ("shutil.", &[Read, Write][..]),
            ("logging.", &[Stderr][..]),
        ] {
            let mut effect = KnownEffect::io(channels);
            if channels.is_empty() {
                effect.nondeterministic = true;
            }
            prefixes.push((prefix.to_string(), effect));
        }

        let mut table = KnownEffects {
            exact,
            prefixes,
            on_access: NONDETERMINISTIC_ACCESS.iter().map(|s| s.to_string()).collect(),
        };
        table.sort_prefixes();
        table
    }

    /// The built-in table extended with the configured entries.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let mut table = Self::builtin();
        for name in &config.pure_builtins {
            table.insert(name, KnownEffect::default());
        }
        for entry in &config.effects {
            let effect = KnownEffect {
                io: entry.io.iter().copied().collect(),
                nondeterministic: entry.nondeterministic,
                raises: entry.raises.iter().map(|k| ExceptionKind::from(k.as_str())).collect(),
            };
            table.insert(&entry.name, effect);
        }
        table.sort_prefixes();
        table
    }

    fn insert(&mut self, name: &str, effect: KnownEffect) {
        match name.strip_suffix('*') {
            Some(prefix) => {
                self.prefixes.retain(|(p, _)| p != prefix);
                self.prefixes.push((prefix.to_string(), effect));
            }
            None => {
                self.exact.insert(name.to_string(), effect);
            }
        }
    }

    fn sort_prefixes(&mut self) {
        // Stable: equal-length prefixes keep insertion order.
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Effects of calling `path`, or `None` if the callable is unknown.
    pub fn lookup(&self, path: &str) -> Option<&KnownEffect> {
        let path = path.strip_prefix("builtins.").unwrap_or(path);
        if let Some(effect) = self.exact.get(path) {
            return Some(effect);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, effect)| effect)
    }

    /// Returns `true` if `path` is the built-in `open`, whose effect
    /// depends on its mode argument.
    pub fn is_open(path: &str) -> bool {
        matches!(path, "open" | "builtins.open" | "io.open")
    }

    /// Channel used by `open(file, mode)`. A missing or non-constant mode
    /// is read-only unless proven otherwise; a non-constant mode is
    /// treated as both.
    pub fn open_channels(mode: Option<Option<&str>>) -> SmallVec<[IoChannel; 2]> {
        match mode {
            None => SmallVec::from_elem(Read, 1),
            Some(None) => [Read, Write].into_iter().collect(),
            Some(Some(mode)) => {
                let mut channels = SmallVec::new();
                if mode.contains('r') || mode.contains('+') {
                    channels.push(Read);
                }
                if mode.contains(['w', 'a', 'x', '+']) {
                    channels.push(Write);
                }
                if channels.is_empty() {
                    channels.push(Read);
                }
                channels
            }
        }
    }

    /// Returns `true` if reading the attribute `path` (or anything under
    /// it) is nondeterministic.
    pub fn nondeterministic_access(&self, path: &str) -> bool {
        self.on_access.iter().any(|known| {
            path == known
                || path
                    .strip_prefix(known.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}
