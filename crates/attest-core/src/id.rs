//! Stable ID newtypes for analysis entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `UnitId` cannot be accidentally used where a `ClassId` is expected.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Handle of a function unit in the per-module arena. Maps to a petgraph
/// `NodeIndex<u32>` in the call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Handle of a class declaration in the per-module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl UnitId {
    /// Arena slot for this unit.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ClassId {
    /// Arena slot for this class.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between UnitId and petgraph's NodeIndex<u32>. Call graph nodes are
// added in arena order, so the two indices coincide.

impl From<NodeIndex<u32>> for UnitId {
    fn from(idx: NodeIndex<u32>) -> Self {
        UnitId(idx.index() as u32)
    }
}

impl From<UnitId> for NodeIndex<u32> {
    fn from(id: UnitId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}
