use serde::{Deserialize, Serialize};
use std::fmt;

/// A strong type identifying one node inside one pool.
///
/// Ids are assigned in first-discovery order during a save walk and double as the index
/// of the node in the encoded node list. They are only meaningful together with the pool
/// that issued them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32); // u32 is sufficient for 4 billion nodes per pool.

impl NodeId {
    /// Creates a new NodeId.
    /// Restricted to the crate so ids only come from pools or decoded archives.
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Converts a node-list index into an id.
    pub(crate) fn from_index(index: usize) -> crate::Result<Self> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| crate::PersistError::Internal(format!("pool overflow at node {index}")))
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the id as a node-list index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
