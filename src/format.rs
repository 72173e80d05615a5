//! Defines the encoded layout of a sharepool archive.
//!
//! # Layout
//! An archive is one JSON object:
//!
//! ```text
//! {
//!   "value0": <value tree>,
//!   "pools": {
//!     "<pool name>": { "nodes": [<record>, ...], "roots": { "<root name>": <id> } }
//!   }
//! }
//! ```
//!
//! The position of a record in `nodes` is its [`NodeId`]. Containers inside the value tree,
//! and containers nested in other containers' elements, are written as their root id.
//!
//! ## Records
//! - Sequence: `{"leaf": [<value>, ...]}` or `{"inner": {"children": [<id>, ...], "sizes": [..]}}`
//!   where `sizes[i]` counts the elements of `children[..=i]`.
//! - Hash trie: `{"inner": {"datamap": .., "nodemap": .., "values": [..], "children": [..]}}`
//!   or `{"collision": [<value>, ...]}`. Hashes are never stored.
//! - Box: the boxed value itself.

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record of one [`PVector`](crate::PVector) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeqRecord {
    /// A run of elements.
    Leaf(Vec<Value>),
    /// Child ids with cumulative sizes.
    Inner {
        /// Ids of the child nodes, left to right.
        children: Vec<NodeId>,
        /// Cumulative element counts.
        sizes: Vec<usize>,
    },
}

/// Record of one hash trie node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrieRecord {
    /// Bitmap-indexed node.
    Inner {
        /// Slots holding inline values.
        datamap: u32,
        /// Slots holding children.
        nodemap: u32,
        /// Inline values, ordered by slot.
        values: Vec<Value>,
        /// Child ids, ordered by slot.
        children: Vec<NodeId>,
    },
    /// Values with equal hashes.
    Collision(Vec<Value>),
}

/// The encoded pool of one container type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolData {
    /// Records indexed by [`NodeId`].
    pub nodes: Vec<Value>,
    /// Named roots stored in this pool.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roots: BTreeMap<String, NodeId>,
}

impl PoolData {
    /// The record for `id`.
    pub fn node(&self, id: NodeId) -> Option<&Value> {
        self.nodes.get(id.index())
    }
}

/// A complete archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The top-level value tree.
    #[serde(default)]
    pub value0: Value,
    /// Pools by name.
    #[serde(default)]
    pub pools: BTreeMap<String, PoolData>,
}
