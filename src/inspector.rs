// src/inspector.rs

//! Tools for inspecting the pools of a sharepool archive.
//! Useful for checking how much structure two saved values share.

use crate::error::Result;
use crate::format::{Document, PoolData};
use crate::graph::NodeId;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// A structural report of an archive.
#[derive(Debug, Serialize)]
pub struct DebugReport {
    /// Number of nodes across all pools.
    pub total_nodes: usize,
    /// One entry per pool, ordered by name.
    pub pools: Vec<PoolInfo>,
}

/// Summary of one pool.
#[derive(Debug, Default, Serialize)]
pub struct PoolInfo {
    /// Pool name.
    pub name: String,
    /// Number of records.
    pub node_count: usize,
    /// Sequence leaves.
    pub leaves: usize,
    /// Sequence inner nodes.
    pub branches: usize,
    /// Bitmap-indexed trie nodes.
    pub trie_nodes: usize,
    /// Trie collision nodes.
    pub collisions: usize,
    /// Records of any other shape, such as boxed values.
    pub values: usize,
    /// Named roots.
    pub roots: Vec<(String, NodeId)>,
}

/// The sharepool inspector tool.
#[derive(Debug)]
pub struct PoolInspector;

impl PoolInspector {
    /// Analyzes an encoded archive.
    pub fn inspect_bytes(bytes: &[u8]) -> Result<DebugReport> {
        crate::archive::decode(bytes).map(|doc| Self::inspect_document(&doc))
    }

    /// Analyzes an archive file.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<DebugReport> {
        crate::io::read_document(path.as_ref()).map(|doc| Self::inspect_document(&doc))
    }

    /// Analyzes a decoded archive.
    pub fn inspect_document(doc: &Document) -> DebugReport {
        let pools: Vec<PoolInfo> = doc
            .pools
            .iter()
            .map(|(name, pool)| Self::inspect_pool(name, pool))
            .collect();
        DebugReport {
            total_nodes: pools.iter().map(|p| p.node_count).sum(),
            pools,
        }
    }

    fn inspect_pool(name: &str, pool: &PoolData) -> PoolInfo {
        let mut info = PoolInfo {
            name: name.to_owned(),
            node_count: pool.nodes.len(),
            roots: pool.roots.iter().map(|(n, id)| (n.clone(), *id)).collect(),
            ..PoolInfo::default()
        };
        for record in &pool.nodes {
            match Self::shape(record) {
                Shape::Leaf => info.leaves += 1,
                Shape::Branch => info.branches += 1,
                Shape::TrieNode => info.trie_nodes += 1,
                Shape::Collision => info.collisions += 1,
                Shape::Value => info.values += 1,
            }
        }
        info
    }

    fn shape(record: &Value) -> Shape {
        let Some(object) = record.as_object().filter(|o| o.len() == 1) else {
            return Shape::Value;
        };
        match (object.get("leaf"), object.get("inner"), object.get("collision")) {
            (Some(Value::Array(_)), _, _) => Shape::Leaf,
            (_, Some(inner), _) if inner.get("sizes").is_some() => Shape::Branch,
            (_, Some(inner), _) if inner.get("datamap").is_some() => Shape::TrieNode,
            (_, _, Some(Value::Array(_))) => Shape::Collision,
            _ => Shape::Value,
        }
    }
}

enum Shape {
    Leaf,
    Branch,
    TrieNode,
    Collision,
    Value,
}

impl std::fmt::Display for DebugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== SHAREPOOL INSPECTOR REPORT ===")?;
        writeln!(f, "Total Nodes:    {}", self.total_nodes)?;
        writeln!(f, "\n[POOLS]")?;
        for (i, pool) in self.pools.iter().enumerate() {
            pool.fmt_tree(f, i + 1 == self.pools.len())?;
        }
        Ok(())
    }
}

impl PoolInfo {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, is_last: bool) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        writeln!(
            f,
            "{connector}[{}] Nodes: {} | Leaves: {} | Branches: {} | Trie: {} | \
             Collisions: {} | Values: {}",
            self.name,
            self.node_count,
            self.leaves,
            self.branches,
            self.trie_nodes,
            self.collisions,
            self.values
        )?;
        for (i, (name, id)) in self.roots.iter().enumerate() {
            let root_connector = if i + 1 == self.roots.len() {
                "└── "
            } else {
                "├── "
            };
            writeln!(f, "{child_prefix}{root_connector}root '{name}' -> {id}")?;
        }
        Ok(())
    }
}
