// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use crate::error::{PersistError, Result};
use crate::graph::NodeId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

// --- VALUE TREE ACCESS ---

/// Returns field `name` of the struct `owner` from its value tree.
pub fn field<'v>(node: &'v Value, name: &str, owner: &str) -> Result<&'v Value> {
    let object = node
        .as_object()
        .ok_or_else(|| PersistError::Decode(format!("{owner}: expected an object, found {node}")))?;
    object
        .get(name)
        .ok_or_else(|| PersistError::Decode(format!("{owner}: missing field '{name}'")))
}

/// Reads a container reference.
pub fn node_id(value: &Value) -> Result<NodeId> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .map(NodeId::new)
        .ok_or_else(|| PersistError::Decode(format!("expected a node id, found {value}")))
}

// --- INLINE FIELDS ---

/// Writes a field with plain serde, bypassing the pools.
pub fn save_inline<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Reads a field written by [`save_inline`].
pub fn load_inline<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}
