//! Immutable, structurally shared collections.
//!
//! Every collection is a handle to a root node behind an `Arc`. Updates return a new
//! handle and share every untouched node with the previous version, so cloning is O(1)
//! and comparing roots with `ptr_eq` tells whether two collections are the same version.
//! The node handles are public because the pool engine persists sharing by node identity.

/// Single shared value.
pub mod boxed;
/// Hash trie backing the hash-keyed collections.
pub mod champ;
/// Hash map.
pub mod map;
/// Hash set.
pub mod set;
/// Keyed table.
pub mod table;
/// Relaxed tree vector.
pub mod vector;

pub use boxed::PBox;
pub use champ::TrieNode;
pub use map::PMap;
pub use set::PSet;
pub use table::{PTable, TableEntry};
pub use vector::{PVector, VecNode};
