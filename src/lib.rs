//! # Sharepool
//!
//! Pool-based persistence for structurally shared immutable collections, with schema
//! conversion that keeps the sharing.
//!
//! ## Overview
//!
//! Persistent collections share most of their nodes between versions: pushing onto a
//! vector of a million elements allocates a handful of new nodes and reuses the rest.
//! Serializing such values element by element throws that sharing away. Sharepool instead
//! stores every distinct node once, in a *pool* per container type, and writes containers
//! as references into their pool.
//!
//! ### Key Features
//!
//! *   **Shared nodes stay shared:** saving two versions of a collection costs only the
//!     nodes that differ, and loading restores one in-memory node per stored node.
//! *   **Readable format:** an archive is a JSON document with a top-level value and one
//!     node list per pool.
//! *   **Safe hash containers:** sets, maps and tables are checked against the hashes of
//!     their keys when loaded, so tries built by another hash function are rejected.
//! *   **Schema conversion:** a [`MigrationMap`] turns containers of old types into
//!     containers of new types node by node, converting every shared node once, even for
//!     mutually recursive schemas.
//!
//! ## Core Concepts
//!
//! ### Collections
//!
//! The [`collections`] module provides [`PVector`], [`PSet`], [`PMap`], [`PTable`] and
//! [`PBox`], all immutable and cheap to clone. Their node identity is the address of the
//! `Arc` holding the node.
//!
//! ### Pools
//!
//! [`OutputPools`] assigns ids to nodes while walking live values; [`InputPools`]
//! materializes them lazily from an archive. The [`TypeCatalog`] names the pool of every
//! container type, using the name of the first struct field that reaches it.
//!
//! ### Persist
//!
//! The [`Persist`] trait describes how a type becomes a value tree. The `#[derive(Persist)]`
//! macro implements it for structs with named fields; fields marked `#[persist(inline)]` are
//! written with plain serde instead of through the pools.
//!
//! ## Usage
//!
//! ```rust
//! use sharepool::{PVector, Persist, Sharepool, TypeCatalog};
//!
//! #[derive(Persist, Debug, PartialEq)]
//! struct History {
//!     before: PVector<u32>,
//!     after: PVector<u32>,
//! }
//!
//! let before: PVector<u32> = (0..1000).collect();
//! let after = before.push_back(1000);
//! let history = History { before, after };
//!
//! let catalog = TypeCatalog::discover::<History>();
//! let (bytes, _) = Sharepool::save(&history, &catalog)?;
//! let loaded: History = Sharepool::load(&bytes, &catalog)?;
//! assert_eq!(loaded, history);
//! # Ok::<(), sharepool::PersistError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate is `#![deny(unsafe_code)]`.
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a [`PersistError`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the derive macro's `::sharepool` paths resolve inside this crate's own tests.
extern crate self as sharepool;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod catalog;
pub mod collections;
pub mod convert;
pub mod error;
pub mod format;
pub mod inspector;
pub mod persist;
pub mod pool;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod archive;
#[doc(hidden)]
pub mod graph;
#[doc(hidden)]
pub mod io;

// Private modules
mod persist_impls;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

/// Internal re-exports for the macro to ensure dependencies are available.
#[doc(hidden)]
pub mod internal {
    pub use serde_json;
}

// --- RE-EXPORTS ---

pub use api::{PersistOptions, Sharepool};
pub use catalog::{Members, TypeCatalog};
pub use collections::{PBox, PMap, PSet, PTable, PVector, TableEntry};
pub use convert::{Conversion, ConvertInto, MigrationMap};
pub use error::{PersistError, Result};
pub use graph::{NodeId, NodeKey};
pub use inspector::PoolInspector;
pub use persist::{Container, ContainerKind, Persist};
pub use pool::{InputPools, NodeSource, OutputPools};

// Re-export the derive macro so it is accessible as `sharepool::Persist`
pub use sharepool_derive::Persist;
