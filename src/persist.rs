//! The traits a type implements to take part in pool persistence.
//!
//! [`Persist`] is the per-type contract: how a value becomes a JSON value tree (with every
//! nested container replaced by its root [`NodeId`]) and which member types it reaches.
//! `#[derive(Persist)]` implements it for structs with named fields.
//!
//! [`Container`] is implemented by the five collection types. Containers do not store their
//! content in the value tree; they live in the pool of their type and are referenced by id.

use crate::catalog::Members;
use crate::graph::{NodeId, NodeKey};
use crate::pool::{InputPools, OutputPools};
use crate::Result;
use serde_json::Value;

/// Node layout of a persistable container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Relaxed tree of leaves ([`PVector`](crate::PVector)).
    Sequence,
    /// Bitmap-indexed hash trie ([`PSet`](crate::PSet), [`PMap`](crate::PMap),
    /// [`PTable`](crate::PTable)).
    HashTrie,
    /// A single value ([`PBox`](crate::PBox)).
    Boxed,
}

/// A type that can be written to and read from a pool set.
///
/// # Example
///
/// ```rust
/// use sharepool::{Persist, PVector, Sharepool, TypeCatalog};
///
/// #[derive(Persist, Clone, PartialEq, Debug)]
/// struct Doc {
///     title: String,
///     lines: PVector<String>,
/// }
///
/// let doc = Doc { title: "notes".into(), lines: PVector::new().push_back("hi".into()) };
/// let catalog = TypeCatalog::discover::<Doc>();
/// let (bytes, _) = Sharepool::save(&doc, &catalog)?;
/// assert_eq!(Sharepool::load::<Doc>(&bytes, &catalog)?, doc);
/// # Ok::<(), sharepool::PersistError>(())
/// ```
///
/// Persisted values are `Send + Sync`, so pool sets are as well.
pub trait Persist: Sized + Send + Sync + 'static {
    /// Writes `self` as a value tree, adding any nested containers to `pools`.
    fn save(&self, pools: &mut OutputPools) -> Result<Value>;

    /// Rebuilds a value from its value tree, resolving container ids through `pools`.
    fn load(node: &Value, pools: &mut InputPools) -> Result<Self>;

    /// Reports the persistable member types of `Self` for type discovery.
    fn members(members: &mut Members) {
        let _ = members;
    }

    /// The node layout if `Self` is a container.
    fn container_kind() -> Option<ContainerKind> {
        None
    }
}

/// A structurally shared collection persisted through a pool.
pub trait Container: Persist + Clone {
    /// The element type handed to migration rules. For maps this is the `(key, value)` pair.
    type Element: Persist;

    /// Node layout of this container.
    const KIND: ContainerKind;

    /// Identity of the root node.
    fn identity(&self) -> NodeKey;

    /// Returns true if the container has no element.
    fn is_empty(&self) -> bool;

    /// Adds every node of `self` to its pool and returns the root id.
    #[doc(hidden)]
    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId>;

    /// Materializes the container rooted at `id` from its pool.
    #[doc(hidden)]
    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self>;
}
