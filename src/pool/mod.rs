//! Pool sets: the write side ([`OutputPools`]) and the read side ([`InputPools`]).
//!
//! A pool holds every distinct node of one container type, addressed by [`NodeId`]. The
//! output side deduplicates nodes by identity while walking live collections; the input
//! side materializes every record once, so sharing in the archive becomes sharing in
//! memory again.

use crate::graph::{NodeId, NodeKey};
use std::any::TypeId;

mod containers;
/// Read side of the pool engine.
pub mod input;
/// Write side of the pool engine.
pub mod output;
pub(crate) mod validate;

pub use input::InputPools;
pub use output::OutputPools;

/// Maps live nodes back to the ids they have in a pool set.
///
/// Implemented by both pool sets, so a conversion can run over a freshly saved graph as
/// well as over a loaded one.
pub trait NodeSource {
    /// The id of the node identified by `key` in the pool of container type `type_id`.
    fn node_id(&self, type_id: TypeId, key: NodeKey) -> Option<NodeId>;
}
