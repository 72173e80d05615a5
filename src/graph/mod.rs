//! Node identity for the pool engine.
//!
//! [`NodeId`] names a node inside one pool (it is what ends up on disk), while
//! [`NodeKey`] names a live in-memory node during a single save or conversion walk.

/// Defines the `NodeId` type.
pub mod id;
/// Defines the `NodeKey` identity type.
pub mod identity;

pub use id::NodeId;
pub use identity::NodeKey;
