use crate::graph::NodeKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// An immutable, shared single value.
///
/// Cloning a box shares the value; pool persistence stores each distinct box once.
pub struct PBox<T>(Arc<T>);

impl<T> PBox<T> {
    /// Boxes `value`.
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub(crate) fn from_arc(node: Arc<T>) -> Self {
        Self(node)
    }

    /// Borrows the boxed value.
    pub fn get(&self) -> &T {
        &self.0
    }

    /// The shared node handle.
    pub fn node(&self) -> &Arc<T> {
        &self.0
    }

    /// Identity of the shared node.
    pub fn identity(&self) -> NodeKey {
        NodeKey::of(&self.0)
    }

    /// Returns true if both boxes share the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a box holding `f` applied to the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Self {
        Self::new(f(&self.0))
    }
}

impl<T> Deref for PBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for PBox<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for PBox<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq> PartialEq for PBox<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl<T: Eq> Eq for PBox<T> {}

impl<T: Hash> Hash for PBox<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for PBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Serialize> Serialize for PBox<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for PBox<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::new)
    }
}
