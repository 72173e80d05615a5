use super::champ::{Champ, Identity, Iter, TrieNode};
use crate::graph::NodeKey;
use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// An immutable hash set with structural sharing.
pub struct PSet<T> {
    trie: Champ<T, Identity>,
}

impl<T: Hash + Eq> PSet<T> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { trie: Champ::new() }
    }

    pub(crate) fn from_root(root: Arc<TrieNode<T>>) -> Self {
        Self {
            trie: Champ::from_root(root),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.trie.len()
    }

    /// Returns true if the set holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `value` is in the set.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.trie.get(value).is_some()
    }

    /// Iterates over the elements in trie order.
    pub fn iter(&self) -> Iter<'_, T> {
        self.trie.iter()
    }

    /// The root node handle.
    pub fn root(&self) -> &Arc<TrieNode<T>> {
        self.trie.root()
    }

    /// Identity of the root node.
    pub fn identity(&self) -> NodeKey {
        NodeKey::of(self.trie.root())
    }

    /// Returns true if both sets share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.trie.root(), other.trie.root())
    }
}

impl<T: Hash + Eq + Clone> PSet<T> {
    /// Returns a set that also contains `value`.
    pub fn insert(&self, value: T) -> Self {
        Self {
            trie: self.trie.insert(value),
        }
    }

    /// Returns a set without `value`.
    pub fn remove<Q>(&self, value: &Q) -> Self
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Self {
            trie: self.trie.remove(value),
        }
    }

    /// Builds a set from `declared` elements, failing with
    /// [`PersistError::DuplicateKeyOnLoad`](crate::PersistError::DuplicateKeyOnLoad) if
    /// some of them are equal.
    pub fn from_elements<I: IntoIterator<Item = T>>(
        elements: I,
        declared: usize,
    ) -> crate::Result<Self> {
        Champ::from_elements(elements, declared).map(|trie| Self { trie })
    }
}

impl<T> Clone for PSet<T> {
    fn clone(&self) -> Self {
        Self {
            trie: self.trie.clone(),
        }
    }
}

impl<T: Hash + Eq> Default for PSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq + Clone> FromIterator<T> for PSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |set, value| set.insert(value))
    }
}

impl<'a, T: Hash + Eq> IntoIterator for &'a PSet<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T: Hash + Eq> PartialEq for PSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.trie == other.trie
    }
}

impl<T: Hash + Eq> Eq for PSet<T> {}

impl<T: Hash + Eq + fmt::Debug> fmt::Debug for PSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Hash + Eq + Serialize> Serialize for PSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for value in self {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de, T: Hash + Eq + Clone + Deserialize<'de>> Deserialize<'de> for PSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<T>::deserialize(deserializer)?;
        let declared = values.len();
        Self::from_elements(values, declared).map_err(D::Error::custom)
    }
}
