use super::champ::{Champ, Iter, KeyFn, TrieNode};
use crate::graph::NodeKey;
use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// An element of a [`PTable`], which carries its own key.
///
/// ```rust
/// use sharepool::{PTable, TableEntry};
///
/// #[derive(Clone, PartialEq, Debug)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// impl TableEntry for User {
///     type Key = u64;
///     fn table_key(&self) -> &u64 {
///         &self.id
///     }
/// }
///
/// let users = PTable::new().insert(User { id: 7, name: "ann".into() });
/// assert_eq!(users.get(&7).map(|u| u.name.as_str()), Some("ann"));
/// ```
pub trait TableEntry {
    /// The key the table is indexed by.
    type Key: Hash + Eq;

    /// Returns the key of this element.
    fn table_key(&self) -> &Self::Key;
}

pub(crate) struct TableKey;

impl<T: TableEntry> KeyFn<T> for TableKey {
    type Key = T::Key;

    fn key(entry: &T) -> &T::Key {
        entry.table_key()
    }
}

/// An immutable table: a hash set of elements indexed by the key they carry.
pub struct PTable<T> {
    trie: Champ<T, TableKey>,
}

impl<T: TableEntry> PTable<T> {
    /// Creates an empty table.
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

    /// Returns true if the table holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element indexed by `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.trie.get(key)
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

    /// Returns true if both tables share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.trie.root(), other.trie.root())
    }
}

impl<T: TableEntry + Clone> PTable<T> {
    /// Returns a table with `value` inserted, replacing the element with the same key.
    pub fn insert(&self, value: T) -> Self {
        Self {
            trie: self.trie.insert(value),
        }
    }

    /// Returns a table without the element indexed by `key`.
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        T::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Self {
            trie: self.trie.remove(key),
        }
    }

    /// Builds a table from `declared` elements, failing with
    /// [`PersistError::DuplicateKeyOnLoad`](crate::PersistError::DuplicateKeyOnLoad) if
    /// two of them carry the same key.
    pub fn from_elements<I: IntoIterator<Item = T>>(
        elements: I,
        declared: usize,
    ) -> crate::Result<Self> {
        Champ::from_elements(elements, declared).map(|trie| Self { trie })
    }
}

impl<T> Clone for PTable<T> {
    fn clone(&self) -> Self {
        Self {
            trie: self.trie.clone(),
        }
    }
}

impl<T: TableEntry> Default for PTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TableEntry + Clone> FromIterator<T> for PTable<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |table, value| table.insert(value))
    }
}

impl<'a, T: TableEntry> IntoIterator for &'a PTable<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T: TableEntry + PartialEq> PartialEq for PTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.trie == other.trie
    }
}

impl<T: TableEntry + Eq> Eq for PTable<T> {}

impl<T: TableEntry + fmt::Debug> fmt::Debug for PTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: TableEntry + Serialize> Serialize for PTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for value in self {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de, T: TableEntry + Clone + Deserialize<'de>> Deserialize<'de> for PTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<T>::deserialize(deserializer)?;
        let declared = values.len();
        Self::from_elements(values, declared).map_err(D::Error::custom)
    }
}
