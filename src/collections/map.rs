use super::champ::{Champ, First, Iter, TrieNode};
use crate::graph::NodeKey;
use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// An immutable hash map with structural sharing.
///
/// Entries are stored as `(K, V)` pairs; the trie is keyed by the hash of `K`.
pub struct PMap<K, V> {
    trie: Champ<(K, V), First>,
}

impl<K: Hash + Eq, V> PMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self { trie: Champ::new() }
    }

    pub(crate) fn from_root(root: Arc<TrieNode<(K, V)>>) -> Self {
        Self {
            trie: Champ::from_root(root),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.trie.len()
    }

    /// Returns true if the map holds no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.trie.get(key).map(|(_, v)| v)
    }

    /// Returns true if an entry exists for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.trie.get(key).is_some()
    }

    /// Iterates over the entries in trie order.
    pub fn iter(&self) -> Iter<'_, (K, V)> {
        self.trie.iter()
    }

    /// The root node handle.
    pub fn root(&self) -> &Arc<TrieNode<(K, V)>> {
        self.trie.root()
    }

    /// Identity of the root node.
    pub fn identity(&self) -> NodeKey {
        NodeKey::of(self.trie.root())
    }

    /// Returns true if both maps share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.trie.root(), other.trie.root())
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PMap<K, V> {
    /// Returns a map with `value` stored under `key`.
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            trie: self.trie.insert((key, value)),
        }
    }

    /// Returns a map without the entry for `key`.
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Self {
            trie: self.trie.remove(key),
        }
    }

    /// Builds a map from `declared` entries, failing with
    /// [`PersistError::DuplicateKeyOnLoad`](crate::PersistError::DuplicateKeyOnLoad) if
    /// some keys repeat.
    pub fn from_elements<I: IntoIterator<Item = (K, V)>>(
        entries: I,
        declared: usize,
    ) -> crate::Result<Self> {
        Champ::from_elements(entries, declared).map(|trie| Self { trie })
    }
}

impl<K, V> Clone for PMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            trie: self.trie.clone(),
        }
    }
}

impl<K: Hash + Eq, V> Default for PMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FromIterator<(K, V)> for PMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (k, v)| map.insert(k, v))
    }
}

impl<'a, K: Hash + Eq, V> IntoIterator for &'a PMap<K, V> {
    type Item = &'a (K, V);
    type IntoIter = Iter<'a, (K, V)>;

    fn into_iter(self) -> Iter<'a, (K, V)> {
        self.iter()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.trie == other.trie
    }
}

impl<K: Hash + Eq, V: Eq> Eq for PMap<K, V> {}

impl<K: Hash + Eq + fmt::Debug, V: fmt::Debug> fmt::Debug for PMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Hash + Eq + Serialize, V: Serialize> Serialize for PMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct PMapVisitor<K, V>(PhantomData<fn() -> (K, V)>);

impl<'de, K, V> Visitor<'de> for PMapVisitor<K, V>
where
    K: Hash + Eq + Clone + Deserialize<'de>,
    V: Clone + Deserialize<'de>,
{
    type Value = PMap<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry::<K, V>()? {
            entries.push(entry);
        }
        let declared = entries.len();
        PMap::from_elements(entries, declared).map_err(A::Error::custom)
    }
}

impl<'de, K, V> Deserialize<'de> for PMap<K, V>
where
    K: Hash + Eq + Clone + Deserialize<'de>,
    V: Clone + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(PMapVisitor(PhantomData))
    }
}
