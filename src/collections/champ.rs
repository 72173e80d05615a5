//! Compressed hash array mapped prefix trie shared by [`PSet`](super::PSet),
//! [`PMap`](super::PMap) and [`PTable`](super::PTable).
//!
//! Every level consumes [`BITS`] bits of the 64-bit element hash. An inner node keeps two
//! bitmaps: `datamap` marks slots holding an inline element, `nodemap` marks slots holding a
//! child node. Elements whose full hashes are equal end up in a collision node once all
//! hash bits are used. The layout is canonical: a sub-trie holding a single element is
//! always inlined into its parent.

use crate::PersistError;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use twox_hash::XxHash64;

/// Hash bits consumed per trie level.
pub const BITS: u32 = 5;
/// Depth at which every hash bit is consumed and collision nodes take over.
pub const MAX_DEPTH: u32 = 13;

const SLOT_MASK: u64 = (1 << BITS) - 1;

/// Hashes a key with the hash function every hash-keyed container uses.
pub(crate) fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    key.hash(&mut hasher);
    hasher.finish()
}

/// Slot selected by `hash` at `depth`.
pub(crate) fn mask(hash: u64, depth: u32) -> u32 {
    ((hash >> (depth * BITS)) & SLOT_MASK) as u32
}

/// Position of the entry for `bit` in the dense array described by `bitmap`.
pub(crate) fn slot_index(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

/// Bits of a hash fixed by the path leading to a node at `depth`.
pub(crate) fn prefix_mask(depth: u32) -> u64 {
    let bits = depth * BITS;
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// A node of a hash trie.
#[derive(Debug)]
pub enum TrieNode<E> {
    /// Bitmap-indexed node.
    Inner {
        /// Slots holding an inline element.
        datamap: u32,
        /// Slots holding a child node.
        nodemap: u32,
        /// Inline elements, ordered by slot.
        values: Vec<E>,
        /// Child nodes, ordered by slot.
        children: Vec<Arc<TrieNode<E>>>,
    },
    /// Elements whose full hashes are equal.
    Collision(Vec<E>),
}

impl<E> TrieNode<E> {
    pub(crate) fn empty() -> Self {
        TrieNode::Inner {
            datamap: 0,
            nodemap: 0,
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Elements stored directly in this node.
    pub fn values(&self) -> &[E] {
        match self {
            TrieNode::Inner { values, .. } => values,
            TrieNode::Collision(values) => values,
        }
    }

    /// Child nodes of this node.
    pub fn children(&self) -> &[Arc<TrieNode<E>>] {
        match self {
            TrieNode::Inner { children, .. } => children,
            TrieNode::Collision(_) => &[],
        }
    }

    /// Number of elements below this node.
    pub fn count(&self) -> usize {
        self.values().len() + self.children().iter().map(|c| c.count()).sum::<usize>()
    }
}

/// Extracts the hashed key of a trie element.
pub(crate) trait KeyFn<E> {
    type Key: Hash + Eq;

    fn key(entry: &E) -> &Self::Key;
}

/// The element is its own key.
pub(crate) struct Identity;

impl<T: Hash + Eq> KeyFn<T> for Identity {
    type Key = T;

    fn key(entry: &T) -> &T {
        entry
    }
}

/// The key is the first half of a pair.
pub(crate) struct First;

impl<K: Hash + Eq, V> KeyFn<(K, V)> for First {
    type Key = K;

    fn key(entry: &(K, V)) -> &K {
        &entry.0
    }
}

/// Trie of elements keyed through `KF`.
pub(crate) struct Champ<E, KF> {
    root: Arc<TrieNode<E>>,
    size: usize,
    _key: PhantomData<fn() -> KF>,
}

impl<E, KF> Clone for Champ<E, KF> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            size: self.size,
            _key: PhantomData,
        }
    }
}

enum Removal<E> {
    Missing,
    Replaced(TrieNode<E>),
    Collapsed(E),
    Emptied,
}

impl<E, KF: KeyFn<E>> Champ<E, KF> {
    pub(crate) fn new() -> Self {
        Self::from_root(Arc::new(TrieNode::empty()))
    }

    /// Rebuilds a trie around an existing root node.
    pub(crate) fn from_root(root: Arc<TrieNode<E>>) -> Self {
        let size = root.count();
        Self {
            root,
            size,
            _key: PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.size
    }

    pub(crate) fn root(&self) -> &Arc<TrieNode<E>> {
        &self.root
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&E>
    where
        KF::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(key);
        let mut node = &*self.root;
        let mut depth = 0;
        loop {
            match node {
                TrieNode::Inner {
                    datamap,
                    nodemap,
                    values,
                    children,
                } => {
                    if depth >= MAX_DEPTH {
                        return None;
                    }
                    let bit = 1u32 << mask(hash, depth);
                    if datamap & bit != 0 {
                        let entry = values.get(slot_index(*datamap, bit))?;
                        return (KF::key(entry).borrow() == key).then_some(entry);
                    }
                    if nodemap & bit == 0 {
                        return None;
                    }
                    node = children.get(slot_index(*nodemap, bit))?;
                    depth += 1;
                }
                TrieNode::Collision(values) => {
                    return values.iter().find(|e| KF::key(e).borrow() == key);
                }
            }
        }
    }

    pub(crate) fn iter(&self) -> Iter<'_, E> {
        Iter {
            stack: vec![self.root.children().iter()],
            values: self.root.values().iter(),
            remaining: self.size,
        }
    }
}

impl<E: Clone, KF: KeyFn<E>> Champ<E, KF> {
    /// Returns a trie with `entry` added, replacing any element with the same key.
    pub(crate) fn insert(&self, entry: E) -> Self {
        let hash = hash_key(KF::key(&entry));
        let (root, added) = insert_node::<E, KF>(&self.root, hash, entry, 0);
        Self {
            root: Arc::new(root),
            size: self.size + usize::from(added),
            _key: PhantomData,
        }
    }

    pub(crate) fn remove<Q>(&self, key: &Q) -> Self
    where
        KF::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match remove_node::<E, KF, Q>(&self.root, hash_key(key), key, 0) {
            Removal::Missing => self.clone(),
            Removal::Replaced(root) => Self {
                root: Arc::new(root),
                size: self.size - 1,
                _key: PhantomData,
            },
            Removal::Collapsed(entry) => Self::new().insert(entry),
            Removal::Emptied => Self::new(),
        }
    }

    /// Builds a trie from `declared` elements, failing if some of them share a key.
    pub(crate) fn from_elements<I>(elements: I, declared: usize) -> crate::Result<Self>
    where
        I: IntoIterator<Item = E>,
    {
        let trie = elements
            .into_iter()
            .fold(Self::new(), |trie, entry| trie.insert(entry));
        if trie.len() != declared {
            return Err(PersistError::DuplicateKeyOnLoad(format!(
                "{declared} elements declared, {} distinct keys found",
                trie.len()
            )));
        }
        Ok(trie)
    }
}

impl<E: PartialEq, KF: KeyFn<E>> PartialEq for Champ<E, KF> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.root, &other.root) {
            return true;
        }
        self.len() == other.len()
            && self
                .iter()
                .all(|e| other.get(KF::key(e)).is_some_and(|o| o == e))
    }
}

fn insert_node<E: Clone, KF: KeyFn<E>>(
    node: &TrieNode<E>,
    hash: u64,
    entry: E,
    depth: u32,
) -> (TrieNode<E>, bool) {
    match node {
        TrieNode::Collision(values) => {
            let mut values = values.clone();
            let added = match values.iter().position(|v| KF::key(v) == KF::key(&entry)) {
                Some(i) => {
                    values[i] = entry;
                    false
                }
                None => {
                    values.push(entry);
                    true
                }
            };
            (TrieNode::Collision(values), added)
        }
        TrieNode::Inner { .. } if depth >= MAX_DEPTH => {
            let bucket = TrieNode::Collision(entries_below(node));
            insert_node::<E, KF>(&bucket, hash, entry, depth)
        }
        TrieNode::Inner {
            datamap,
            nodemap,
            values,
            children,
        } => {
            let bit = 1u32 << mask(hash, depth);
            if datamap & bit != 0 {
                let idx = slot_index(*datamap, bit);
                let existing = &values[idx];
                let mut values = values.clone();
                if KF::key(existing) == KF::key(&entry) {
                    values[idx] = entry;
                    let node = TrieNode::Inner {
                        datamap: *datamap,
                        nodemap: *nodemap,
                        values,
                        children: children.clone(),
                    };
                    return (node, false);
                }
                let existing_hash = hash_key(KF::key(existing));
                let sub = merge_entries(values.remove(idx), existing_hash, entry, hash, depth + 1);
                let nodemap = nodemap | bit;
                let mut children = children.clone();
                children.insert(slot_index(nodemap, bit), Arc::new(sub));
                let node = TrieNode::Inner {
                    datamap: datamap & !bit,
                    nodemap,
                    values,
                    children,
                };
                (node, true)
            } else if nodemap & bit != 0 {
                let idx = slot_index(*nodemap, bit);
                let (child, added) = insert_node::<E, KF>(&children[idx], hash, entry, depth + 1);
                let mut children = children.clone();
                children[idx] = Arc::new(child);
                let node = TrieNode::Inner {
                    datamap: *datamap,
                    nodemap: *nodemap,
                    values: values.clone(),
                    children,
                };
                (node, added)
            } else {
                let datamap = datamap | bit;
                let mut values = values.clone();
                values.insert(slot_index(datamap, bit), entry);
                let node = TrieNode::Inner {
                    datamap,
                    nodemap: *nodemap,
                    values,
                    children: children.clone(),
                };
                (node, true)
            }
        }
    }
}

/// Every element stored at or below `node`.
fn entries_below<E: Clone>(node: &TrieNode<E>) -> Vec<E> {
    let mut entries = Vec::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        match node {
            TrieNode::Inner {
                values, children, ..
            } => {
                entries.extend(values.iter().cloned());
                stack.extend(children.iter().map(|child| &**child));
            }
            TrieNode::Collision(values) => entries.extend(values.iter().cloned()),
        }
    }
    entries
}

fn merge_entries<E>(a: E, hash_a: u64, b: E, hash_b: u64, depth: u32) -> TrieNode<E> {
    if depth >= MAX_DEPTH {
        return TrieNode::Collision(vec![a, b]);
    }
    let (slot_a, slot_b) = (mask(hash_a, depth), mask(hash_b, depth));
    if slot_a == slot_b {
        let child = merge_entries(a, hash_a, b, hash_b, depth + 1);
        return TrieNode::Inner {
            datamap: 0,
            nodemap: 1 << slot_a,
            values: Vec::new(),
            children: vec![Arc::new(child)],
        };
    }
    let values = if slot_a < slot_b { vec![a, b] } else { vec![b, a] };
    TrieNode::Inner {
        datamap: (1 << slot_a) | (1 << slot_b),
        nodemap: 0,
        values,
        children: Vec::new(),
    }
}

fn remove_node<E: Clone, KF: KeyFn<E>, Q>(
    node: &TrieNode<E>,
    hash: u64,
    key: &Q,
    depth: u32,
) -> Removal<E>
where
    KF::Key: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    match node {
        TrieNode::Collision(values) => {
            let Some(pos) = values.iter().position(|v| KF::key(v).borrow() == key) else {
                return Removal::Missing;
            };
            let mut values = values.clone();
            values.remove(pos);
            if values.len() > 1 {
                return Removal::Replaced(TrieNode::Collision(values));
            }
            match values.pop() {
                Some(last) => Removal::Collapsed(last),
                None => Removal::Emptied,
            }
        }
        // Lookups stop here too, so nothing below is reachable by key.
        TrieNode::Inner { .. } if depth >= MAX_DEPTH => Removal::Missing,
        TrieNode::Inner {
            datamap,
            nodemap,
            values,
            children,
        } => {
            let bit = 1u32 << mask(hash, depth);
            if datamap & bit != 0 {
                let idx = slot_index(*datamap, bit);
                if KF::key(&values[idx]).borrow() != key {
                    return Removal::Missing;
                }
                let mut values = values.clone();
                values.remove(idx);
                let node = TrieNode::Inner {
                    datamap: datamap & !bit,
                    nodemap: *nodemap,
                    values,
                    children: children.clone(),
                };
                return collapse(node, depth);
            }
            if nodemap & bit == 0 {
                return Removal::Missing;
            }
            let idx = slot_index(*nodemap, bit);
            match remove_node::<E, KF, Q>(&children[idx], hash, key, depth + 1) {
                Removal::Missing => Removal::Missing,
                Removal::Replaced(child) => {
                    let mut children = children.clone();
                    children[idx] = Arc::new(child);
                    Removal::Replaced(TrieNode::Inner {
                        datamap: *datamap,
                        nodemap: *nodemap,
                        values: values.clone(),
                        children,
                    })
                }
                Removal::Emptied => {
                    let mut children = children.clone();
                    children.remove(idx);
                    let node = TrieNode::Inner {
                        datamap: *datamap,
                        nodemap: nodemap & !bit,
                        values: values.clone(),
                        children,
                    };
                    collapse(node, depth)
                }
                Removal::Collapsed(entry) => {
                    if depth > 0 && values.is_empty() && children.len() == 1 {
                        return Removal::Collapsed(entry);
                    }
                    let mut children = children.clone();
                    children.remove(idx);
                    let datamap = datamap | bit;
                    let mut values = values.clone();
                    values.insert(slot_index(datamap, bit), entry);
                    Removal::Replaced(TrieNode::Inner {
                        datamap,
                        nodemap: nodemap & !bit,
                        values,
                        children,
                    })
                }
            }
        }
    }
}

/// Hands a lone element of a non-root node up to its parent.
fn collapse<E>(node: TrieNode<E>, depth: u32) -> Removal<E> {
    match node {
        TrieNode::Inner {
            mut values,
            children,
            ..
        } if depth > 0 && children.is_empty() && values.len() <= 1 => match values.pop() {
            Some(entry) => Removal::Collapsed(entry),
            None => Removal::Emptied,
        },
        other => Removal::Replaced(other),
    }
}

/// Borrowing iterator over the elements of a trie, in trie order.
#[derive(Debug)]
pub struct Iter<'a, E> {
    stack: Vec<std::slice::Iter<'a, Arc<TrieNode<E>>>>,
    values: std::slice::Iter<'a, E>,
    remaining: usize,
}

impl<'a, E> Iterator for Iter<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        loop {
            if let Some(entry) = self.values.next() {
                self.remaining = self.remaining.saturating_sub(1);
                return Some(entry);
            }
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(child) => {
                    self.values = child.values().iter();
                    self.stack.push(child.children().iter());
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<E> ExactSizeIterator for Iter<'_, E> {}

#[cfg(test)]
mod tests {
    use super::*;

    type Trie = Champ<u64, Identity>;

    #[test]
    fn insert_get_remove() {
        let trie = (0..500u64).fold(Trie::new(), |t, i| t.insert(i));
        assert_eq!(trie.len(), 500);
        assert_eq!(trie.iter().count(), 500);
        assert_eq!(trie.get(&42), Some(&42));
        assert_eq!(trie.get(&500), None);

        let smaller = trie.remove(&42);
        assert_eq!(smaller.len(), 499);
        assert_eq!(smaller.get(&42), None);
        assert_eq!(trie.get(&42), Some(&42));
        assert!(Arc::ptr_eq(trie.remove(&9999).root(), trie.root()));
    }

    #[test]
    fn removing_everything_returns_to_empty() {
        let full = (0..100u64).fold(Trie::new(), |t, i| t.insert(i));
        let empty = (0..100u64).fold(full, |t, i| t.remove(&i));
        assert_eq!(empty.len(), 0);
        assert!(empty.root().values().is_empty());
        assert!(empty.root().children().is_empty());
    }

    #[test]
    fn layout_is_independent_of_history() {
        let a = (0..64u64).fold(Trie::new(), |t, i| t.insert(i));
        let b = (0..80u64).rev().fold(Trie::new(), |t, i| t.insert(i));
        let b = (64..80u64).fold(b, |t, i| t.remove(&i));
        assert!(a.iter().eq(b.iter()));
    }

    #[test]
    fn duplicates_are_reported() {
        let err = Trie::from_elements([1, 2, 2, 3], 4).err();
        assert!(matches!(err, Some(PersistError::DuplicateKeyOnLoad(_))));
        assert!(Trie::from_elements([1, 2, 3], 3).is_ok());
    }

    #[test]
    fn prefix_mask_covers_all_bits_at_max_depth() {
        assert_eq!(prefix_mask(0), 0);
        assert_eq!(prefix_mask(1), 0b11111);
        assert_eq!(prefix_mask(MAX_DEPTH), u64::MAX);
    }

    /// A chain of inner nodes along the hash path of `key`, ending in an inner node at
    /// `MAX_DEPTH` that holds `stray`.
    fn overdeep_trie(key: u64, stray: u64) -> Trie {
        let hash = hash_key(&key);
        let mut node = TrieNode::Inner {
            datamap: 1,
            nodemap: 0,
            values: vec![stray],
            children: Vec::new(),
        };
        for depth in (0..MAX_DEPTH).rev() {
            node = TrieNode::Inner {
                datamap: 0,
                nodemap: 1 << mask(hash, depth),
                values: Vec::new(),
                children: vec![Arc::new(node)],
            };
        }
        Trie::from_root(Arc::new(node))
    }

    #[test]
    fn inner_nodes_past_max_depth_do_not_overflow() {
        let trie = overdeep_trie(1_000, 7);
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get(&1_000), None);

        let unchanged = trie.remove(&1_000);
        assert_eq!(unchanged.len(), 1);
        assert!(Arc::ptr_eq(unchanged.root(), trie.root()));

        let grown = trie.insert(1_000);
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.get(&1_000), Some(&1_000));
        let again = grown.insert(1_000);
        assert_eq!(again.len(), 2);
        assert_eq!(grown.remove(&1_000).get(&1_000), None);
    }
}
