//! Persistent vector with relaxed, size-annotated inner nodes.
//!
//! Updates copy the path from the root to the touched leaf and share every other node
//! with the previous version. Inner nodes keep cumulative child sizes, so positional
//! lookup never rescans children and subtrees of different heights can be joined in
//! constant time by [`PVector::concat`].

use crate::graph::NodeKey;
use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum number of children of an inner node.
pub const BRANCHES: usize = 32;
/// Maximum number of elements stored in one leaf.
pub const LEAF_CAPACITY: usize = 8;

/// A node of a [`PVector`].
#[derive(Debug)]
pub enum VecNode<T> {
    /// A contiguous run of elements.
    Leaf(Vec<T>),
    /// Ordered children, with `sizes[i]` the number of elements in `children[..=i]`.
    Inner {
        /// Child nodes, left to right.
        children: Vec<Arc<VecNode<T>>>,
        /// Cumulative element counts.
        sizes: Vec<usize>,
    },
}

impl<T> VecNode<T> {
    /// Builds an inner node, computing the cumulative sizes of `children`.
    pub fn inner(children: Vec<Arc<VecNode<T>>>) -> Self {
        let mut total = 0;
        let sizes = children
            .iter()
            .map(|c| {
                total += c.len();
                total
            })
            .collect();
        VecNode::Inner { children, sizes }
    }

    /// Number of elements below this node.
    pub fn len(&self) -> usize {
        match self {
            VecNode::Leaf(items) => items.len(),
            VecNode::Inner { sizes, .. } => sizes.last().copied().unwrap_or(0),
        }
    }

    /// Returns true if no element lives below this node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locates the child holding `index`, returning it with the index relative to it.
    fn child_for(&self, index: usize) -> Option<(usize, usize)> {
        match self {
            VecNode::Leaf(_) => None,
            VecNode::Inner { sizes, .. } => {
                let slot = sizes.partition_point(|&s| s <= index);
                if slot >= sizes.len() {
                    return None;
                }
                let offset = if slot == 0 { 0 } else { sizes[slot - 1] };
                Some((slot, index - offset))
            }
        }
    }
}

/// An immutable vector with structural sharing.
pub struct PVector<T> {
    root: Arc<VecNode<T>>,
}

impl<T> PVector<T> {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self {
            root: Arc::new(VecNode::Leaf(Vec::new())),
        }
    }

    /// Rebuilds a vector around an existing root node.
    pub(crate) fn from_root(root: Arc<VecNode<T>>) -> Self {
        Self { root }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Returns true if the vector holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the element at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        let mut node = &self.root;
        let mut index = index;
        loop {
            match &**node {
                VecNode::Leaf(items) => return items.get(index),
                VecNode::Inner { children, .. } => {
                    let (slot, rel) = node.child_for(index)?;
                    node = children.get(slot)?;
                    index = rel;
                }
            }
        }
    }

    /// The root node handle.
    pub fn root(&self) -> &Arc<VecNode<T>> {
        &self.root
    }

    /// Identity of the root node.
    pub fn identity(&self) -> NodeKey {
        NodeKey::of(&self.root)
    }

    /// Returns true if both vectors share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Joins two vectors without copying either one.
    pub fn concat(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Self {
            root: Arc::new(VecNode::inner(vec![
                Arc::clone(&self.root),
                Arc::clone(&other.root),
            ])),
        }
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> Iter<'_, T> {
        let (leaf, stack): (&[T], _) = match &*self.root {
            VecNode::Leaf(items) => (items, Vec::new()),
            VecNode::Inner { children, .. } => (&[], vec![children.iter()]),
        };
        Iter {
            stack,
            leaf: leaf.iter(),
            remaining: self.len(),
        }
    }
}

impl<T: Clone> PVector<T> {
    /// Returns a new vector with `value` appended.
    pub fn push_back(&self, value: T) -> Self {
        let (root, overflow) = push_node(&self.root, value);
        let root = match overflow {
            None => root,
            Some(extra) => Arc::new(VecNode::inner(vec![root, extra])),
        };
        Self { root }
    }

    /// Returns a new vector with the element at `index` replaced, or `None` when the
    /// index is out of bounds.
    pub fn set(&self, index: usize, value: T) -> Option<Self> {
        if index >= self.len() {
            return None;
        }
        set_node(&self.root, index, value).map(|root| Self { root })
    }
}

fn push_node<T: Clone>(
    node: &Arc<VecNode<T>>,
    value: T,
) -> (Arc<VecNode<T>>, Option<Arc<VecNode<T>>>) {
    match &**node {
        VecNode::Leaf(items) if items.len() < LEAF_CAPACITY => {
            let mut items = items.clone();
            items.push(value);
            (Arc::new(VecNode::Leaf(items)), None)
        }
        VecNode::Leaf(_) => (Arc::clone(node), Some(Arc::new(VecNode::Leaf(vec![value])))),
        VecNode::Inner { children, .. } => {
            let mut kids = children.clone();
            let Some(last) = kids.pop() else {
                let leaf = Arc::new(VecNode::Leaf(vec![value]));
                return (Arc::new(VecNode::inner(vec![leaf])), None);
            };
            let (new_last, overflow) = push_node(&last, value);
            kids.push(new_last);
            match overflow {
                None => (Arc::new(VecNode::inner(kids)), None),
                Some(extra) if kids.len() < BRANCHES => {
                    kids.push(extra);
                    (Arc::new(VecNode::inner(kids)), None)
                }
                Some(extra) => (
                    Arc::new(VecNode::inner(kids)),
                    Some(Arc::new(VecNode::inner(vec![extra]))),
                ),
            }
        }
    }
}

fn set_node<T: Clone>(node: &Arc<VecNode<T>>, index: usize, value: T) -> Option<Arc<VecNode<T>>> {
    match &**node {
        VecNode::Leaf(items) => {
            let mut items = items.clone();
            *items.get_mut(index)? = value;
            Some(Arc::new(VecNode::Leaf(items)))
        }
        VecNode::Inner { children, sizes } => {
            let (slot, rel) = node.child_for(index)?;
            let mut kids = children.clone();
            let child = kids.get_mut(slot)?;
            *child = set_node(child, rel, value)?;
            Some(Arc::new(VecNode::Inner {
                children: kids,
                sizes: sizes.clone(),
            }))
        }
    }
}

/// Borrowing iterator over a [`PVector`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    stack: Vec<std::slice::Iter<'a, Arc<VecNode<T>>>>,
    leaf: std::slice::Iter<'a, T>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            if let Some(item) = self.leaf.next() {
                self.remaining -= 1;
                return Some(item);
            }
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(child) => match &**child {
                    VecNode::Leaf(items) => self.leaf = items.iter(),
                    VecNode::Inner { children, .. } => self.stack.push(children.iter()),
                },
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

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a PVector<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> FromIterator<T> for PVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut level: Vec<Arc<VecNode<T>>> = Vec::new();
        let mut current = Vec::with_capacity(LEAF_CAPACITY);
        for item in iter {
            current.push(item);
            if current.len() == LEAF_CAPACITY {
                let full = std::mem::replace(&mut current, Vec::with_capacity(LEAF_CAPACITY));
                level.push(Arc::new(VecNode::Leaf(full)));
            }
        }
        if !current.is_empty() {
            level.push(Arc::new(VecNode::Leaf(current)));
        }
        while level.len() > 1 {
            level = level
                .chunks(BRANCHES)
                .map(|group| Arc::new(VecNode::inner(group.to_vec())))
                .collect();
        }
        match level.pop() {
            Some(root) => Self { root },
            None => Self::new(),
        }
    }
}

impl<T> Clone for PVector<T> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
        }
    }
}

impl<T> Default for PVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for PVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.len() == other.len() && self.iter().eq(other.iter()))
    }
}

impl<T: Eq> Eq for PVector<T> {}

impl<T: fmt::Debug> fmt::Debug for PVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Serialize> Serialize for PVector<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for PVector<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
