use std::fmt;
use std::sync::Arc;

/// Identity of a live collection node, used as the deduplication key of a save walk.
///
/// The key is the address of the shared allocation behind an `Arc`. Two handles to the
/// same node yield equal keys no matter how the node was reached; two nodes with equal
/// content yield different keys. Keys are never serialized.
///
/// An address is only unique while the allocation is alive, so every table keyed by
/// `NodeKey` must also retain a clone of the `Arc` it was taken from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    /// Returns the identity of the node behind `node`.
    pub fn of<T: ?Sized>(node: &Arc<T>) -> Self {
        Self(Arc::as_ptr(node) as *const () as usize)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity_equal_content_does_not() {
        let a = Arc::new(vec![1, 2, 3]);
        let b = Arc::clone(&a);
        let c = Arc::new(vec![1, 2, 3]);
        assert_eq!(NodeKey::of(&a), NodeKey::of(&b));
        assert_ne!(NodeKey::of(&a), NodeKey::of(&c));
    }
}
