//! Hash validation of reconstructed tries.
//!
//! Hashes are not stored in the archive. After a trie is rebuilt, every element's hash is
//! recomputed with the current hash function and checked against the path of slots that
//! leads to it. A mismatch means the trie was built for different keys than the ones it
//! holds now, which is what a migration that rewrites keys in place produces.

use crate::collections::champ::{BITS, KeyFn, MAX_DEPTH, TrieNode, hash_key, prefix_mask};
use crate::{PersistError, Result};

fn slots(bitmap: u32) -> impl Iterator<Item = u32> {
    (0..32u32).filter(move |s| bitmap & (1 << s) != 0)
}

/// Checks that every element below `root` sits where its hash leads.
pub(crate) fn validate_trie<E, KF: KeyFn<E>>(root: &TrieNode<E>, pool: &str) -> Result<()> {
    let mut stack = vec![(root, 0u32, 0u64)];
    while let Some((node, depth, prefix)) = stack.pop() {
        match node {
            TrieNode::Inner {
                datamap,
                nodemap,
                values,
                children,
            } => {
                if depth >= MAX_DEPTH {
                    return Err(PersistError::Format(format!(
                        "pool '{pool}': inner node below the maximum trie depth"
                    )));
                }
                let shift = depth * BITS;
                for (slot, value) in slots(*datamap).zip(values) {
                    let hash = hash_key(KF::key(value));
                    let expected = prefix | (u64::from(slot) << shift);
                    if hash & prefix_mask(depth + 1) != expected {
                        return Err(PersistError::HashValidationFailed(format!(
                            "pool '{pool}': element in slot {slot} at depth {depth} \
                             hashes to {hash:#018x}"
                        )));
                    }
                }
                for (slot, child) in slots(*nodemap).zip(children) {
                    stack.push((&**child, depth + 1, prefix | (u64::from(slot) << shift)));
                }
            }
            TrieNode::Collision(values) => {
                let mut first = None;
                for (i, value) in values.iter().enumerate() {
                    let key = KF::key(value);
                    let hash = hash_key(key);
                    let stray = hash & prefix_mask(depth) != prefix;
                    if stray || first.is_some_and(|h| h != hash) {
                        return Err(PersistError::HashValidationFailed(format!(
                            "pool '{pool}': collision bucket at depth {depth} \
                             holds unrelated hash {hash:#018x}"
                        )));
                    }
                    first = Some(hash);
                    if values[..i].iter().any(|other| KF::key(other) == key) {
                        return Err(PersistError::DuplicateKeyOnLoad(format!(
                            "pool '{pool}': collision bucket at depth {depth} repeats a key"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
