//! `Persist` and `Container` for the collection types.

use super::input::{load_box, load_trie, load_vector};
use super::output::{save_box, save_trie, save_vector};
use super::{InputPools, OutputPools};
use crate::catalog::Members;
use crate::collections::champ::{First, Identity};
use crate::collections::table::TableKey;
use crate::collections::{PBox, PMap, PSet, PTable, PVector, TableEntry};
use crate::graph::{NodeId, NodeKey};
use crate::persist::{Container, ContainerKind, Persist};
use crate::{Result, rt};
use serde_json::Value;
use std::hash::Hash;

// In a value tree a container is its root id.
macro_rules! persist_as_root_id {
    ($kind:expr, [$($member:ty),*]) => {
        fn save(&self, pools: &mut OutputPools) -> Result<Value> {
            Ok(Value::from(Container::save_nodes(self, pools)?.as_u32()))
        }

        fn load(node: &Value, pools: &mut InputPools) -> Result<Self> {
            pools.container(rt::node_id(node)?)
        }

        fn members(members: &mut Members) {
            $(members.element::<$member>();)*
        }

        fn container_kind() -> Option<ContainerKind> {
            Some($kind)
        }
    };
}

impl<T: Persist> Persist for PVector<T> {
    persist_as_root_id!(ContainerKind::Sequence, [T]);
}

impl<T: Persist> Container for PVector<T> {
    type Element = T;
    const KIND: ContainerKind = ContainerKind::Sequence;

    fn identity(&self) -> NodeKey {
        PVector::identity(self)
    }

    fn is_empty(&self) -> bool {
        PVector::is_empty(self)
    }

    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId> {
        save_vector::<Self, T>(pools, self.root())
    }

    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self> {
        load_vector::<Self, T>(pools, id).map(PVector::from_root)
    }
}

impl<T: Persist + Hash + Eq> Persist for PSet<T> {
    persist_as_root_id!(ContainerKind::HashTrie, [T]);
}

impl<T: Persist + Hash + Eq> Container for PSet<T> {
    type Element = T;
    const KIND: ContainerKind = ContainerKind::HashTrie;

    fn identity(&self) -> NodeKey {
        PSet::identity(self)
    }

    fn is_empty(&self) -> bool {
        PSet::is_empty(self)
    }

    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId> {
        save_trie::<Self, T>(pools, self.root())
    }

    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self> {
        let root = load_trie::<Self, T>(pools, id)?;
        pools.check_trie::<Self, T, Identity>(id, &root)?;
        Ok(PSet::from_root(root))
    }
}

impl<K, V> Persist for PMap<K, V>
where
    K: Persist + Hash + Eq,
    V: Persist,
{
    persist_as_root_id!(ContainerKind::HashTrie, [K, V]);
}

impl<K, V> Container for PMap<K, V>
where
    K: Persist + Hash + Eq,
    V: Persist,
{
    type Element = (K, V);
    const KIND: ContainerKind = ContainerKind::HashTrie;

    fn identity(&self) -> NodeKey {
        PMap::identity(self)
    }

    fn is_empty(&self) -> bool {
        PMap::is_empty(self)
    }

    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId> {
        save_trie::<Self, (K, V)>(pools, self.root())
    }

    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self> {
        let root = load_trie::<Self, (K, V)>(pools, id)?;
        pools.check_trie::<Self, (K, V), First>(id, &root)?;
        Ok(PMap::from_root(root))
    }
}

impl<T: Persist + TableEntry> Persist for PTable<T> {
    persist_as_root_id!(ContainerKind::HashTrie, [T]);
}

impl<T: Persist + TableEntry> Container for PTable<T> {
    type Element = T;
    const KIND: ContainerKind = ContainerKind::HashTrie;

    fn identity(&self) -> NodeKey {
        PTable::identity(self)
    }

    fn is_empty(&self) -> bool {
        PTable::is_empty(self)
    }

    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId> {
        save_trie::<Self, T>(pools, self.root())
    }

    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self> {
        let root = load_trie::<Self, T>(pools, id)?;
        pools.check_trie::<Self, T, TableKey>(id, &root)?;
        Ok(PTable::from_root(root))
    }
}

impl<T: Persist> Persist for PBox<T> {
    persist_as_root_id!(ContainerKind::Boxed, [T]);
}

impl<T: Persist> Container for PBox<T> {
    type Element = T;
    const KIND: ContainerKind = ContainerKind::Boxed;

    fn identity(&self) -> NodeKey {
        PBox::identity(self)
    }

    fn is_empty(&self) -> bool {
        false
    }

    fn save_nodes(&self, pools: &mut OutputPools) -> Result<NodeId> {
        save_box::<Self, T>(pools, self.node())
    }

    fn load_nodes(id: NodeId, pools: &mut InputPools) -> Result<Self> {
        load_box::<Self, T>(pools, id).map(PBox::from_arc)
    }
}
