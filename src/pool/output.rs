use super::NodeSource;
use crate::catalog::TypeCatalog;
use crate::collections::{TrieNode, VecNode};
use crate::format::{Document, PoolData, SeqRecord, TrieRecord};
use crate::graph::{NodeId, NodeKey};
use crate::persist::{Container, Persist};
use crate::{PersistError, Result};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The pool of one container type under construction.
struct OutputPool {
    name: String,
    ids: HashMap<NodeKey, NodeId>,
    // Keeps every visited node alive so its address cannot be reused during the walk.
    retained: Vec<Arc<dyn Any + Send + Sync>>,
    data: PoolData,
}

/// The write side of a pool set.
///
/// Saving a container walks its nodes depth first. A node whose identity was already seen
/// reuses its id without being walked again; a new node reserves the next id before its
/// children are visited and gets its record once they all have ids. Saving several values
/// into the same pool set keeps deduplicating across them.
///
/// ```rust
/// use sharepool::{OutputPools, PVector, TypeCatalog};
///
/// let catalog = TypeCatalog::discover::<PVector<u32>>();
/// let mut pools = OutputPools::new(catalog);
/// let v1: PVector<u32> = (0..100).collect();
/// let v2 = v1.push_back(100);
/// pools.add_root("v1", &v1)?;
/// let before = pools.total_nodes();
/// pools.add_root("v2", &v2)?;
/// assert!(pools.total_nodes() - before < 4);
/// # Ok::<(), sharepool::PersistError>(())
/// ```
pub struct OutputPools {
    catalog: TypeCatalog,
    pools: HashMap<TypeId, OutputPool>,
}

impl OutputPools {
    /// Creates an empty pool for every container type of `catalog`.
    pub fn new(catalog: TypeCatalog) -> Self {
        let pools = catalog
            .entries()
            .map(|(type_id, entry)| {
                let pool = OutputPool {
                    name: entry.name.clone(),
                    ids: HashMap::new(),
                    retained: Vec::new(),
                    data: PoolData::default(),
                };
                (type_id, pool)
            })
            .collect();
        Self { catalog, pools }
    }

    /// The catalog naming the pools.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Adds every node of `container` and returns its root id.
    pub fn add<C: Container>(&mut self, container: &C) -> Result<NodeId> {
        container.save_nodes(self)
    }

    /// Adds `container` and records its root under `name` in the container's pool.
    pub fn add_root<C: Container>(
        &mut self,
        name: impl Into<String>,
        container: &C,
    ) -> Result<NodeId> {
        let id = container.save_nodes(self)?;
        self.pool_mut::<C>()?.data.roots.insert(name.into(), id);
        Ok(id)
    }

    /// Number of nodes in the pool of container type `C`.
    pub fn node_count<C: 'static>(&self) -> usize {
        self.pools
            .get(&TypeId::of::<C>())
            .map_or(0, |p| p.data.nodes.len())
    }

    /// Number of nodes across all pools.
    pub fn total_nodes(&self) -> usize {
        self.pools.values().map(|p| p.data.nodes.len()).sum()
    }

    /// Builds an archive with `value0` as its top-level value.
    pub fn to_document(&self, value0: Value) -> Document {
        let pools: BTreeMap<String, PoolData> = self
            .pools
            .values()
            .map(|p| (p.name.clone(), p.data.clone()))
            .collect();
        Document { value0, pools }
    }

    fn pool_mut<C: 'static>(&mut self) -> Result<&mut OutputPool> {
        self.pools
            .get_mut(&TypeId::of::<C>())
            .ok_or_else(|| unknown_type::<C>())
    }

    fn lookup<C: 'static>(&mut self, key: NodeKey) -> Result<Option<NodeId>> {
        Ok(self.pool_mut::<C>()?.ids.get(&key).copied())
    }

    fn reserve<C: 'static>(
        &mut self,
        key: NodeKey,
        node: Arc<dyn Any + Send + Sync>,
    ) -> Result<NodeId> {
        let pool = self.pool_mut::<C>()?;
        let id = NodeId::from_index(pool.data.nodes.len())?;
        pool.data.nodes.push(Value::Null);
        pool.ids.insert(key, id);
        pool.retained.push(node);
        Ok(id)
    }

    fn finish<C: 'static>(&mut self, id: NodeId, record: Value) -> Result<()> {
        let pool = self.pool_mut::<C>()?;
        let slot = pool.data.nodes.get_mut(id.index()).ok_or_else(|| {
            PersistError::Internal(format!("node {id} of pool '{}' was never reserved", pool.name))
        })?;
        *slot = record;
        Ok(())
    }
}

impl NodeSource for OutputPools {
    fn node_id(&self, type_id: TypeId, key: NodeKey) -> Option<NodeId> {
        self.pools.get(&type_id)?.ids.get(&key).copied()
    }
}

impl std::fmt::Debug for OutputPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for pool in self.pools.values() {
            map.entry(&pool.name, &pool.data.nodes.len());
        }
        map.finish()
    }
}

pub(crate) fn unknown_type<C: 'static>() -> PersistError {
    PersistError::UnknownPool(format!(
        "{} is not in the type catalog",
        std::any::type_name::<C>()
    ))
}

// --- NODE WALKERS ---

/// Adds a vector node and everything below it to the pool of `C`.
pub(crate) fn save_vector<C: 'static, T: Persist>(
    pools: &mut OutputPools,
    node: &Arc<VecNode<T>>,
) -> Result<NodeId> {
    let key = NodeKey::of(node);
    if let Some(id) = pools.lookup::<C>(key)? {
        return Ok(id);
    }
    let id = pools.reserve::<C>(key, Arc::clone(node) as Arc<dyn Any + Send + Sync>)?;
    let record = match &**node {
        VecNode::Leaf(items) => SeqRecord::Leaf(
            items
                .iter()
                .map(|item| item.save(pools))
                .collect::<Result<_>>()?,
        ),
        VecNode::Inner { children, sizes } => SeqRecord::Inner {
            children: children
                .iter()
                .map(|child| save_vector::<C, T>(pools, child))
                .collect::<Result<_>>()?,
            sizes: sizes.clone(),
        },
    };
    pools.finish::<C>(id, serde_json::to_value(record)?)?;
    Ok(id)
}

/// Adds a trie node and everything below it to the pool of `C`.
pub(crate) fn save_trie<C: 'static, E: Persist>(
    pools: &mut OutputPools,
    node: &Arc<TrieNode<E>>,
) -> Result<NodeId> {
    let key = NodeKey::of(node);
    if let Some(id) = pools.lookup::<C>(key)? {
        return Ok(id);
    }
    let id = pools.reserve::<C>(key, Arc::clone(node) as Arc<dyn Any + Send + Sync>)?;
    let record = match &**node {
        TrieNode::Inner {
            datamap,
            nodemap,
            values,
            children,
        } => TrieRecord::Inner {
            datamap: *datamap,
            nodemap: *nodemap,
            values: values
                .iter()
                .map(|v| v.save(pools))
                .collect::<Result<_>>()?,
            children: children
                .iter()
                .map(|child| save_trie::<C, E>(pools, child))
                .collect::<Result<_>>()?,
        },
        TrieNode::Collision(values) => TrieRecord::Collision(
            values
                .iter()
                .map(|v| v.save(pools))
                .collect::<Result<_>>()?,
        ),
    };
    pools.finish::<C>(id, serde_json::to_value(record)?)?;
    Ok(id)
}

/// Adds a boxed value to the pool of `C`.
pub(crate) fn save_box<C: 'static, T: Persist>(
    pools: &mut OutputPools,
    node: &Arc<T>,
) -> Result<NodeId> {
    let key = NodeKey::of(node);
    if let Some(id) = pools.lookup::<C>(key)? {
        return Ok(id);
    }
    let id = pools.reserve::<C>(key, Arc::clone(node) as Arc<dyn Any + Send + Sync>)?;
    let record = node.save(pools)?;
    pools.finish::<C>(id, record)?;
    Ok(id)
}
