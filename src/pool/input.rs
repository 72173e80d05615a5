use super::NodeSource;
use super::output::unknown_type;
use super::validate::validate_trie;
use crate::catalog::TypeCatalog;
use crate::collections::champ::KeyFn;
use crate::collections::{TrieNode, VecNode};
use crate::convert::{ConvertedSource, MigrationMap};
use crate::format::{Document, PoolData, SeqRecord, TrieRecord};
use crate::graph::{NodeId, NodeKey};
use crate::persist::{Container, Persist};
use crate::{PersistError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Materialized nodes of one container type.
#[derive(Default)]
struct LoadedPool {
    nodes: HashMap<NodeId, Box<dyn Any + Send + Sync>>,
    keys: HashMap<NodeKey, NodeId>,
    in_progress: HashSet<NodeId>,
    validated: HashSet<NodeId>,
}

/// The read side of a pool set.
///
/// Records are decoded lazily, the first time a container references them, and each node
/// is materialized at most once per load, so a node referenced by several parents comes
/// back as one shared node. Hash-keyed containers are validated after reconstruction
/// unless [`set_ignore_pool_exceptions`](Self::set_ignore_pool_exceptions) is on.
///
/// Pools replaced by [`reload`](Self::reload) stay behind as older layers for as long as
/// they hold a named root the current pools do not define. Each layer resolves node ids
/// against its own records.
pub struct InputPools {
    catalog: TypeCatalog,
    data: BTreeMap<String, PoolData>,
    loaded: HashMap<TypeId, LoadedPool>,
    ignore_pool_exceptions: bool,
    conversion: Option<Box<ConvertedSource>>,
    previous: Vec<InputPools>,
}

impl InputPools {
    /// Creates a pool set with no data.
    pub fn new(catalog: TypeCatalog) -> Self {
        Self::from_pools(BTreeMap::new(), catalog)
    }

    /// Creates a pool set over decoded pools.
    pub fn from_pools(data: BTreeMap<String, PoolData>, catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            data,
            loaded: HashMap::new(),
            ignore_pool_exceptions: false,
            conversion: None,
            previous: Vec::new(),
        }
    }

    /// Decodes an archive and returns its pool set together with its top-level value.
    pub fn from_bytes(bytes: &[u8], catalog: TypeCatalog) -> Result<(Self, Value)> {
        let doc = crate::archive::decode(bytes)?;
        Ok((Self::from_pools(doc.pools, catalog), doc.value0))
    }

    /// A pool set that loads every container from `old`, converting the types `map`
    /// targets and passing the others through unchanged.
    pub(crate) fn converting(old: InputPools, map: MigrationMap) -> Self {
        let validate = !old.ignore_pool_exceptions;
        let mut pools = Self::new(TypeCatalog::new());
        pools.ignore_pool_exceptions = old.ignore_pool_exceptions;
        pools.conversion = Some(Box::new(ConvertedSource::new(old, map, validate)));
        pools
    }

    /// The catalog naming the pools.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Disables hash validation of hash-keyed containers. Meant for diagnostics only.
    pub fn set_ignore_pool_exceptions(&mut self, ignore: bool) {
        self.ignore_pool_exceptions = ignore;
        for layer in &mut self.previous {
            layer.ignore_pool_exceptions = ignore;
        }
    }

    /// Returns true if hash validation is disabled.
    pub fn ignore_pool_exceptions(&self) -> bool {
        self.ignore_pool_exceptions
    }

    /// Replaces the pool contents with the pools of `bytes`, then keeps the previous
    /// contents for the roots only they define. Returns the archive's top-level value.
    ///
    /// Previously materialized nodes are dropped, so loading the same archive twice
    /// leaves the pools exactly as one load would.
    pub fn reload(&mut self, bytes: &[u8]) -> Result<Value> {
        let doc: Document = crate::archive::decode(bytes)?;
        let previous = std::mem::replace(&mut self.data, doc.pools);
        self.loaded.clear();
        let layer = self.layer(previous);
        self.previous.insert(0, layer);
        self.drop_shadowed();
        tracing::debug!(
            pools = self.data.len(),
            nodes = self.total_nodes(),
            layers = self.previous.len(),
            "reloaded pools"
        );
        Ok(doc.value0)
    }

    /// Keeps the roots of `previous` that this pool set does not define. Roots defined
    /// here win, and kept roots load from `previous`'s own records.
    pub fn merge_previous(&mut self, previous: &InputPools) {
        let layer = self.layer(previous.data.clone());
        self.previous.push(layer);
        for older in &previous.previous {
            let layer = self.layer(older.data.clone());
            self.previous.push(layer);
        }
        self.drop_shadowed();
    }

    fn layer(&self, data: BTreeMap<String, PoolData>) -> InputPools {
        let mut layer = Self::from_pools(data, self.catalog.clone());
        layer.ignore_pool_exceptions = self.ignore_pool_exceptions;
        layer
    }

    /// Forgets the older layers whose roots are all defined by the current pools.
    fn drop_shadowed(&mut self) {
        let current = &self.data;
        self.previous.retain(|layer| {
            layer.data.iter().any(|(name, pool)| {
                pool.roots
                    .keys()
                    .any(|root| !current.get(name).is_some_and(|p| p.roots.contains_key(root)))
            })
        });
    }

    /// Number of older layers still kept for their roots.
    pub fn previous_layers(&self) -> usize {
        self.previous.len()
    }

    /// Number of nodes in the pool called `name`.
    pub fn node_count(&self, name: &str) -> Option<usize> {
        self.data.get(name).map(|p| p.nodes.len())
    }

    /// Number of nodes across all pools.
    pub fn total_nodes(&self) -> usize {
        self.data.values().map(|p| p.nodes.len()).sum()
    }

    /// The raw pools.
    pub fn pools(&self) -> &BTreeMap<String, PoolData> {
        &self.data
    }

    /// Loads the container stored under root `name` in the pool of `C`.
    ///
    /// A root the current pools lack is looked up in the older layers, newest first.
    pub fn load_root<C: Container>(&mut self, name: &str) -> Result<C> {
        let pool_name = self.pool_name::<C>()?.to_owned();
        if let Some(id) = root_id(&self.data, &pool_name, name) {
            return self.container(id);
        }
        let layer = self
            .previous
            .iter_mut()
            .find(|layer| root_id(&layer.data, &pool_name, name).is_some());
        match layer {
            Some(layer) => layer.load_root(name),
            None => Err(PersistError::Format(format!(
                "pool '{pool_name}' has no root '{name}'"
            ))),
        }
    }

    /// Loads the container of type `C` rooted at `id`.
    pub fn container<C: Container>(&mut self, id: NodeId) -> Result<C> {
        tracing::trace!(container = std::any::type_name::<C>(), node = %id, "loading container");
        if let Some(mut source) = self.conversion.take() {
            let result = source.load::<C>(id);
            self.conversion = Some(source);
            return result;
        }
        C::load_nodes(id, self)
    }

    fn pool_name<C: 'static>(&self) -> Result<&str> {
        self.catalog
            .name_of(TypeId::of::<C>())
            .ok_or_else(unknown_type::<C>)
    }

    fn cached<C: 'static, N: 'static>(&self, id: NodeId) -> Option<Arc<N>> {
        self.loaded
            .get(&TypeId::of::<C>())?
            .nodes
            .get(&id)?
            .downcast_ref::<Arc<N>>()
            .cloned()
    }

    /// Decodes the record of `id` and marks it as being materialized.
    fn begin<C: 'static, R: DeserializeOwned>(&mut self, id: NodeId) -> Result<R> {
        let name = self
            .catalog
            .name_of(TypeId::of::<C>())
            .ok_or_else(unknown_type::<C>)?;
        let pool = self.data.get(name).ok_or_else(|| {
            PersistError::UnknownPool(format!("no pool named '{name}' in the input"))
        })?;
        let raw = pool
            .node(id)
            .ok_or_else(|| PersistError::Format(format!("pool '{name}' has no node {id}")))?;
        let record = R::deserialize(raw)
            .map_err(|e| PersistError::Decode(format!("pool '{name}' node {id}: {e}")))?;
        let loaded = self.loaded.entry(TypeId::of::<C>()).or_default();
        if !loaded.in_progress.insert(id) {
            return Err(PersistError::Format(format!(
                "pool '{name}' node {id} is its own descendant"
            )));
        }
        Ok(record)
    }

    /// Stores a materialized node, or forgets the attempt if it failed.
    fn finish<C: 'static, N: Send + Sync + 'static>(
        &mut self,
        id: NodeId,
        built: Result<N>,
    ) -> Result<Arc<N>> {
        let loaded = self.loaded.entry(TypeId::of::<C>()).or_default();
        loaded.in_progress.remove(&id);
        let node = Arc::new(built?);
        loaded.keys.insert(NodeKey::of(&node), id);
        loaded.nodes.insert(id, Box::new(Arc::clone(&node)));
        Ok(node)
    }

    /// Validates the trie rooted at `id` once per load. With validation off, the skip is
    /// logged once per node instead.
    pub(crate) fn check_trie<C: 'static, E, KF: KeyFn<E>>(
        &mut self,
        id: NodeId,
        root: &TrieNode<E>,
    ) -> Result<()> {
        let type_id = TypeId::of::<C>();
        if self
            .loaded
            .get(&type_id)
            .is_some_and(|p| p.validated.contains(&id))
        {
            return Ok(());
        }
        let name = self.pool_name::<C>()?;
        if self.ignore_pool_exceptions {
            tracing::warn!(pool = name, node = %id, "hash validation skipped");
        } else {
            validate_trie::<E, KF>(root, name)?;
        }
        self.loaded.entry(type_id).or_default().validated.insert(id);
        Ok(())
    }
}

fn root_id(data: &BTreeMap<String, PoolData>, pool: &str, name: &str) -> Option<NodeId> {
    data.get(pool)?.roots.get(name).copied()
}

impl NodeSource for InputPools {
    fn node_id(&self, type_id: TypeId, key: NodeKey) -> Option<NodeId> {
        self.loaded.get(&type_id)?.keys.get(&key).copied()
    }
}

impl std::fmt::Debug for InputPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPools")
            .field("pools", &self.data.keys().collect::<Vec<_>>())
            .field("nodes", &self.total_nodes())
            .field("ignore_pool_exceptions", &self.ignore_pool_exceptions)
            .field("converting", &self.conversion.is_some())
            .field("previous_layers", &self.previous.len())
            .finish()
    }
}

// --- NODE WALKERS ---

/// Materializes the vector node `id` of the pool of `C`.
pub(crate) fn load_vector<C: 'static, T: Persist>(
    pools: &mut InputPools,
    id: NodeId,
) -> Result<Arc<VecNode<T>>> {
    if let Some(node) = pools.cached::<C, VecNode<T>>(id) {
        return Ok(node);
    }
    let record: SeqRecord = pools.begin::<C, _>(id)?;
    let built = build_vector::<C, T>(pools, record);
    pools.finish::<C, _>(id, built)
}

fn build_vector<C: 'static, T: Persist>(
    pools: &mut InputPools,
    record: SeqRecord,
) -> Result<VecNode<T>> {
    match record {
        SeqRecord::Leaf(values) => {
            let items = values
                .iter()
                .map(|v| T::load(v, pools))
                .collect::<Result<_>>()?;
            Ok(VecNode::Leaf(items))
        }
        SeqRecord::Inner { children, sizes } => {
            let kids = children
                .iter()
                .map(|child| load_vector::<C, T>(pools, *child))
                .collect::<Result<Vec<_>>>()?;
            let node = VecNode::inner(kids);
            match &node {
                VecNode::Inner { sizes: actual, .. } if *actual == sizes => Ok(node),
                _ => Err(PersistError::Format(format!(
                    "inner node sizes {sizes:?} disagree with its children"
                ))),
            }
        }
    }
}

/// Materializes the trie node `id` of the pool of `C`.
pub(crate) fn load_trie<C: 'static, E: Persist>(
    pools: &mut InputPools,
    id: NodeId,
) -> Result<Arc<TrieNode<E>>> {
    if let Some(node) = pools.cached::<C, TrieNode<E>>(id) {
        return Ok(node);
    }
    let record: TrieRecord = pools.begin::<C, _>(id)?;
    let built = build_trie::<C, E>(pools, record);
    pools.finish::<C, _>(id, built)
}

fn build_trie<C: 'static, E: Persist>(
    pools: &mut InputPools,
    record: TrieRecord,
) -> Result<TrieNode<E>> {
    match record {
        TrieRecord::Inner {
            datamap,
            nodemap,
            values,
            children,
        } => {
            let consistent = datamap & nodemap == 0
                && values.len() == datamap.count_ones() as usize
                && children.len() == nodemap.count_ones() as usize;
            if !consistent {
                return Err(PersistError::Format(format!(
                    "trie node bitmaps {datamap:#x}/{nodemap:#x} disagree with \
                     its {} values and {} children",
                    values.len(),
                    children.len()
                )));
            }
            let values = values
                .iter()
                .map(|v| E::load(v, pools))
                .collect::<Result<_>>()?;
            let children = children
                .iter()
                .map(|child| load_trie::<C, E>(pools, *child))
                .collect::<Result<_>>()?;
            Ok(TrieNode::Inner {
                datamap,
                nodemap,
                values,
                children,
            })
        }
        TrieRecord::Collision(values) => {
            if values.len() < 2 {
                return Err(PersistError::Format(
                    "collision node with fewer than two values".to_owned(),
                ));
            }
            let values = values
                .iter()
                .map(|v| E::load(v, pools))
                .collect::<Result<_>>()?;
            Ok(TrieNode::Collision(values))
        }
    }
}

/// Materializes the boxed value `id` of the pool of `C`.
pub(crate) fn load_box<C: 'static, T: Persist>(
    pools: &mut InputPools,
    id: NodeId,
) -> Result<Arc<T>> {
    if let Some(node) = pools.cached::<C, T>(id) {
        return Ok(node);
    }
    let record: Value = pools.begin::<C, _>(id)?;
    let built = T::load(&record, pools);
    pools.finish::<C, _>(id, built)
}
