//! Cross-schema conversion with sharing.
//!
//! A [`MigrationMap`] holds one rule per source container type. A rule can make an empty
//! target container (a *placeholder*) and can convert one element. Element rules receive
//! the running [`Conversion`] and call [`Conversion::convert_container`] for the containers
//! nested in the element, so a rule never needs to know the rest of the schema.
//!
//! The conversion walks source nodes, not values. Every source node is converted once per
//! [`ConversionState`] and the result is memoized under the node's id in the source pools,
//! so nodes shared in the source are shared in the result, and converting the same
//! container twice returns the same root. Mutually recursive schemas need no ordering: a
//! rule for `A` can convert `B` containers whose rule converts `A` containers again, since
//! the data itself is acyclic and the memo is shared by the whole run.
//!
//! Hash-keyed containers keep the trie layout of their source. Their converted tries are
//! validated against the target key hashes before being returned, so a rule that changes
//! a key fails with [`PersistError::HashValidationFailed`].
//!
//! ```rust
//! use sharepool::{Conversion, MigrationMap, PVector, Sharepool, TypeCatalog};
//!
//! let old: PVector<u32> = (0..10).collect();
//! let pools = Sharepool::get_pools(&old, &TypeCatalog::discover::<PVector<u32>>())?;
//! let map = MigrationMap::new()
//!     .convert::<PVector<u32>, PVector<String>, _>(|n, _| Ok(n.to_string()));
//!
//! let mut conversion = Conversion::new(&pools, &map);
//! let a: PVector<String> = conversion.convert_container(&old)?;
//! let b: PVector<String> = conversion.convert_container(&old)?;
//! assert_eq!(a.get(3).map(String::as_str), Some("3"));
//! assert!(a.ptr_eq(&b));
//! # Ok::<(), sharepool::PersistError>(())
//! ```

use crate::collections::champ::{First, Identity, KeyFn};
use crate::collections::table::TableKey;
use crate::collections::{PBox, PMap, PSet, PTable, PVector, TableEntry, TrieNode, VecNode};
use crate::graph::{NodeId, NodeKey};
use crate::persist::{Container, Persist};
use crate::pool::validate::validate_trie;
use crate::pool::{InputPools, NodeSource};
use crate::{PersistError, Result};
use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Converts one element of a source container into an element of the target container.
pub type ElementFn<A, B> = dyn Fn(&A, &mut Conversion<'_>) -> Result<B> + Send + Sync;

type PlaceholderFn<New> = dyn Fn() -> New + Send + Sync;

// --- RULES ---

struct RuleSlot<Old: Container, New: Container> {
    placeholder: Option<Arc<PlaceholderFn<New>>>,
    convert: Option<Arc<ElementFn<Old::Element, New::Element>>>,
}

impl<Old: Container, New: Container> Clone for RuleSlot<Old, New> {
    fn clone(&self) -> Self {
        Self {
            placeholder: self.placeholder.clone(),
            convert: self.convert.clone(),
        }
    }
}

impl<Old: Container, New: Container> Default for RuleSlot<Old, New> {
    fn default() -> Self {
        Self {
            placeholder: None,
            convert: None,
        }
    }
}

trait ErasedRule: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn target_name(&self) -> &'static str;

    fn load_converted(&self, id: NodeId, source: &mut ConvertedSource) -> Result<Box<dyn Any>>;
}

impl<Old, New> ErasedRule for RuleSlot<Old, New>
where
    Old: ConvertInto<New>,
    New: Container,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn target_name(&self) -> &'static str {
        type_name::<New>()
    }

    fn load_converted(&self, id: NodeId, source: &mut ConvertedSource) -> Result<Box<dyn Any>> {
        let old = source.old.container::<Old>(id)?;
        let state = std::mem::take(&mut source.state);
        let mut conversion = Conversion::resume(&source.old, &source.map, state, source.validate);
        let converted = conversion.convert_container::<Old, New>(&old);
        source.state = conversion.into_state();
        Ok(Box::new(converted?))
    }
}

/// Rules describing how each old container type becomes a new one.
#[derive(Clone, Default)]
pub struct MigrationMap {
    rules: HashMap<TypeId, Arc<dyn ErasedRule>>,
    targets: HashMap<TypeId, TypeId>,
    names: HashMap<TypeId, &'static str>,
}

impl MigrationMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the element conversion of the rule turning `Old` into `New`.
    pub fn convert<Old, New, F>(self, f: F) -> Self
    where
        Old: ConvertInto<New>,
        New: Container,
        F: Fn(&Old::Element, &mut Conversion<'_>) -> Result<New::Element> + Send + Sync + 'static,
    {
        let mut slot = self.slot::<Old, New>();
        slot.convert = Some(Arc::new(f));
        self.install(slot)
    }

    /// Registers the placeholder of the rule turning `Old` into `New`: the container
    /// produced for an empty `Old`. Without one, empty containers become `New`'s empty
    /// value.
    pub fn placeholder<Old, New, F>(self, f: F) -> Self
    where
        Old: ConvertInto<New>,
        New: Container,
        F: Fn() -> New + Send + Sync + 'static,
    {
        let mut slot = self.slot::<Old, New>();
        slot.placeholder = Some(Arc::new(f));
        self.install(slot)
    }

    fn slot<Old: Container, New: Container>(&self) -> RuleSlot<Old, New> {
        self.rules
            .get(&TypeId::of::<Old>())
            .and_then(|rule| rule.as_any().downcast_ref::<RuleSlot<Old, New>>())
            .cloned()
            .unwrap_or_default()
    }

    fn install<Old, New>(mut self, slot: RuleSlot<Old, New>) -> Self
    where
        Old: ConvertInto<New>,
        New: Container,
    {
        let old = TypeId::of::<Old>();
        if let Some(previous) = self.rules.get(&old) {
            if previous.as_any().downcast_ref::<RuleSlot<Old, New>>().is_none() {
                tracing::warn!(
                    source = type_name::<Old>(),
                    replaced = previous.target_name(),
                    "migration rule retargeted"
                );
            }
        }
        self.rules.insert(old, Arc::new(slot));
        self.targets.retain(|_, source| *source != old);
        self.targets.insert(TypeId::of::<New>(), old);
        self.names.insert(old, type_name::<Old>());
        self
    }

    /// Returns true if a rule converts `Old`.
    pub fn contains<Old: 'static>(&self) -> bool {
        self.rules.contains_key(&TypeId::of::<Old>())
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the map has no rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rule_targeting(&self, new: TypeId) -> Option<Arc<dyn ErasedRule>> {
        let old = self.targets.get(&new)?;
        self.rules.get(old).cloned()
    }
}

impl fmt::Debug for MigrationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (old, rule) in &self.rules {
            let source = self.names.get(old).copied().unwrap_or("?");
            map.entry(&source, &rule.target_name());
        }
        map.finish()
    }
}

// --- CONVERSION RUN ---

type MemoKey = (TypeId, NodeId);

/// Memo of one conversion run: converted nodes and containers by source type and id.
#[derive(Default)]
pub struct ConversionState {
    nodes: HashMap<MemoKey, Box<dyn Any + Send + Sync>>,
    containers: HashMap<MemoKey, Box<dyn Any + Send + Sync>>,
    nodes_in_progress: HashSet<MemoKey>,
    containers_in_progress: HashSet<MemoKey>,
}

impl ConversionState {
    /// Number of converted source nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of converted source containers.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

impl fmt::Debug for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionState")
            .field("nodes", &self.nodes.len())
            .field("containers", &self.containers.len())
            .finish()
    }
}

/// A conversion run over one source pool set.
///
/// Reusing the same `Conversion` for several containers shares its memo between them.
pub struct Conversion<'a> {
    map: &'a MigrationMap,
    source: &'a dyn NodeSource,
    state: ConversionState,
    validate: bool,
}

impl<'a> Conversion<'a> {
    /// Starts a run over the nodes of `source` with the rules of `map`.
    pub fn new<S: NodeSource>(source: &'a S, map: &'a MigrationMap) -> Self {
        Self::resume(source, map, ConversionState::default(), true)
    }

    pub(crate) fn resume(
        source: &'a dyn NodeSource,
        map: &'a MigrationMap,
        state: ConversionState,
        validate: bool,
    ) -> Self {
        Self {
            map,
            source,
            state,
            validate,
        }
    }

    /// Enables or disables hash validation of converted hash-keyed containers.
    pub fn validate_hashes(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// The memo of this run.
    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    pub(crate) fn into_state(self) -> ConversionState {
        self.state
    }

    /// Converts `old` with the rule registered for `Old`.
    ///
    /// # Errors
    /// - [`PersistError::UnmappedType`] if no rule converts `Old`, the rule produces another
    ///   type than `New`, or `old` has elements and the rule has no element conversion.
    /// - [`PersistError::Format`] if `old` is not part of the source pools.
    /// - [`PersistError::HashValidationFailed`] if a converted trie does not match the
    ///   hashes of its new keys.
    pub fn convert_container<Old, New>(&mut self, old: &Old) -> Result<New>
    where
        Old: ConvertInto<New>,
        New: Container,
    {
        let rule = self.map.rules.get(&TypeId::of::<Old>()).cloned().ok_or_else(|| {
            PersistError::UnmappedType(format!("no rule converts {}", type_name::<Old>()))
        })?;
        let slot = rule
            .as_any()
            .downcast_ref::<RuleSlot<Old, New>>()
            .ok_or_else(|| {
                PersistError::UnmappedType(format!(
                    "the rule for {} produces {}, not {}",
                    type_name::<Old>(),
                    rule.target_name(),
                    type_name::<New>()
                ))
            })?;

        let key = self.source_key::<Old>(old.identity())?;
        let done = self.state.containers.get(&key);
        if let Some(done) = done.and_then(|c| c.downcast_ref::<New>()) {
            return Ok(done.clone());
        }
        if !self.state.containers_in_progress.insert(key) {
            return Err(PersistError::Internal(format!(
                "{} {} re-entered during its own conversion",
                type_name::<Old>(),
                key.1
            )));
        }
        let converted = match &slot.placeholder {
            Some(make) if old.is_empty() => Ok(make()),
            _ => old.convert_into(self, slot.convert.as_deref()),
        };
        self.state.containers_in_progress.remove(&key);
        let converted = converted?;
        self.state.containers.insert(key, Box::new(converted.clone()));
        Ok(converted)
    }

    fn source_key<C: 'static>(&self, node: NodeKey) -> Result<MemoKey> {
        let type_id = TypeId::of::<C>();
        self.source
            .node_id(type_id, node)
            .map(|id| (type_id, id))
            .ok_or_else(|| {
                PersistError::Format(format!(
                    "{} node {node:?} is not in the source pools",
                    type_name::<C>()
                ))
            })
    }

    /// Converts one source node of container type `C` once, memoizing the result.
    fn node<C: 'static, S, N: Send + Sync + 'static>(
        &mut self,
        node: &Arc<S>,
        build: impl FnOnce(&mut Self) -> Result<N>,
    ) -> Result<Arc<N>> {
        let key = self.source_key::<C>(NodeKey::of(node))?;
        let done = self.state.nodes.get(&key);
        if let Some(done) = done.and_then(|n| n.downcast_ref::<Arc<N>>()) {
            return Ok(Arc::clone(done));
        }
        if !self.state.nodes_in_progress.insert(key) {
            return Err(PersistError::Internal(format!(
                "{} node {} re-entered during its own conversion",
                type_name::<C>(),
                key.1
            )));
        }
        let built = build(self);
        self.state.nodes_in_progress.remove(&key);
        let converted = Arc::new(built?);
        self.state.nodes.insert(key, Box::new(Arc::clone(&converted)));
        Ok(converted)
    }

    fn check_trie<C: 'static, E, KF: KeyFn<E>>(&self, root: &TrieNode<E>) -> Result<()> {
        if !self.validate {
            tracing::warn!(target_type = type_name::<C>(), "hash validation skipped");
            return Ok(());
        }
        validate_trie::<E, KF>(root, type_name::<C>())
    }
}

impl fmt::Debug for Conversion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("map", self.map)
            .field("state", &self.state)
            .field("validate", &self.validate)
            .finish()
    }
}

fn apply<A, B>(
    f: Option<&ElementFn<A, B>>,
    element: &A,
    conversion: &mut Conversion<'_>,
) -> Result<B> {
    match f {
        Some(f) => f(element, conversion),
        None => Err(PersistError::UnmappedType(format!(
            "no element conversion from {} to {}",
            type_name::<A>(),
            type_name::<B>()
        ))),
    }
}

// --- PER-KIND CONVERSION ---

/// Node-by-node conversion between two containers of the same kind.
pub trait ConvertInto<New: Container>: Container {
    /// Converts every node of `self`, applying `f` to each element.
    #[doc(hidden)]
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<Self::Element, New::Element>>,
    ) -> Result<New>;
}

fn convert_vector_node<A: Persist, B: Persist>(
    node: &Arc<VecNode<A>>,
    conversion: &mut Conversion<'_>,
    f: Option<&ElementFn<A, B>>,
) -> Result<Arc<VecNode<B>>> {
    conversion.node::<PVector<A>, _, _>(node, |conversion| match &**node {
        VecNode::Leaf(items) => items
            .iter()
            .map(|item| apply(f, item, conversion))
            .collect::<Result<_>>()
            .map(VecNode::Leaf),
        VecNode::Inner { children, sizes } => Ok(VecNode::Inner {
            children: children
                .iter()
                .map(|child| convert_vector_node(child, conversion, f))
                .collect::<Result<_>>()?,
            sizes: sizes.clone(),
        }),
    })
}

fn convert_trie_node<C: 'static, A: 'static, B: Send + Sync + 'static>(
    node: &Arc<TrieNode<A>>,
    conversion: &mut Conversion<'_>,
    f: Option<&ElementFn<A, B>>,
) -> Result<Arc<TrieNode<B>>> {
    conversion.node::<C, _, _>(node, |conversion| match &**node {
        TrieNode::Inner {
            datamap,
            nodemap,
            values,
            children,
        } => Ok(TrieNode::Inner {
            datamap: *datamap,
            nodemap: *nodemap,
            values: values
                .iter()
                .map(|v| apply(f, v, conversion))
                .collect::<Result<_>>()?,
            children: children
                .iter()
                .map(|child| convert_trie_node::<C, A, B>(child, conversion, f))
                .collect::<Result<_>>()?,
        }),
        TrieNode::Collision(values) => values
            .iter()
            .map(|v| apply(f, v, conversion))
            .collect::<Result<_>>()
            .map(TrieNode::Collision),
    })
}

impl<A: Persist, B: Persist> ConvertInto<PVector<B>> for PVector<A> {
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<A, B>>,
    ) -> Result<PVector<B>> {
        convert_vector_node(self.root(), conversion, f).map(PVector::from_root)
    }
}

impl<A, B> ConvertInto<PSet<B>> for PSet<A>
where
    A: Persist + Hash + Eq,
    B: Persist + Hash + Eq,
{
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<A, B>>,
    ) -> Result<PSet<B>> {
        let root = convert_trie_node::<Self, A, B>(self.root(), conversion, f)?;
        conversion.check_trie::<PSet<B>, B, Identity>(&root)?;
        Ok(PSet::from_root(root))
    }
}

impl<K1, V1, K2, V2> ConvertInto<PMap<K2, V2>> for PMap<K1, V1>
where
    K1: Persist + Hash + Eq,
    V1: Persist,
    K2: Persist + Hash + Eq,
    V2: Persist,
{
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<(K1, V1), (K2, V2)>>,
    ) -> Result<PMap<K2, V2>> {
        let root = convert_trie_node::<Self, _, _>(self.root(), conversion, f)?;
        conversion.check_trie::<PMap<K2, V2>, (K2, V2), First>(&root)?;
        Ok(PMap::from_root(root))
    }
}

impl<A, B> ConvertInto<PTable<B>> for PTable<A>
where
    A: Persist + TableEntry,
    B: Persist + TableEntry,
{
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<A, B>>,
    ) -> Result<PTable<B>> {
        let root = convert_trie_node::<Self, A, B>(self.root(), conversion, f)?;
        conversion.check_trie::<PTable<B>, B, TableKey>(&root)?;
        Ok(PTable::from_root(root))
    }
}

impl<A: Persist, B: Persist> ConvertInto<PBox<B>> for PBox<A> {
    fn convert_into(
        &self,
        conversion: &mut Conversion<'_>,
        f: Option<&ElementFn<A, B>>,
    ) -> Result<PBox<B>> {
        conversion
            .node::<Self, _, _>(self.node(), |conversion| apply(f, self.get(), conversion))
            .map(PBox::from_arc)
    }
}

// --- CONVERTED LOADING ---

/// Source of an [`InputPools`] that loads through a migration map.
pub(crate) struct ConvertedSource {
    old: InputPools,
    map: MigrationMap,
    state: ConversionState,
    validate: bool,
}

impl ConvertedSource {
    pub(crate) fn new(old: InputPools, map: MigrationMap, validate: bool) -> Self {
        Self {
            old,
            map,
            state: ConversionState::default(),
            validate,
        }
    }

    /// Loads the container `id` as a `C`: converted if a rule produces `C`, read from the
    /// old pools unchanged otherwise.
    pub(crate) fn load<C: Container>(&mut self, id: NodeId) -> Result<C> {
        let Some(rule) = self.map.rule_targeting(TypeId::of::<C>()) else {
            return self.old.container::<C>(id);
        };
        let converted = rule.load_converted(id, self)?;
        converted.downcast::<C>().map(|c| *c).map_err(|_| {
            PersistError::Internal(format!(
                "rule for {} produced {}",
                type_name::<C>(),
                rule.target_name()
            ))
        })
    }
}
