//! Type discovery.
//!
//! A [`TypeCatalog`] lists every container type reachable from one or more root types and
//! the pool name each of them is stored under. Discovery is a breadth-first walk over the
//! member tables generated by `#[derive(Persist)]`: composites expand into their fields,
//! containers are recorded and expand into their element types. A composite such as
//! `Option<C>` passes the name of the field holding it on to `C`. Visitation is keyed by
//! `TypeId`, so recursive schemas terminate.
//!
//! A container's pool name is the first non-empty field name that referenced it. When no
//! field ever named it, or the name is already taken by another container type, its Rust
//! type name is used instead.

use crate::persist::{ContainerKind, Persist};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Static description of a persistable type.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    kind: Option<ContainerKind>,
    members: fn(&mut Members),
}

impl TypeDescriptor {
    /// Describes `T`.
    pub fn of<T: Persist>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            kind: T::container_kind(),
            members: T::members,
        }
    }

    /// The Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Collector for the member types of one type.
#[derive(Debug, Default)]
pub struct Members {
    entries: Vec<(Option<&'static str>, TypeDescriptor)>,
}

impl Members {
    /// Records a named field of type `T`.
    pub fn field<T: Persist>(&mut self, name: &'static str) {
        self.entries.push((Some(name), TypeDescriptor::of::<T>()));
    }

    /// Records an unnamed member of type `T`, such as a container's element type.
    pub fn element<T: Persist>(&mut self) {
        self.entries.push((None, TypeDescriptor::of::<T>()));
    }
}

/// A container type known to a catalog.
#[derive(Debug, Clone)]
pub struct PoolType {
    /// Pool name in the encoded output.
    pub name: String,
    /// The Rust type name.
    pub type_name: &'static str,
    /// Node layout.
    pub kind: ContainerKind,
}

/// Name table of every container type reachable from the registered roots.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<TypeId, PoolType>,
    names: BTreeMap<String, TypeId>,
    explicit: HashMap<TypeId, String>,
    expanded: HashSet<TypeId>,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers every container type reachable from `T`.
    pub fn discover<T: Persist>() -> Self {
        Self::new().with_root::<T>()
    }

    /// Pins the pool name of container type `C`. Explicit names take precedence over
    /// discovered ones; call this before the roots that reach `C`.
    pub fn with_name<C: Persist>(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let type_id = TypeId::of::<C>();
        if let Some(existing) = self.types.get_mut(&type_id) {
            self.names.remove(&existing.name);
            existing.name = name.clone();
            self.names.insert(name.clone(), type_id);
        }
        self.explicit.insert(type_id, name);
        self
    }

    /// Adds every container type reachable from `T`.
    pub fn with_root<T: Persist>(mut self) -> Self {
        let mut queue = VecDeque::from([(None, TypeDescriptor::of::<T>())]);
        let mut found: Vec<(TypeDescriptor, Option<&'static str>)> = Vec::new();
        let mut seen: HashMap<TypeId, usize> = HashMap::new();

        while let Some((field, desc)) = queue.pop_front() {
            if let Some(&slot) = seen.get(&desc.type_id) {
                let named = &mut found[slot].1;
                if named.is_none() {
                    *named = field.filter(|n: &&str| !n.is_empty());
                }
                continue;
            }
            seen.insert(desc.type_id, found.len());
            found.push((desc, field.filter(|n| !n.is_empty())));

            if self.expanded.insert(desc.type_id) {
                let mut members = Members::default();
                (desc.members)(&mut members);
                // Composites hand their field name to their contents; containers do not.
                let inherited = if desc.kind.is_none() { field } else { None };
                queue.extend(
                    members
                        .entries
                        .into_iter()
                        .map(|(name, member)| (name.or(inherited), member)),
                );
            }
        }

        for (desc, field) in found {
            let Some(kind) = desc.kind else { continue };
            if self.types.contains_key(&desc.type_id) {
                continue;
            }
            let name = self.assign_name(&desc, field);
            tracing::trace!(pool = %name, type_name = desc.type_name, "registered container type");
            self.names.insert(name.clone(), desc.type_id);
            self.types.insert(
                desc.type_id,
                PoolType {
                    name,
                    type_name: desc.type_name,
                    kind,
                },
            );
        }
        self
    }

    fn assign_name(&self, desc: &TypeDescriptor, field: Option<&'static str>) -> String {
        if let Some(name) = self.explicit.get(&desc.type_id) {
            return name.clone();
        }
        if let Some(name) = field {
            let reserved = self.explicit.values().any(|n| n == name);
            if !reserved && !self.names.contains_key(name) {
                return name.to_owned();
            }
            tracing::warn!(
                pool = name,
                type_name = desc.type_name,
                "pool name already taken, falling back to the type name"
            );
        }
        let mut name = desc.type_name.to_owned();
        let mut n = 1;
        while self.names.contains_key(&name) {
            n += 1;
            name = format!("{}#{n}", desc.type_name);
        }
        name
    }

    /// The registration of container type `C`, if it was discovered.
    pub fn get<C: 'static>(&self) -> Option<&PoolType> {
        self.types.get(&TypeId::of::<C>())
    }

    /// The pool name of the container type with id `type_id`.
    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.types.get(&type_id).map(|t| t.name.as_str())
    }

    /// Returns true if container type `C` was discovered.
    pub fn contains<C: 'static>(&self) -> bool {
        self.types.contains_key(&TypeId::of::<C>())
    }

    /// Number of container types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no container type was discovered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Every registered container type.
    pub fn entries(&self) -> impl Iterator<Item = (TypeId, &PoolType)> {
        self.types.iter().map(|(id, entry)| (*id, entry))
    }

    /// Pool names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}
