use crate::catalog::TypeCatalog;
use crate::convert::{Conversion, ConvertInto, MigrationMap};
use crate::error::Result;
use crate::format::Document;
use crate::persist::{Container, Persist};
use crate::pool::{InputPools, NodeSource, OutputPools};
use serde_json::Value;
use std::path::Path;

/// The main entry point for saving, loading and converting values.
///
/// Every method uses the default [`PersistOptions`]; use [`Sharepool::builder`] to change
/// them.
#[derive(Debug)]
pub struct Sharepool;

impl Sharepool {
    /// Returns the options builder.
    pub fn builder() -> PersistOptions {
        PersistOptions::default()
    }

    /// Saves `value` and returns the archive together with the pools it was built from.
    pub fn save<T: Persist>(value: &T, catalog: &TypeCatalog) -> Result<(Vec<u8>, OutputPools)> {
        Self::builder().save(value, catalog)
    }

    /// Builds the pools of `value` without encoding them.
    pub fn get_pools<T: Persist>(value: &T, catalog: &TypeCatalog) -> Result<OutputPools> {
        walk(value, catalog).map(|(_, pools)| pools)
    }

    /// Loads a `T` from an archive.
    pub fn load<T: Persist>(bytes: &[u8], catalog: &TypeCatalog) -> Result<T> {
        Self::builder().load(bytes, catalog)
    }

    /// Loads a `T` from an archive written with the types of `old_catalog`, converting the
    /// containers `map` has rules for.
    pub fn load_with_conversion<T: Persist>(
        bytes: &[u8],
        old_catalog: &TypeCatalog,
        map: &MigrationMap,
    ) -> Result<T> {
        Self::builder().load_with_conversion(bytes, old_catalog, map)
    }

    /// Converts one container whose nodes are in `pools`.
    ///
    /// Each call starts a fresh run; keep a [`Conversion`] to share converted nodes
    /// between several containers.
    pub fn convert<Old, New>(pools: &impl NodeSource, map: &MigrationMap, old: &Old) -> Result<New>
    where
        Old: ConvertInto<New>,
        New: Container,
    {
        Self::builder().convert(pools, map, old)
    }

    /// Saves `value` to a file.
    pub fn save_file<T, P>(path: P, value: &T, catalog: &TypeCatalog) -> Result<()>
    where
        T: Persist,
        P: AsRef<Path>,
    {
        Self::builder().save_file(path, value, catalog)
    }

    /// Loads a `T` from a file.
    pub fn load_file<T, P>(path: P, catalog: &TypeCatalog) -> Result<T>
    where
        T: Persist,
        P: AsRef<Path>,
    {
        Self::builder().load_file(path, catalog)
    }
}

/// Options for saving and loading.
///
/// ```rust
/// use sharepool::{PVector, Sharepool, TypeCatalog};
///
/// let catalog = TypeCatalog::discover::<PVector<u8>>();
/// let value: PVector<u8> = vec![1, 2, 3].into_iter().collect();
/// let options = Sharepool::builder().pretty(true);
/// let (bytes, _) = options.save(&value, &catalog)?;
/// assert!(bytes.contains(&b'\n'));
/// let loaded: PVector<u8> = options.load(&bytes, &catalog)?;
/// assert_eq!(loaded, value);
/// # Ok::<(), sharepool::PersistError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    pretty: bool,
    validate_hashes: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            validate_hashes: true,
        }
    }
}

impl PersistOptions {
    /// Writes indented JSON.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Checks hash-keyed containers against their key hashes when they are loaded or
    /// converted. On by default; turning it off is meant for diagnostics.
    pub fn validate_hashes(mut self, validate: bool) -> Self {
        self.validate_hashes = validate;
        self
    }

    /// See [`Sharepool::save`].
    pub fn save<T: Persist>(
        &self,
        value: &T,
        catalog: &TypeCatalog,
    ) -> Result<(Vec<u8>, OutputPools)> {
        let (value0, pools) = walk(value, catalog)?;
        let bytes = crate::archive::encode(&pools.to_document(value0), self.pretty)?;
        tracing::debug!(bytes = bytes.len(), "encoded archive");
        Ok((bytes, pools))
    }

    /// See [`Sharepool::load`].
    pub fn load<T: Persist>(&self, bytes: &[u8], catalog: &TypeCatalog) -> Result<T> {
        let doc = crate::archive::decode(bytes)?;
        self.load_document(doc, catalog)
    }

    /// See [`Sharepool::load_with_conversion`].
    pub fn load_with_conversion<T: Persist>(
        &self,
        bytes: &[u8],
        old_catalog: &TypeCatalog,
        map: &MigrationMap,
    ) -> Result<T> {
        let (mut old, value0) = InputPools::from_bytes(bytes, old_catalog.clone())?;
        old.set_ignore_pool_exceptions(!self.validate_hashes);
        let mut pools = InputPools::converting(old, map.clone());
        let value = T::load(&value0, &mut pools)?;
        tracing::debug!(rules = map.len(), "loaded with conversion");
        Ok(value)
    }

    /// See [`Sharepool::convert`].
    pub fn convert<Old, New>(
        &self,
        pools: &impl NodeSource,
        map: &MigrationMap,
        old: &Old,
    ) -> Result<New>
    where
        Old: ConvertInto<New>,
        New: Container,
    {
        let mut conversion = Conversion::new(pools, map).validate_hashes(self.validate_hashes);
        let converted = conversion.convert_container(old)?;
        tracing::debug!(
            nodes = conversion.state().node_count(),
            containers = conversion.state().container_count(),
            "converted"
        );
        Ok(converted)
    }

    /// See [`Sharepool::save_file`].
    pub fn save_file<T, P>(&self, path: P, value: &T, catalog: &TypeCatalog) -> Result<()>
    where
        T: Persist,
        P: AsRef<Path>,
    {
        let (value0, pools) = walk(value, catalog)?;
        crate::io::write_document(path.as_ref(), &pools.to_document(value0), self.pretty)
    }

    /// See [`Sharepool::load_file`].
    pub fn load_file<T, P>(&self, path: P, catalog: &TypeCatalog) -> Result<T>
    where
        T: Persist,
        P: AsRef<Path>,
    {
        let doc = crate::io::read_document(path.as_ref())?;
        self.load_document(doc, catalog)
    }

    fn load_document<T: Persist>(&self, doc: Document, catalog: &TypeCatalog) -> Result<T> {
        let mut pools = InputPools::from_pools(doc.pools, catalog.clone());
        pools.set_ignore_pool_exceptions(!self.validate_hashes);
        let value = T::load(&doc.value0, &mut pools)?;
        tracing::debug!(
            pools = pools.pools().len(),
            nodes = pools.total_nodes(),
            "loaded archive"
        );
        Ok(value)
    }
}

fn walk<T: Persist>(value: &T, catalog: &TypeCatalog) -> Result<(Value, OutputPools)> {
    let mut pools = OutputPools::new(catalog.clone());
    let value0 = value.save(&mut pools)?;
    tracing::debug!(
        pools = catalog.len(),
        nodes = pools.total_nodes(),
        "built output pools"
    );
    Ok((value0, pools))
}
