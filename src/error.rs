//! Centralized error handling for sharepool.
//!
//! Every fallible operation in the crate returns [`Result`]. Library code never panics:
//! malformed input, inconsistent pools and incomplete migration maps all surface as a
//! [`PersistError`] variant that the caller can match on.
//!
//! ## Error Categories
//!
//! - **Decode** ([`PersistError::Decode`]): the structured encoding is malformed.
//! - **Unmapped types** ([`PersistError::UnmappedType`]): a conversion met a container
//!   type the migration map has no usable rule for.
//! - **Hash validation** ([`PersistError::HashValidationFailed`]): a hash-keyed pool
//!   places an element somewhere its current hash does not lead to.
//! - **Duplicates** ([`PersistError::DuplicateKeyOnLoad`]): a set, map or table held
//!   fewer distinct keys than the data declared.
//! - **Unknown pools** ([`PersistError::UnknownPool`]): a container type is missing from
//!   the type catalog, or its pool is missing from the input.
//! - **Format** ([`PersistError::Format`]): pools reference missing or cyclic nodes.
//! - **I/O** and **Internal** for everything else.
//!
//! ## Usage
//!
//! ```rust
//! use sharepool::{PersistError, PVector, Sharepool, TypeCatalog};
//!
//! let catalog = TypeCatalog::discover::<PVector<u32>>();
//! match Sharepool::load::<PVector<u32>>(b"not json", &catalog) {
//!     Err(PersistError::Decode(msg)) => eprintln!("bad input: {msg}"),
//!     Err(e) => eprintln!("other error: {e}"),
//!     Ok(v) => println!("loaded {} items", v.len()),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for sharepool operations.
pub type Result<T> = std::result::Result<T, PersistError>;

/// The master error enum covering all failure domains in sharepool.
///
/// The type is `Clone` so a failure can be stored next to the pool set that produced it;
/// I/O errors are wrapped in an `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum PersistError {
    /// Low-level I/O failure while reading or writing an archive file.
    Io(Arc<io::Error>),

    /// The input is not a well-formed archive: invalid JSON, a missing field, or a value
    /// of the wrong shape for the requested type.
    Decode(String),

    /// A conversion needed a rule the migration map does not provide.
    ///
    /// Raised when there is no rule for the source container type, when the rule targets
    /// a different container type than the one requested, or when a non-empty container
    /// has only a placeholder rule.
    UnmappedType(String),

    /// A hash-keyed container's reconstructed trie does not match the hashes of its
    /// elements. Typically produced by a migration that changed a key's hash-relevant
    /// fields without relocating the element.
    HashValidationFailed(String),

    /// A set, map or table load found repeated keys where distinct ones were declared.
    DuplicateKeyOnLoad(String),

    /// A container type is not registered in the type catalog, or the archive has no
    /// pool under the catalog name.
    UnknownPool(String),

    /// Pools are structurally invalid: dangling or cyclic node references, child sizes
    /// that disagree with the children, or a container absent from a source pool set.
    Format(String),

    /// Logic error inside the engine. Should not occur; please report it.
    Internal(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Decode(s) => write!(f, "Decode Error: {s}"),
            Self::UnmappedType(s) => write!(f, "Unmapped Type: {s}"),
            Self::HashValidationFailed(s) => write!(f, "Hash Validation Failed: {s}"),
            Self::DuplicateKeyOnLoad(s) => write!(f, "Duplicate Key On Load: {s}"),
            Self::UnknownPool(s) => write!(f, "Unknown Pool: {s}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
