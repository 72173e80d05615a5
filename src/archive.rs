//! Encoding of [`Document`]s to bytes.

use crate::error::{PersistError, Result};
use crate::format::Document;

/// Encodes an archive as JSON.
pub fn encode(doc: &Document, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(doc)?
    } else {
        serde_json::to_vec(doc)?
    };
    Ok(bytes)
}

/// Decodes an archive produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Document> {
    serde_json::from_slice(bytes)
        .map_err(|e| PersistError::Decode(format!("malformed archive: {e}")))
}
