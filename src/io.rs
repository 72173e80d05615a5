//! Buffered file access for archives.

use crate::error::{PersistError, Result};
use crate::format::Document;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Writes `doc` to `path`, truncating any existing file.
pub fn write_document(path: &Path, doc: &Document, pretty: bool) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, doc)?;
    } else {
        serde_json::to_writer(&mut writer, doc)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the archive stored at `path`.
pub fn read_document(path: &Path) -> Result<Document> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        if e.is_io() {
            PersistError::from(std::io::Error::from(e))
        } else {
            PersistError::Decode(format!("{}: {e}", path.display()))
        }
    })
}
