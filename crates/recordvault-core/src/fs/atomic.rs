#![forbid(unsafe_code)]

//! Crash-safe file replacement.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::trace;

/// Replace the contents of `path` with `data` atomically.
///
/// The data is written to a temporary file in the same directory, flushed to
/// stable storage, then renamed over `path`. Readers observe either the old
/// contents or the new ones, never a partial write; if anything fails before
/// the rename the original file is untouched and the temporary file is
/// removed.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    trace!(path = %path.display(), len = data.len(), "atomically replaced file");
    Ok(())
}
