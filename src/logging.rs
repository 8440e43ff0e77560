//! Append-only run log with size-based truncation.

use std::{fs, io, path::Path};

use crate::error::SiteError;

/// When the log at `path` exceeds `max_bytes`, cut it down to roughly its last `keep_bytes`,
/// starting at a line boundary. Returns whether the file was truncated.
pub fn rotate_log<P: AsRef<Path>>(
    path: P,
    max_bytes: u64,
    keep_bytes: u64,
) -> Result<bool, SiteError> {
    let path = path.as_ref();
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if size <= max_bytes {
        return Ok(false);
    }
    let bytes = fs::read(path)?;
    let cut = bytes.len().saturating_sub(keep_bytes as usize);
    let start = bytes[cut..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| cut + i + 1)
        .filter(|_| cut > 0)
        .unwrap_or(cut);
    crate::catalog::write_atomic(path, &bytes[start..])?;
    Ok(true)
}
