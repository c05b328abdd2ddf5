//! Host-facing file probes.
//!
//! The host application checks paths before submitting uploads; these
//! helpers mirror the boundary semantics (`file_size` returns a negative
//! value on error rather than failing).

use std::fs;
use std::path::Path;

/// Check whether `path` names an existing regular file.
pub fn file_exists(path: &str) -> bool {
    Path::new(path).is_file()
}

/// Size of the file at `path` in bytes, or -1 if the path does not exist,
/// is not a regular file, or cannot be read.
pub fn file_size(path: &str) -> i64 {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata.len() as i64,
        _ => -1,
    }
}
