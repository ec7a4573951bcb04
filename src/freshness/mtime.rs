//! Mtime helpers.
//!
//! Module sources are compared against their own previous readings, so
//! plain modification times are enough; a failed stat is reported as
//! `None` and callers treat it as "unavailable", never as an error.

use std::path::Path;
use std::time::SystemTime;

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}
