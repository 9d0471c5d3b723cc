//! Path resolution utilities.

use std::path::PathBuf;

use crate::{Error, Result};

/// Default file name for the store when no path is configured.
pub const DEFAULT_STORE_FILE: &str = "mailfind.redb";

/// Expands `~` and `$VAR` references in a configured path.
///
/// # Example
///
/// ```no_run
/// use mailfind_core::util::paths::expand_path;
///
/// let expanded = expand_path("~/mail/index.redb").unwrap();
/// assert!(!expanded.starts_with("~"));
/// ```
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| Error::config(format!("Cannot expand path '{path}': {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Default store location: the platform data directory, else the
/// current directory.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("mailfind").join(DEFAULT_STORE_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
}
