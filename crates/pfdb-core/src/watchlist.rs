use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::normalize_handle;
use crate::ConfigError;

/// One entry of the watchlist consumed by the scheduled refresher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedHandle {
    pub handle: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchlistFile {
    #[serde(default)]
    pub handles: Vec<WatchedHandle>,
}

impl WatchlistFile {
    /// Canonical handles in file order.
    #[must_use]
    pub fn handles(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.handle.clone()).collect()
    }
}

/// Load and validate the watchlist from a YAML file.
///
/// Handles are normalized in place, so callers always see the canonical
/// lower-cased form.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_watchlist(path: &Path) -> Result<WatchlistFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::WatchlistIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut watchlist: WatchlistFile =
        serde_yaml::from_str(&content).map_err(ConfigError::WatchlistParse)?;

    validate_watchlist(&mut watchlist)?;

    Ok(watchlist)
}

fn validate_watchlist(watchlist: &mut WatchlistFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &mut watchlist.handles {
        let canonical = normalize_handle(&entry.handle)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if !seen.insert(canonical.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate handle: '{canonical}'"
            )));
        }

        entry.handle = canonical;
    }

    Ok(())
}
