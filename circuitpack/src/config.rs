//! Packaging options stored as JSON.

use std::fs;
use std::path::Path;

use crate::core::{CircuitPackError, SaveOptions};

/// Load [`SaveOptions`] from a JSON file. Missing fields take their defaults.
pub fn load_save_options(path: &Path) -> Result<SaveOptions, CircuitPackError> {
    let content = fs::read_to_string(path).map_err(|e| {
        CircuitPackError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    let options = parse_save_options(&content)
        .map_err(|e| CircuitPackError::Config(format!("{}: {}", path.display(), e)))?;
    tracing::debug!("Loaded save options from {:?}: {:?}", path, options);
    Ok(options)
}

pub fn parse_save_options(json: &str) -> Result<SaveOptions, serde_json::Error> {
    serde_json::from_str(json)
}

/// Write options in the same format [`load_save_options`] reads.
pub fn save_save_options(path: &Path, options: &SaveOptions) -> Result<(), CircuitPackError> {
    let content = serde_json::to_string_pretty(options)
        .map_err(|e| CircuitPackError::Config(e.to_string()))?;
    fs::write(path, content)?;
    Ok(())
}
