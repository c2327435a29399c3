//! Configuration file loading.
//!
//! The config file is YAML with top-level `intercom`, `export`, `retry`,
//! and `debug` keys. A missing file is not an error; it simply contributes
//! an empty layer.

use std::fs;
use std::path::Path;

use crate::application::ConfigLayer;
use crate::domain::{AppError, Result};

/// Load a configuration layer from a YAML file.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_layer(path: &Path) -> Result<ConfigLayer> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file found, using empty layer");
        return Ok(ConfigLayer::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    serde_yaml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file {}: {e}", path.display()),
    })
}
