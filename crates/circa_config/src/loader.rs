//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::SimConfig;
use std::path::Path;

/// Name of the configuration file looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "circa.toml";

/// Loads and validates `circa.toml` from a directory.
///
/// A missing file is not an error: the defaults are returned instead.
pub fn load_config(dir: &Path) -> Result<SimConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(SimConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `circa.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<SimConfig, ConfigError> {
    let config: SimConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that limits are usable.
fn validate_config(config: &SimConfig) -> Result<(), ConfigError> {
    if config.propagation.iteration_limit == 0 {
        return Err(ConfigError::ValidationError(
            "propagation.iteration_limit must be positive".to_string(),
        ));
    }
    if config.propagation.oscillation_watch_percent > 100 {
        return Err(ConfigError::ValidationError(format!(
            "propagation.oscillation_watch_percent must be at most 100, got {}",
            config.propagation.oscillation_watch_percent
        )));
    }
    if config.analysis.max_expression_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "analysis.max_expression_iterations must be positive".to_string(),
        ));
    }
    if config.analysis.max_table_inputs > 24 {
        return Err(ConfigError::ValidationError(format!(
            "analysis.max_table_inputs must be at most 24, got {}",
            config.analysis.max_table_inputs
        )));
    }
    if config.locking.snapshot_retries == 0 {
        return Err(ConfigError::ValidationError(
            "locking.snapshot_retries must be positive".to_string(),
        ));
    }
    Ok(())
}
