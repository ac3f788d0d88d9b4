//! Loads and validates the JSON configuration file.
//!
//! Validation runs in two passes: the embedded JSON schema catches shape
//! errors with field paths, then semantic checks cover what the schema
//! cannot express.

use std::fs;
use std::path::Path;

use log::debug;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

const SUPPORTED_VERSION: &str = "1.0";

/// Reads a config file from disk.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates config JSON.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    validate_schema(&json_value)?;
    let config: Config = serde_json::from_value(json_value)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Embedded schema is not valid JSON: {}", e),
        })?;
    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|error| format!("{} (at {})", error, error.instance_path()))
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!(
                "Unsupported config version '{}', expected '{}'",
                config.version, SUPPORTED_VERSION
            ),
        });
    }

    let endpoint = config.provider.endpoint.trim();
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!("Provider endpoint '{}' is not an http(s) URL", endpoint),
        });
    }

    if config.chunking.max_chunk_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "chunking.max_chunk_bytes must be positive".to_string(),
        });
    }
    if config.chunking.max_pages_per_chunk == 0 {
        return Err(ConfigError::Validation {
            message: "chunking.max_pages_per_chunk must be positive".to_string(),
        });
    }

    if config.workers.count == 0 || config.workers.count > 64 {
        return Err(ConfigError::Validation {
            message: format!(
                "workers.count must be between 1 and 64, got {}",
                config.workers.count
            ),
        });
    }

    if config.reconcile.balance_tolerance < 0 {
        return Err(ConfigError::Validation {
            message: "reconcile.balance_tolerance must not be negative".to_string(),
        });
    }

    Ok(())
}
