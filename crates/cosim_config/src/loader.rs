//! Configuration file discovery, loading, and validation.

use crate::error::ConfigError;
use crate::types::CosimConfig;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file to bootstrap from.
pub const BOOTSTRAP_ENV: &str = "COSIM_BOOTSTRAP";

/// File name looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "cosim.toml";

/// Loads and validates a configuration file.
pub fn load_config(path: &Path) -> Result<CosimConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CosimConfig, ConfigError> {
    let config: CosimConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Picks the configuration file to use.
///
/// Precedence: `explicit`, then the path in `bootstrap_env` (the value of
/// [`BOOTSTRAP_ENV`]), then [`DEFAULT_CONFIG_FILE`] inside `dir` if it
/// exists. Returns `None` when no file applies and defaults should be used.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    bootstrap_env: Option<&str>,
    dir: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = bootstrap_env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let fallback = dir.join(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}

/// Loads the configuration at `path`, or the defaults when `path` is `None`.
pub fn load_or_default(path: Option<&Path>) -> Result<CosimConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CosimConfig::default()),
    }
}

/// Validates that required fields are present and values are in range.
fn validate_config(config: &CosimConfig) -> Result<(), ConfigError> {
    if config.bench.name.trim().is_empty() {
        return Err(ConfigError::MissingField("bench.name"));
    }
    if config.bench.max_ticks == 0 {
        return Err(ConfigError::Invalid {
            field: "bench.max_ticks",
            reason: "must be positive",
        });
    }
    for (field, value) in [
        (
            "scheduler.handshake_timeout_ms",
            config.scheduler.handshake_timeout_ms,
        ),
        (
            "scheduler.barrier_timeout_ms",
            config.scheduler.barrier_timeout_ms,
        ),
    ] {
        if value == Some(0) {
            return Err(ConfigError::Invalid {
                field,
                reason: "must be positive when set",
            });
        }
    }
    Ok(())
}
