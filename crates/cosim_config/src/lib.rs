//! Parsing and validation of `cosim.toml` run configuration files.
//!
//! A configuration names the bench to run, bounds the run length, sets the
//! scheduler's handshake and barrier watchdogs, and picks the default log
//! level. The file is located through an explicit path, the
//! [`BOOTSTRAP_ENV`] environment variable, or `./cosim.toml`.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    load_config, load_config_from_str, load_or_default, resolve_config_path, BOOTSTRAP_ENV,
    DEFAULT_CONFIG_FILE,
};
pub use types::*;
