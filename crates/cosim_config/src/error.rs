//! Configuration errors.

use std::io;
use std::path::PathBuf;

/// Why a `cosim.toml` could not be turned into a [`CosimConfig`](crate::CosimConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The working directory needed for `./cosim.toml` lookup is unavailable.
    #[error("cannot determine the working directory: {0}")]
    WorkingDir(#[source] io::Error),

    /// The content is not valid TOML or does not match the schema.
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is empty.
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}
