//! Errors raised while loading and checking configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no supported format.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// A `.env` file exists but is malformed.
    #[error("invalid .env file: {0}")]
    DotEnv(String),

    /// A file or environment value failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// The merged layers do not fit [`CourierConfig`](crate::CourierConfig).
    #[error("invalid configuration structure: {0}")]
    Shape(String),

    /// A setting is out of range or contradicts another one.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
