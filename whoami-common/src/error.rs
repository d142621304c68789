//! Common error types for whoami

use thiserror::Error;

/// Common result type for whoami operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared by the normalizer and the configuration layer
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML file exists but could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Invalid user input or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raw record lacks a feature named in the range table
    #[error("Feature '{0}' missing from audio-feature record")]
    MissingFeature(String),

    /// Records and popularities are not parallel
    #[error("Length mismatch: {records} records but {popularities} popularity scores")]
    LengthMismatch { records: usize, popularities: usize },

    /// Upstream fetch produced no track identifiers
    #[error("No tracks found: {0}")]
    EmptyInput(String),
}
