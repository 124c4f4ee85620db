//! Error types for patternview-core.

use thiserror::Error;

/// Result type alias for patternview-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sequencing, classification and layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A filename does not follow the `<stem><run>[r<n>][_<d>]_<frame>` convention.
    #[error("malformed filename: {name} does not match the sequence pattern")]
    MalformedFilename { name: String },

    /// Two patterns resolve to the same display key.
    #[error("duplicate pattern key: {key}")]
    DuplicateKey { key: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
