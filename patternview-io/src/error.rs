//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HDF5 library error.
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Invalid glob expression.
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Core library error (malformed filenames, duplicate keys, layout).
    #[error("core error: {0}")]
    Core(#[from] patternview_core::Error),

    /// A scan matched no pattern files.
    #[error("no files found: {pattern}")]
    NoFilesFound { pattern: String },

    /// An image file could not be decoded.
    #[error("unreadable image {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    /// The pixel dataset is absent from a container file.
    #[error("dataset {dataset} not found in {}", path.display())]
    MissingDataset { path: PathBuf, dataset: String },

    /// Companion panel files of a tiled pattern are missing or disagree.
    #[error("tile mismatch for {}: {reason}", root.display())]
    TileMismatch { root: PathBuf, reason: String },

    /// Frame index outside `[0, count)`.
    #[error("frame {index} out of range for {source_id} ({count} frames)")]
    FrameOutOfRange {
        source_id: String,
        index: usize,
        count: usize,
    },

    /// A frame was requested from a source that is not open.
    #[error("source {0} is not open")]
    NotOpen(String),

    /// No pattern or frame is registered under a key.
    #[error("unknown pattern key: {0}")]
    UnknownKey(String),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),
}
