//! patternview-core: Core types for diffraction pattern series.
//!
//! This crate provides the pure, I/O-free parts of pattern discovery:
//! filename sequencing, classification of files into logical patterns,
//! the tiled detector geometry, and frame statistics.
//!

pub mod classify;
pub mod error;
pub mod layout;
pub mod sequence;
pub mod stats;

pub use classify::{classify, FileKind, PatternDescriptor, PatternKind};
pub use error::{Error, Result};
pub use layout::{PanelPlacement, TileLayout, PANEL_COUNT};
pub use sequence::{parse_sequence_key, sort_by_sequence, KeyQualifier, SequenceKey};
pub use stats::FrameStatistics;
