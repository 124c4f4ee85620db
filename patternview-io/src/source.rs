//! Pattern sources.
//!
//! A [`PatternSource`] is the reader behind one logical pattern. Sources
//! are created closed; [`PatternSource::open`] acquires the underlying
//! file handles and [`PatternSource::close`] releases them. Frames are
//! returned as views into a buffer owned by the source, valid until the
//! next load on the same source.

use crate::single::CbfSource;
use crate::stack::StackSource;
use crate::tiled::TiledSource;
use crate::{Error, Result};
use ndarray::ArrayView2;
use patternview_core::{PatternDescriptor, PatternKind, TileLayout};

/// Dataset holding detector frames in NeXus files.
pub const DEFAULT_DATASET: &str = "/entry/instrument/detector/data";

/// Reader behind one logical pattern.
pub trait PatternSource {
    /// Identifier of the pattern (file basename or tiled root basename).
    fn identifier(&self) -> &str;

    /// Whether the underlying files are currently held open.
    fn is_open(&self) -> bool;

    /// Acquires file handles. Opening an open source is a no-op.
    ///
    /// # Errors
    /// Returns an error if a file cannot be opened or does not have the
    /// expected structure.
    fn open(&mut self) -> Result<()>;

    /// Releases file handles and frame buffers.
    fn close(&mut self);

    /// Number of frames, or `None` while a container source is closed.
    fn frame_count(&self) -> Option<usize>;

    /// Reads frame `index` from storage into the source's frame buffer.
    ///
    /// # Errors
    /// Returns an error if the source is not open, the index is out of
    /// range, or the read fails.
    fn load_frame(&mut self, index: usize) -> Result<()>;

    /// The most recently loaded frame, if any.
    fn frame(&self) -> Option<ArrayView2<'_, f32>>;

    /// Reads frame `index` and returns a view of it.
    ///
    /// # Errors
    /// Same as [`PatternSource::load_frame`].
    fn read_frame(&mut self, index: usize) -> Result<ArrayView2<'_, f32>> {
        self.load_frame(index)?;
        self.frame()
            .ok_or_else(|| Error::NotOpen(self.identifier().to_string()))
    }
}

/// Settings shared by all sources of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Path of the frame dataset inside NeXus files.
    pub dataset: String,
    /// Geometry used to stitch tiled patterns.
    pub layout: TileLayout,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            layout: TileLayout::default(),
        }
    }
}

/// Creates the (closed) source for a classified pattern.
#[must_use]
pub fn create_source(
    descriptor: &PatternDescriptor,
    config: &ReaderConfig,
) -> Box<dyn PatternSource> {
    match &descriptor.kind {
        PatternKind::Single { path } => Box::new(CbfSource::new(path)),
        PatternKind::Stack { path } => Box::new(StackSource::new(path, &config.dataset)),
        PatternKind::Tiled { root, panels } => Box::new(TiledSource::new(
            root,
            panels.clone(),
            &config.dataset,
            config.layout.clone(),
        )),
    }
}

pub(crate) fn basename(path: &std::path::Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}
