//! Single-frame CBF source.

use crate::cbf::decode_cbf;
use crate::mmap::MappedFile;
use crate::source::{basename, PatternSource};
use crate::{Error, Result};
use log::info;
use ndarray::{Array2, ArrayView2};
use std::path::{Path, PathBuf};

/// A CBF file holding exactly one frame.
///
/// The frame is decoded from the mapped file on every read; only the
/// most recent decode is kept.
pub struct CbfSource {
    path: PathBuf,
    name: String,
    mapped: Option<MappedFile>,
    frame: Option<Array2<f32>>,
}

impl CbfSource {
    /// Creates a closed source for `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: basename(&path),
            path,
            mapped: None,
            frame: None,
        }
    }

    /// Path of the CBF file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternSource for CbfSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.mapped.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.mapped.is_none() {
            info!("opening file {}", self.name);
            self.mapped = Some(MappedFile::open(&self.path)?);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.mapped.take().is_some() {
            info!("closing file {}", self.name);
        }
        self.frame = None;
    }

    fn frame_count(&self) -> Option<usize> {
        Some(1)
    }

    fn load_frame(&mut self, index: usize) -> Result<()> {
        if index != 0 {
            return Err(Error::FrameOutOfRange {
                source_id: self.name.clone(),
                index,
                count: 1,
            });
        }
        self.frame = None;
        let mapped = self
            .mapped
            .as_ref()
            .ok_or_else(|| Error::NotOpen(self.name.clone()))?;
        self.frame = Some(decode_cbf(mapped.as_bytes(), &self.path)?);
        Ok(())
    }

    fn frame(&self) -> Option<ArrayView2<'_, f32>> {
        self.frame.as_ref().map(Array2::view)
    }
}
