//! Single-panel NeXus stack source.

use crate::source::{basename, PatternSource};
use crate::{Error, Result};
use hdf5::{Dataset, File};
use log::info;
use ndarray::{s, Array2, ArrayView2};
use std::path::{Path, PathBuf};

struct StackHandle {
    _file: File,
    dataset: Dataset,
    frames: usize,
}

/// Opens `dataset` in `path`, mapping a missing dataset to
/// [`Error::MissingDataset`].
pub(crate) fn open_dataset(path: &Path, dataset: &str) -> Result<(File, Dataset)> {
    let file = File::open(path)?;
    let ds = file.dataset(dataset).map_err(|_| Error::MissingDataset {
        path: path.to_path_buf(),
        dataset: dataset.to_string(),
    })?;
    Ok((file, ds))
}

/// A NeXus file holding frames `0..N` along the leading axis of one dataset.
///
/// Opening binds the dataset without reading pixels. Every
/// [`read_frame`](PatternSource::read_frame) slices the frame from
/// storage; only the most recent frame is held in memory.
pub struct StackSource {
    path: PathBuf,
    name: String,
    dataset: String,
    handle: Option<StackHandle>,
    frame: Option<Array2<f32>>,
}

impl StackSource {
    /// Creates a closed source reading `dataset` from `path`.
    pub fn new<P: AsRef<Path>>(path: P, dataset: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: basename(&path),
            path,
            dataset: dataset.to_string(),
            handle: None,
            frame: None,
        }
    }

    /// Path of the NeXus file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternSource for StackSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        info!("opening file {}", self.name);
        let (file, dataset) = open_dataset(&self.path, &self.dataset)?;
        let shape = dataset.shape();
        if shape.len() != 3 {
            return Err(Error::InvalidFormat(format!(
                "{} in {} must be 3-D (frame, row, col), got shape {shape:?}",
                self.dataset, self.name
            )));
        }
        self.handle = Some(StackHandle {
            _file: file,
            dataset,
            frames: shape[0],
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            info!("closing file {}", self.name);
        }
        self.frame = None;
    }

    fn frame_count(&self) -> Option<usize> {
        self.handle.as_ref().map(|h| h.frames)
    }

    fn load_frame(&mut self, index: usize) -> Result<()> {
        self.frame = None;
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::NotOpen(self.name.clone()))?;
        if index >= handle.frames {
            return Err(Error::FrameOutOfRange {
                source_id: self.name.clone(),
                index,
                count: handle.frames,
            });
        }
        self.frame = Some(handle.dataset.read_slice_2d(s![index, .., ..])?);
        Ok(())
    }

    fn frame(&self) -> Option<ArrayView2<'_, f32>> {
        self.frame.as_ref().map(Array2::view)
    }
}
