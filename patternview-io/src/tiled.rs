//! Four-panel tiled detector source.
//!
//! A Lambda 3M acquisition writes each detector panel into its own
//! NeXus file (`<root>_m01.nxs` .. `<root>_m04.nxs`). The panels are read
//! together and stitched into one composite frame at fixed offsets given
//! by a [`TileLayout`].

use crate::source::{basename, PatternSource};
use crate::stack::open_dataset;
use crate::{Error, Result};
use hdf5::{Dataset, File};
use log::info;
use ndarray::{s, Array2, ArrayView2};
use patternview_core::{TileLayout, PANEL_COUNT};
use std::path::{Path, PathBuf};

struct PanelHandle {
    _file: File,
    dataset: Dataset,
}

struct TileHandles {
    panels: Vec<PanelHandle>,
    frames: usize,
    /// Reused across reads; zeroed before every stitch.
    composite: Array2<f32>,
    loaded: bool,
}

/// Tiled pattern backed by four panel files sharing one root.
pub struct TiledSource {
    root: PathBuf,
    name: String,
    panels: [PathBuf; PANEL_COUNT],
    dataset: String,
    layout: TileLayout,
    handles: Option<TileHandles>,
}

impl TiledSource {
    /// Creates a closed source for the panel files of `root`.
    pub fn new<P: AsRef<Path>>(
        root: P,
        panels: [PathBuf; PANEL_COUNT],
        dataset: &str,
        layout: TileLayout,
    ) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            name: basename(&root),
            root,
            panels,
            dataset: dataset.to_string(),
            layout,
            handles: None,
        }
    }

    /// Composite geometry used by this source.
    #[must_use]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    fn mismatch(&self, reason: String) -> Error {
        Error::TileMismatch {
            root: self.root.clone(),
            reason,
        }
    }

    fn open_panels(&self) -> Result<TileHandles> {
        self.layout.validate()?;
        if let Some(missing) = self.panels.iter().find(|p| !p.is_file()) {
            return Err(self.mismatch(format!("missing panel file {}", missing.display())));
        }

        let expected = self.layout.panel_shape();
        let mut panels = Vec::with_capacity(PANEL_COUNT);
        let mut frames = None;
        for (i, path) in self.panels.iter().enumerate() {
            let (file, dataset) = open_dataset(path, &self.dataset)?;
            let shape = dataset.shape();
            if shape.len() != 3 || (shape[1], shape[2]) != expected {
                return Err(self.mismatch(format!(
                    "panel m{:02} has shape {shape:?}, expected [n, {}, {}]",
                    i + 1,
                    expected.0,
                    expected.1
                )));
            }
            match frames {
                None => frames = Some(shape[0]),
                Some(n) if n != shape[0] => {
                    return Err(self.mismatch(format!(
                        "panel m{:02} has {} frames, panel m01 has {n}",
                        i + 1,
                        shape[0]
                    )));
                }
                Some(_) => {}
            }
            panels.push(PanelHandle {
                _file: file,
                dataset,
            });
        }

        Ok(TileHandles {
            panels,
            frames: frames.unwrap_or(0),
            composite: Array2::zeros(self.layout.composite_shape()),
            loaded: false,
        })
    }
}

impl PatternSource for TiledSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handles.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.handles.is_none() {
            info!("opening file {}", self.name);
            self.handles = Some(self.open_panels()?);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.handles.take().is_some() {
            info!("closing file {}", self.name);
        }
    }

    fn frame_count(&self) -> Option<usize> {
        self.handles.as_ref().map(|h| h.frames)
    }

    fn load_frame(&mut self, index: usize) -> Result<()> {
        let handles = self
            .handles
            .as_mut()
            .ok_or_else(|| Error::NotOpen(self.name.clone()))?;
        handles.loaded = false;
        if index >= handles.frames {
            return Err(Error::FrameOutOfRange {
                source_id: self.name.clone(),
                index,
                count: handles.frames,
            });
        }

        handles.composite.fill(0.0);
        for (i, panel) in handles.panels.iter().enumerate() {
            let data: Array2<f32> = panel.dataset.read_slice_2d(s![index, .., ..])?;
            let (rows, cols) = self.layout.panel_region(i);
            handles.composite.slice_mut(s![rows, cols]).assign(&data);
        }
        handles.loaded = true;
        Ok(())
    }

    fn frame(&self) -> Option<ArrayView2<'_, f32>> {
        self.handles
            .as_ref()
            .filter(|h| h.loaded)
            .map(|h| h.composite.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DEFAULT_DATASET;
    use ndarray::Array3;
    use patternview_core::classify::panel_paths;
    use patternview_core::PanelPlacement;
    use tempfile::TempDir;

    fn small_layout() -> TileLayout {
        TileLayout {
            composite_rows: 8,
            composite_cols: 10,
            panel_rows: 2,
            panel_cols: 3,
            panels: [
                PanelPlacement::new(6, 0),
                PanelPlacement::new(0, 6),
                PanelPlacement::new(3, 7),
                PanelPlacement::new(6, 6),
            ],
        }
    }

    fn write_panel(path: &Path, frames: usize, rows: usize, cols: usize, panel: usize) {
        let data = Array3::from_shape_fn((frames, rows, cols), |(f, _, _)| {
            u16::try_from((panel + 1) * 10 + f).unwrap()
        });
        let file = File::create(path).unwrap();
        let detector = file
            .create_group("entry")
            .unwrap()
            .create_group("instrument")
            .unwrap()
            .create_group("detector")
            .unwrap();
        detector
            .new_dataset_builder()
            .with_data(&data)
            .create("data")
            .unwrap();
    }

    fn write_tiles(dir: &Path, frames: [usize; PANEL_COUNT], layout: &TileLayout) -> PathBuf {
        let root = dir.join("lam_00001_00001");
        for (i, path) in panel_paths(&root).iter().enumerate() {
            write_panel(path, frames[i], layout.panel_rows, layout.panel_cols, i);
        }
        root
    }

    fn source(root: &Path, layout: TileLayout) -> TiledSource {
        TiledSource::new(root, panel_paths(root), DEFAULT_DATASET, layout)
    }

    #[test]
    fn test_stitch_small_layout() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [3; PANEL_COUNT], &layout);

        let mut tiled = source(&root, layout.clone());
        assert_eq!(tiled.identifier(), "lam_00001_00001");
        tiled.open().unwrap();
        assert_eq!(tiled.frame_count(), Some(3));

        let frame = tiled.read_frame(1).unwrap();
        assert_eq!(frame.dim(), (8, 10));
        for ((r, c), &v) in frame.indexed_iter() {
            let expected = (0..PANEL_COUNT)
                .rev()
                .find(|&i| {
                    let (rows, cols) = layout.panel_region(i);
                    rows.contains(&r) && cols.contains(&c)
                })
                .map_or(0.0, |i| ((i + 1) * 10 + 1) as f32);
            assert_eq!(v, expected, "pixel ({r}, {c})");
        }
    }

    #[test]
    fn test_composite_reuse_clears_previous_frame() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [2; PANEL_COUNT], &layout);

        let mut tiled = source(&root, layout.clone());
        tiled.open().unwrap();

        // Dirty the uncovered pixels; a read must zero them again.
        tiled.handles.as_mut().unwrap().composite.fill(-1.0);
        let first = tiled.read_frame(0).unwrap().to_owned();
        let second = tiled.read_frame(0).unwrap().to_owned();
        assert_eq!(first, second);

        for ((r, c), &v) in first.indexed_iter() {
            if !layout.is_covered(r, c) {
                assert_eq!(v, 0.0, "gap pixel ({r}, {c})");
            }
        }
    }

    #[test]
    fn test_lambda_geometry() {
        let dir = TempDir::new().unwrap();
        let layout = TileLayout::lambda_3m();
        let root = write_tiles(dir.path(), [1; PANEL_COUNT], &layout);

        let mut tiled = source(&root, layout.clone());
        tiled.open().unwrap();
        let frame = tiled.read_frame(0).unwrap();
        assert_eq!(frame.dim(), (1834, 3147));

        assert_eq!(frame[[1311, 0]], 10.0);
        assert_eq!(frame[[0, 1587]], 20.0);
        assert_eq!(frame[[658, 1591]], 30.0);
        assert_eq!(frame[[1318, 1584]], 40.0);
        assert_eq!(frame[[1833, 3139]], 40.0);

        assert_eq!(frame[[0, 0]], 0.0);
        assert_eq!(frame[[1310, 0]], 0.0);
        assert_eq!(frame[[1833, 3146]], 0.0);
        assert_eq!(frame[[600, 2000]], 0.0);
        let gaps = frame
            .indexed_iter()
            .filter(|&((r, c), _)| !layout.is_covered(r, c))
            .all(|(_, &v)| v == 0.0);
        assert!(gaps);
    }

    #[test]
    fn test_frame_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [3, 3, 2, 3], &layout);

        let mut tiled = source(&root, layout);
        let err = tiled.open().unwrap_err();
        match err {
            Error::TileMismatch { reason, .. } => {
                assert!(reason.contains("m03"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!tiled.is_open());
    }

    #[test]
    fn test_missing_panel() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [1; PANEL_COUNT], &layout);
        std::fs::remove_file(&panel_paths(&root)[3]).unwrap();

        let mut tiled = source(&root, layout);
        let err = tiled.open().unwrap_err();
        assert!(matches!(err, Error::TileMismatch { ref reason, .. } if reason.contains("_m04.nxs")));
    }

    #[test]
    fn test_panel_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [1; PANEL_COUNT], &layout);

        let mut tiled = source(&root, TileLayout::lambda_3m());
        assert!(matches!(tiled.open(), Err(Error::TileMismatch { .. })));
    }

    #[test]
    fn test_out_of_range_and_close() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [2; PANEL_COUNT], &layout);

        let mut tiled = source(&root, layout);
        tiled.open().unwrap();
        assert!(matches!(
            tiled.read_frame(2),
            Err(Error::FrameOutOfRange { count: 2, .. })
        ));
        tiled.close();
        assert_eq!(tiled.frame_count(), None);
        assert!(matches!(tiled.read_frame(0), Err(Error::NotOpen(_))));
    }

    #[test]
    fn test_layout_outside_composite() {
        let dir = TempDir::new().unwrap();
        let layout = small_layout();
        let root = write_tiles(dir.path(), [1; PANEL_COUNT], &layout);

        let mut bad = layout;
        bad.panels[2] = PanelPlacement::new(7, 9);
        let mut tiled = source(&root, bad);
        let err = tiled.open().unwrap_err();
        assert!(
            matches!(err, Error::Core(patternview_core::Error::Config(ref msg)) if msg.contains("m03")),
            "{err}"
        );
        assert!(!tiled.is_open());
    }
}
