//! Tiled detector geometry.
//!
//! The Lambda 3M detector writes four panels into separate NeXus files.
//! Each panel is copied into a fixed region of a composite image; the
//! regions leave gaps, which stay zero.

use crate::{Error, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;

/// Number of panels in a tiled detector.
pub const PANEL_COUNT: usize = 4;

/// Top-left corner of one panel inside the composite image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelPlacement {
    pub row: usize,
    pub col: usize,
}

impl PanelPlacement {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Composite geometry of a four-panel detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileLayout {
    /// Composite image rows.
    pub composite_rows: usize,
    /// Composite image columns.
    pub composite_cols: usize,
    /// Rows per panel (HDF5 axis 1).
    pub panel_rows: usize,
    /// Columns per panel (HDF5 axis 2).
    pub panel_cols: usize,
    /// Placement of panels `m01`..`m04`.
    pub panels: [PanelPlacement; PANEL_COUNT],
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::lambda_3m()
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonLayout {
    composite: [usize; 2],
    panel: [usize; 2],
    offsets: [[usize; 2]; PANEL_COUNT],
}

impl Default for JsonLayout {
    fn default() -> Self {
        let layout = TileLayout::lambda_3m();
        Self {
            composite: [layout.composite_rows, layout.composite_cols],
            panel: [layout.panel_rows, layout.panel_cols],
            offsets: layout.panels.map(|p| [p.row, p.col]),
        }
    }
}

impl TileLayout {
    /// Lambda 3M geometry.
    ///
    /// - Composite: 1834 x 3147
    /// - Panels: 516 x 1556 at (1311, 0), (0, 1587), (658, 1591), (1318, 1584)
    #[must_use]
    pub fn lambda_3m() -> Self {
        Self {
            composite_rows: 1834,
            composite_cols: 3147,
            panel_rows: 516,
            panel_cols: 1556,
            panels: [
                PanelPlacement::new(1311, 0),
                PanelPlacement::new(0, 1587),
                PanelPlacement::new(658, 1591),
                PanelPlacement::new(1318, 1584),
            ],
        }
    }

    /// Load a layout from a JSON file.
    ///
    /// Missing fields fall back to the Lambda 3M values.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read, parsed, or
    /// describes panels outside the composite.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("cannot open {}: {e}", path.display())))?;
        let json: JsonLayout = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("invalid layout {}: {e}", path.display())))?;
        Self::from_json_layout(json)
    }

    /// Load a layout from a JSON string.
    ///
    /// ```json
    /// { "composite": [1834, 3147], "panel": [516, 1556],
    ///   "offsets": [[1311, 0], [0, 1587], [658, 1591], [1318, 1584]] }
    /// ```
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the JSON is invalid or describes panels
    /// outside the composite.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonLayout =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid layout: {e}")))?;
        Self::from_json_layout(json)
    }

    fn from_json_layout(json: JsonLayout) -> Result<Self> {
        let layout = Self {
            composite_rows: json.composite[0],
            composite_cols: json.composite[1],
            panel_rows: json.panel[0],
            panel_cols: json.panel[1],
            panels: json.offsets.map(|[row, col]| PanelPlacement::new(row, col)),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Checks that every panel lies inside the composite.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending panel.
    pub fn validate(&self) -> Result<()> {
        if self.panel_rows == 0 || self.panel_cols == 0 {
            return Err(Error::Config("panel shape must be non-empty".to_string()));
        }
        for (i, p) in self.panels.iter().enumerate() {
            let row_end = p.row.checked_add(self.panel_rows);
            let col_end = p.col.checked_add(self.panel_cols);
            let fits = row_end.is_some_and(|r| r <= self.composite_rows)
                && col_end.is_some_and(|c| c <= self.composite_cols);
            if !fits {
                return Err(Error::Config(format!(
                    "panel m{:02} at ({}, {}) exceeds composite {}x{}",
                    i + 1,
                    p.row,
                    p.col,
                    self.composite_rows,
                    self.composite_cols
                )));
            }
        }
        Ok(())
    }

    /// Composite shape as `(rows, cols)`.
    #[must_use]
    pub fn composite_shape(&self) -> (usize, usize) {
        (self.composite_rows, self.composite_cols)
    }

    /// Panel shape as `(rows, cols)`.
    #[must_use]
    pub fn panel_shape(&self) -> (usize, usize) {
        (self.panel_rows, self.panel_cols)
    }

    /// Row and column ranges of a panel (0-based index) in the composite.
    #[must_use]
    pub fn panel_region(&self, panel: usize) -> (Range<usize>, Range<usize>) {
        let p = self.panels[panel];
        (p.row..p.row + self.panel_rows, p.col..p.col + self.panel_cols)
    }

    /// Whether a composite pixel is covered by any panel.
    #[must_use]
    pub fn is_covered(&self, row: usize, col: usize) -> bool {
        (0..PANEL_COUNT).any(|i| {
            let (rows, cols) = self.panel_region(i);
            rows.contains(&row) && cols.contains(&col)
        })
    }
}
