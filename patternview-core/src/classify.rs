//! Classification of pattern files into logical patterns.
//!
//! A logical pattern is backed by one CBF file, one NeXus stack, or the
//! four NeXus panel files of a tiled Lambda detector. Tiled files follow
//! the `<root>_m01.nxs` .. `<root>_m04.nxs` convention and collapse into a
//! single pattern created by the `m01` file.

use crate::layout::PANEL_COUNT;
use crate::sequence::{sort_by_sequence, SequenceKey};
use crate::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn tile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*)_m0([1-4])\.nxs$")
            .unwrap_or_else(|e| panic!("tile pattern is a valid regex: {e}"))
    })
}

/// Supported file types, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Crystallographic Binary File, one frame per file.
    Cbf,
    /// NeXus/HDF5 container.
    Nexus,
}

impl FileKind {
    /// Extensions recognised by [`FileKind::from_path`].
    pub const EXTENSIONS: [&'static str; 2] = ["cbf", "nxs"];

    /// Returns the kind of a path from its extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "cbf" => Some(Self::Cbf),
            "nxs" => Some(Self::Nexus),
            _ => None,
        }
    }
}

/// What backs a logical pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    /// One CBF file with exactly one frame.
    Single { path: PathBuf },
    /// One NeXus file holding a stack of frames.
    Stack { path: PathBuf },
    /// Four NeXus panel files sharing `root`, stitched per frame.
    Tiled {
        root: PathBuf,
        panels: [PathBuf; PANEL_COUNT],
    },
}

impl PatternKind {
    /// Short human readable name of the variant.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single { .. } => "cbf",
            Self::Stack { .. } => "stack",
            Self::Tiled { .. } => "tiled",
        }
    }
}

/// A classified pattern in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDescriptor {
    /// Key shown in the pattern list; unique within one scan.
    pub display_key: String,
    /// Sequence key of the file that created the pattern.
    pub sequence_key: SequenceKey,
    pub kind: PatternKind,
}

/// Splits a tiled panel path into its root and 1-based panel number.
///
/// `/data/scan_00001_00001_m03.nxs` -> (`/data/scan_00001_00001`, 3)
#[must_use]
pub fn tile_tag(path: &Path) -> Option<(PathBuf, usize)> {
    let name = path.file_name()?.to_str()?;
    let caps = tile_regex().captures(name)?;
    let root = caps.get(1)?.as_str();
    let panel = caps.get(2)?.as_str().parse().ok()?;
    Some((path.with_file_name(root), panel))
}

/// Returns the four panel paths belonging to a tiled root.
#[must_use]
pub fn panel_paths(root: &Path) -> [PathBuf; PANEL_COUNT] {
    std::array::from_fn(|i| {
        let mut name = OsString::from(root.as_os_str());
        name.push(format!("_m{:02}.nxs", i + 1));
        PathBuf::from(name)
    })
}

fn basename(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}

/// Classifies a batch of pattern files into logical patterns in display order.
///
/// Files are first sorted by their [`SequenceKey`]; patterns inherit the
/// position of the file that creates them. Paths with unsupported
/// extensions are ignored, tiled panels `m02`..`m04` never create a
/// pattern of their own.
///
/// # Errors
/// Returns [`Error::MalformedFilename`] if any supported file does not
/// follow the sequence convention, and [`Error::DuplicateKey`] if two
/// patterns share a display key.
pub fn classify<I, P>(paths: I) -> Result<Vec<PatternDescriptor>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let supported = paths
        .into_iter()
        .filter(|p| FileKind::from_path(p.as_ref()).is_some())
        .map(|p| p.as_ref().to_path_buf());
    let sorted = sort_by_sequence(supported)?;

    let mut seen = HashSet::new();
    let mut patterns = Vec::new();

    for (sequence_key, path) in sorted {
        let (display_key, kind) = match FileKind::from_path(&path) {
            Some(FileKind::Cbf) => (basename(&path), PatternKind::Single { path }),
            Some(FileKind::Nexus) => match tile_tag(&path) {
                Some((root, 1)) => {
                    let panels = panel_paths(&root);
                    (basename(&root), PatternKind::Tiled { root, panels })
                }
                Some(_) => continue,
                None => (basename(&path), PatternKind::Stack { path }),
            },
            None => continue,
        };

        if !seen.insert(display_key.clone()) {
            return Err(Error::DuplicateKey { key: display_key });
        }

        patterns.push(PatternDescriptor {
            display_key,
            sequence_key,
            kind,
        });
    }

    Ok(patterns)
}
