//! Filename sequencing.
//!
//! Detector filenames carry a stem, a 5-digit run number, an optional
//! repeat-scan (`r<n>`) or sub-index (`_<d>`) qualifier, and a trailing
//! 5-digit frame number:
//!
//! ```text
//! pvdf_5b04_yscan_full_t_00002_00001.cbf
//! pvdf_5b04_yscan_full_t_00002r3_00001.cbf
//! pvdf_5b_02_yscan_0_ii_00004_2_00011.cbf
//! ```
//!
//! The parsed [`SequenceKey`] orders patterns for display.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn sequence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:.*[\\/]+)?(.*)(\d{5})(?:r(\d{1,3}))?(?:_(\d))?_(\d{5})")
            .unwrap_or_else(|e| panic!("sequence pattern is a valid regex: {e}"))
    })
}

/// Optional qualifier between the run and frame numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyQualifier {
    /// Repeat scan, `r<1-3 digits>` directly after the run number.
    Repeat(u32),
    /// Sub-index, `_<digit>` between run and frame.
    SubIndex(u32),
}

impl KeyQualifier {
    /// Numeric value used for ordering.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Self::Repeat(n) | Self::SubIndex(n) => n,
        }
    }
}

/// Sort key extracted from a pattern filename.
///
/// Ordering is lexicographic over the tuple `(stem, run, [qualifier], frame)`.
/// Keys without a qualifier are a 3-tuple, so their frame number is
/// compared against the qualifier of a 4-tuple key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub stem: String,
    pub run: u32,
    pub qualifier: Option<KeyQualifier>,
    pub frame: u32,
}

impl SequenceKey {
    /// Numeric components after the stem, in tuple order.
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        iter::once(self.run)
            .chain(self.qualifier.map(KeyQualifier::value))
            .chain(iter::once(self.frame))
    }
}

impl Ord for SequenceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stem
            .cmp(&other.stem)
            .then_with(|| self.numbers().cmp(other.numbers()))
    }
}

impl PartialOrd for SequenceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}", self.stem)?;
        for n in self.numbers() {
            write!(f, ", {n}")?;
        }
        write!(f, ")")
    }
}

/// Parses the sequence key of a filename or path.
///
/// Any directory prefix is discarded before matching.
///
/// # Errors
/// Returns [`Error::MalformedFilename`] if the name does not follow the
/// sequence convention.
pub fn parse_sequence_key(name: &str) -> Result<SequenceKey> {
    let malformed = || Error::MalformedFilename {
        name: name.to_string(),
    };
    let caps = sequence_regex().captures(name).ok_or_else(malformed)?;

    let number = |idx: usize| -> Result<Option<u32>> {
        caps.get(idx)
            .map(|m| m.as_str().parse::<u32>().map_err(|_| malformed()))
            .transpose()
    };

    let run = number(2)?.ok_or_else(malformed)?;
    let frame = number(5)?.ok_or_else(malformed)?;
    let qualifier = match (number(3)?, number(4)?) {
        (Some(repeat), _) => Some(KeyQualifier::Repeat(repeat)),
        (None, Some(sub)) => Some(KeyQualifier::SubIndex(sub)),
        (None, None) => None,
    };

    Ok(SequenceKey {
        stem: caps.get(1).map_or("", |m| m.as_str()).to_string(),
        run,
        qualifier,
        frame,
    })
}

/// Parses and sorts a batch of paths into display order.
///
/// Paths with equal keys (for example the four tiles of one Lambda
/// acquisition) are ordered by path so the result is deterministic.
///
/// # Errors
/// Returns [`Error::MalformedFilename`] for the first path whose name
/// does not follow the sequence convention.
pub fn sort_by_sequence<I, P>(paths: I) -> Result<Vec<(SequenceKey, PathBuf)>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut keyed = paths
        .into_iter()
        .map(|path| {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .ok_or_else(|| Error::MalformedFilename {
                    name: path.display().to_string(),
                })?;
            Ok((parse_sequence_key(&name)?, path.to_path_buf()))
        })
        .collect::<Result<Vec<_>>>()?;

    keyed.sort_by(|(ka, pa), (kb, pb)| ka.cmp(kb).then_with(|| pa.cmp(pb)));
    Ok(keyed)
}
