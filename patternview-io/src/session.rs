//! Pattern registry and viewing session.
//!
//! A [`Session`] owns the patterns of the most recent scan and the
//! reader behind each one. Readers are opened lazily when one of their
//! frames is first activated and closed again when a different pattern
//! becomes active, so at most one pattern holds open files at a time.
//!
//! # Frame keys
//!
//! Patterns are addressed by their display key. Once a stack or tiled
//! pattern with more than one frame has been opened, each frame is also
//! addressable by `<display key>_<NNNNN>` (1-based). The list of frame
//! keys is built on first open and kept for the rest of the session,
//! even if the file gains frames later.

use crate::discover::discover;
use crate::source::{create_source, PatternSource, ReaderConfig};
use crate::{Error, Result};
use log::{debug, info, warn};
use ndarray::ArrayView2;
use patternview_core::{classify, PatternDescriptor, PatternKind, SequenceKey};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Key of frame `index` (0-based) of a pattern.
#[must_use]
pub fn frame_key(display_key: &str, index: usize) -> String {
    format!("{display_key}_{:05}", index + 1)
}

/// One pattern in the session's display list.
pub struct PatternEntry {
    descriptor: PatternDescriptor,
    source: Box<dyn PatternSource>,
    children: Option<Vec<String>>,
}

impl std::fmt::Debug for PatternEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternEntry")
            .field("descriptor", &self.descriptor)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl PatternEntry {
    /// Key shown in the pattern list.
    #[must_use]
    pub fn display_key(&self) -> &str {
        &self.descriptor.display_key
    }

    /// Sequence key that placed the pattern in the list.
    #[must_use]
    pub fn sequence_key(&self) -> &SequenceKey {
        &self.descriptor.sequence_key
    }

    #[must_use]
    pub fn kind(&self) -> &PatternKind {
        &self.descriptor.kind
    }

    /// Frame keys, or `None` if the pattern has never been opened.
    ///
    /// Single-frame patterns have an empty list once opened.
    #[must_use]
    pub fn children(&self) -> Option<&[String]> {
        self.children.as_deref()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Number of frames while the reader is open.
    #[must_use]
    pub fn frame_count(&self) -> Option<usize> {
        self.source.frame_count()
    }

    fn build_children(&mut self) {
        if self.children.is_some() {
            return;
        }
        let count = self.source.frame_count().unwrap_or(1);
        let children = if count > 1 {
            (0..count)
                .map(|i| frame_key(&self.descriptor.display_key, i))
                .collect()
        } else {
            Vec::new()
        };
        self.children = Some(children);
    }

    fn frame_name(&self, frame: usize) -> String {
        match self.descriptor.kind {
            PatternKind::Single { .. } => self.descriptor.display_key.clone(),
            PatternKind::Stack { .. } | PatternKind::Tiled { .. } => {
                frame_key(&self.descriptor.display_key, frame)
            }
        }
    }
}

/// Pixels and name of the activated pattern.
///
/// The pixels borrow the reader's frame buffer; a tiled pattern reuses
/// its buffer, so the view does not outlive the next activation.
#[derive(Debug)]
pub struct Activation<'a> {
    pub name: String,
    pub pixels: ArrayView2<'a, f32>,
}

/// Registry of scanned patterns and their open/close lifecycle.
#[derive(Default)]
pub struct Session {
    config: ReaderConfig,
    entries: Vec<PatternEntry>,
    index: HashMap<String, usize>,
    active: Option<usize>,
}

impl Session {
    /// Creates an empty session with default reader settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session with custom reader settings.
    #[must_use]
    pub fn with_config(config: ReaderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Discovers and classifies the patterns matching a path or glob.
    ///
    /// On success all readers of the previous scan are closed and its
    /// patterns replaced. On failure the session is left unchanged.
    ///
    /// # Errors
    /// Returns [`Error::NoFilesFound`] if nothing matched or no pattern
    /// could be formed, and [`Error::Core`] for malformed filenames or
    /// duplicate keys.
    pub fn scan(&mut self, expr: &str) -> Result<&[PatternEntry]> {
        let paths = discover(expr)?;
        self.replace(classify(paths)?, expr)
    }

    /// Classifies an explicit list of pattern files, replacing the
    /// current patterns on success.
    ///
    /// # Errors
    /// Returns [`Error::NoFilesFound`] if the files form no pattern, and
    /// [`Error::Core`] for malformed filenames or duplicate keys.
    pub fn load<I, P>(&mut self, paths: I) -> Result<&[PatternEntry]>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        let descriptors = classify(&paths)?;
        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.replace(descriptors, &listed)
    }

    fn replace(
        &mut self,
        descriptors: Vec<PatternDescriptor>,
        pattern: &str,
    ) -> Result<&[PatternEntry]> {
        // Lone _m02.._m04 panels or unsupported files classify to nothing.
        if descriptors.is_empty() {
            return Err(Error::NoFilesFound {
                pattern: pattern.to_string(),
            });
        }
        self.reset();

        for descriptor in descriptors {
            let source = create_source(&descriptor, &self.config);
            self.index
                .insert(descriptor.display_key.clone(), self.entries.len());
            self.entries.push(PatternEntry {
                descriptor,
                source,
                children: None,
            });
        }
        info!("loaded {} patterns", self.entries.len());
        Ok(&self.entries)
    }

    /// Closes every reader and forgets all patterns.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.source.close();
        }
        self.entries.clear();
        self.index.clear();
        self.active = None;
    }

    /// Patterns in display order.
    #[must_use]
    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    /// Looks up a pattern by display key.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&PatternEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Display key of the active pattern.
    #[must_use]
    pub fn active_key(&self) -> Option<&str> {
        self.active.map(|i| self.entries[i].display_key())
    }

    /// Display keys of patterns whose reader is open.
    #[must_use]
    pub fn open_roots(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_open())
            .map(PatternEntry::display_key)
            .collect()
    }

    /// Resolves a display or frame key to `(entry index, frame index)`.
    ///
    /// A display key resolves to `None` for the frame, meaning the
    /// pattern's first frame.
    fn resolve(&self, key: &str) -> Result<(usize, Option<usize>)> {
        if let Some(&i) = self.index.get(key) {
            return Ok((i, None));
        }

        let unknown = || Error::UnknownKey(key.to_string());
        let (parent, number) = key.rsplit_once('_').ok_or_else(unknown)?;
        if number.len() != 5 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unknown());
        }
        let &i = self.index.get(parent).ok_or_else(unknown)?;
        let frame = number
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(unknown)?;

        let built = self.entries[i].children.as_deref().unwrap_or_default();
        if frame >= built.len() {
            return Err(unknown());
        }
        Ok((i, Some(frame)))
    }

    /// Makes a pattern or frame the active one and returns its pixels.
    ///
    /// The pattern's reader is opened if needed. The previously active
    /// reader is closed only after the new frame has been read, so a
    /// failed activation leaves the previous pattern active and open.
    ///
    /// # Errors
    /// Returns [`Error::UnknownKey`] for keys not in the session, and any
    /// error raised while opening the reader or reading the frame.
    pub fn activate(&mut self, key: &str) -> Result<Activation<'_>> {
        let (idx, frame) = self.resolve(key)?;
        let frame = frame.unwrap_or(0);

        let entry = &mut self.entries[idx];
        let opened_now = !entry.source.is_open();
        if opened_now {
            entry.source.open()?;
            entry.build_children();
        }

        if let Err(e) = entry.source.load_frame(frame) {
            if opened_now {
                entry.source.close();
            }
            warn!("activation of {key} failed: {e}");
            return Err(e);
        }
        let name = entry.frame_name(frame);
        debug!("activated {name}");

        if let Some(previous) = self.active.filter(|&p| p != idx) {
            self.entries[previous].source.close();
        }
        self.active = Some(idx);

        let pixels = self.entries[idx]
            .source
            .frame()
            .ok_or_else(|| Error::NotOpen(key.to_string()))?;
        Ok(Activation { name, pixels })
    }
}
