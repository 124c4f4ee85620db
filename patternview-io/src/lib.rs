//! patternview-io: Pattern file readers and viewing session.
//!
//! This crate reads CBF frames and HDF5/NeXus detector stacks, stitches
//! four-panel Lambda outputs into composite frames, and manages the
//! open/close lifecycle of readers behind a [`Session`].
//!

pub mod cbf;
pub mod discover;
mod error;
mod mmap;
pub mod session;
mod single;
pub mod source;
mod stack;
mod tiled;

pub use cbf::{read_cbf, write_cbf};
pub use discover::discover;
pub use error::{Error, Result};
pub use mmap::MappedFile;
pub use session::{frame_key, Activation, PatternEntry, Session};
pub use single::CbfSource;
pub use source::{create_source, PatternSource, ReaderConfig, DEFAULT_DATASET};
pub use stack::StackSource;
pub use tiled::TiledSource;
