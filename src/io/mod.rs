//! I/O layer.
//!
//! All file access in this crate goes through the [`FileIo`] capability
//! trait so that the format parsers and the dataset engine never touch the
//! filesystem directly. The default backend is the host filesystem; tests
//! inject in-memory and failing backends through the same seam.

mod file_io;

pub use file_io::{FileIo, ReadableFile, StdFileIo, WritableFile};
