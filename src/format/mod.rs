//! The NDTiff binary container.
//!
//! An NDTiff dataset is a directory of TIFF-shaped files plus an external
//! index. Each file carries a custom 28-byte header in front of an
//! otherwise ordinary little-endian TIFF body:
//!
//! ```text
//! Bytes 0-1:   byte order (0x4949 "II" or 0x4D4D "MM", matching the host)
//! Bytes 2-3:   TIFF magic 42
//! Bytes 4-7:   offset of the first IFD
//! Bytes 8-11:  NDTiff magic 483729
//! Bytes 12-15: major version
//! Bytes 16-19: minor version
//! Bytes 20-23: summary-metadata header word 2355492
//! Bytes 24-27: summary-metadata byte length
//! ```
//!
//! The UTF-8 JSON summary metadata follows the header; after it, each image
//! is one word-aligned `IFD | bits-per-sample | resolutions | pixels |
//! metadata` record. Images are located through the external `NDTiff.index`
//! file rather than by walking the IFD chain, so a reader seeks straight to
//! the recorded offsets.
//!
//! Files are pre-allocated to a 4 GiB cap when created and truncated to
//! their real length on finish; a dataset rolls over to a new file when the
//! next image would not fit.

mod image;
mod index;
mod reader;
mod writer;

pub use image::{Dtype, Image, ImageData, PixelBuffer, PixelType};
pub use index::{read_index, IndexEntry};
pub use reader::SingleFileReader;
pub use writer::SingleFileWriter;

/// Byte-order mark for little-endian files ("II" for Intel).
pub(crate) const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Byte-order mark for big-endian files ("MM" for Motorola).
pub(crate) const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Classic TIFF magic number.
pub(crate) const TIFF_MAGIC: u16 = 42;

/// Magic word identifying an NDTiff file, at byte 8 of the header.
pub(crate) const NDTIFF_MAGIC: u32 = 483729;

/// Header word preceding the summary-metadata length.
pub(crate) const SUMMARY_MD_HEADER: u32 = 2355492;

/// Size of the NDTiff header in bytes.
pub const HEADER_SIZE: usize = 28;

/// Major version of files this library writes.
pub const MAJOR_VERSION: u32 = 3;

/// Minor version of files this library writes.
pub const MINOR_VERSION: u32 = 3;

/// The only defined compression code for pixels and metadata.
pub const UNCOMPRESSED: u32 = 0;

const BYTES_PER_GIG: u64 = 1_073_741_824;

/// Hard cap on the size of a single file; the dataset rolls over to a new
/// file rather than exceed it.
pub const MAX_FILE_SIZE: u64 = 4 * BYTES_PER_GIG;
