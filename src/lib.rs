//! # NDTiff
//!
//! Storage engine and access library for NDTiff datasets: N-dimensional
//! image data produced by microscopy acquisition engines, stored as a
//! directory of TIFF-shaped files plus an append-only binary index.
//!
//! A dataset is a sparse set of 2-D image planes (8/10/11/12/14/16-bit
//! monochrome or 8-bit RGB) addressed by named axis coordinates such as
//! `{time, channel, z, position, row, column}`, each carrying its own JSON
//! metadata. Datasets can be read from disk, written while concurrent
//! readers observe live progress, or held entirely in RAM.
//!
//! ## Features
//!
//! - **Multi-file container**: 4 GiB per-file cap with pre-allocation,
//!   transparent rollover, and truncation on finish
//! - **External index**: images are located through `NDTiff.index`, so
//!   readers seek straight to pixel data without walking IFD chains
//! - **Live reads**: one writer appends while readers observe indexed and
//!   RAM-pending images with ordering guarantees for viewers
//! - **Sparse N-D addressing**: integer- or string-valued axes, canonical
//!   axis ordering, lazy chunked array assembly
//! - **Tile stitching**: grid layouts with overlap removal, plus
//!   multi-resolution pyramid composites
//!
//! ## Architecture
//!
//! The library is organized into a few modules:
//!
//! - [`io`] - the file-access seam every component reads and writes through
//! - [`mod@format`] - the binary container: header, IFDs, index records
//! - [`dataset`] - the dataset engine, pyramid composite, and RAM sink
//! - [`axes`] - axis values, image coordinates, and canonical ordering
//!
//! ## Example
//!
//! ```
//! use ndtiff::{ArrayParams, Dataset, ImageCoords, ImageData, NdStorage};
//!
//! # fn main() -> Result<(), ndtiff::DatasetError> {
//! # let dir = tempfile::tempdir().unwrap();
//! // write a small time series
//! let dataset = Dataset::create(dir.path(), None)?;
//! dataset.initialize(serde_json::json!({}));
//! for time in 0..4 {
//!     let pixels = vec![time as u8; 32 * 32];
//!     dataset.put_image(
//!         &ImageCoords::new().time(time),
//!         &ImageData::mono8(32, 32, pixels),
//!         &serde_json::json!({"Frame": time}),
//!     )?;
//! }
//! dataset.finish()?;
//!
//! // read it back
//! let dataset = Dataset::open(dir.path())?;
//! assert!(dataset.has_image(&ImageCoords::new().time(2)));
//! let stack = dataset.as_array(ArrayParams::new())?.materialize()?;
//! assert_eq!(stack.shape(), &[4, 32, 32]);
//! # Ok(())
//! # }
//! ```

pub mod axes;
pub mod dataset;
pub mod error;
pub mod format;
pub mod io;

// Re-export commonly used types
pub use axes::{AxisDomain, AxisValue, ImageCoords};
pub use dataset::{
    open_dataset, open_dataset_with_io, AnyDataset, ArrayParams, ArrayView, Dataset,
    ImageProperties, NdArray, NdStorage, PyramidDataset, RamDataset, FULL_RESOLUTION_DIR,
    INDEX_FILE_NAME,
};
pub use error::{DatasetError, FormatError};
pub use format::{
    read_index, Dtype, Image, ImageData, IndexEntry, PixelBuffer, PixelType, SingleFileReader,
    SingleFileWriter, HEADER_SIZE, MAJOR_VERSION, MAX_FILE_SIZE, MINOR_VERSION, UNCOMPRESSED,
};
pub use io::{FileIo, ReadableFile, StdFileIo, WritableFile};
