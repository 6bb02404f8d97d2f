use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or producing the NDTiff binary container.
#[derive(Debug, Error)]
pub enum FormatError {
    /// I/O error from the underlying file backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte-order mark is neither II nor MM
    #[error("invalid byte order mark: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidByteOrderMark(u16),

    /// Byte-order mark does not match the host byte order
    #[error("byte order mark 0x{0:04X} does not match host byte order")]
    ByteOrderMismatch(u16),

    /// TIFF magic number is not 42
    #[error("TIFF magic 42 missing, got {0}")]
    BadTiffMagic(u16),

    /// Summary-metadata header word is not the expected constant
    #[error("summary metadata header wrong: expected {expected}, got {actual}")]
    BadSummaryHeader { expected: u32, actual: u32 },

    /// Major version of the file is not one this library reads
    #[error("unsupported NDTiff major version: {0}")]
    UnsupportedMajorVersion(u32),

    /// Pixel type code not in the defined 0-6 range
    #[error("unrecognized pixel type code: {0}")]
    UnknownPixelType(u32),

    /// Malformed JSON in summary metadata, image metadata, or index axes
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by dataset-level operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// I/O error from the underlying file backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error in the binary container format
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// `put_image` called on a dataset that was not opened writable
    #[error("cannot write to a read-only dataset")]
    ReadOnly,

    /// The requested coordinates match no image in the index or pending writes
    #[error("image with coordinates {coordinates} not present in dataset")]
    ImageNotFound { coordinates: String },

    /// Integer and string values were mixed on a single axis
    #[error("axis {axis:?} cannot mix integer and string values")]
    AxisTypeConflict { axis: String },

    /// An integer index into a string-valued axis is out of range
    #[error("index {index} out of range for string axis {axis:?} with {len} values")]
    StringAxisIndexOutOfRange {
        axis: String,
        index: i32,
        len: usize,
    },

    /// Stitching requested on a dataset with no declared tile overlap or grid
    #[error("this is not a stitchable dataset")]
    NotStitchable,

    /// Stitching requested but it is unknown whether this is a full resolution dataset
    #[error("undefined whether this is a full resolution dataset or not")]
    MissingResolutionFlag,

    /// No image has been seen yet, so width/height/dtype are unknown
    #[error("dataset is missing required image properties to create an array")]
    MissingImageProperties,

    /// No `NDTiff.index` file was found where one was expected
    #[error("cannot find NDTiff index in {0}")]
    IndexNotFound(PathBuf),

    /// The requested pyramid resolution level does not exist
    #[error("no resolution level {0} in this dataset")]
    UnknownResolutionLevel(u32),
}
