use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::FormatError;
use crate::format::index::IndexEntry;
use crate::format::{
    Image, BYTE_ORDER_BIG_ENDIAN, BYTE_ORDER_LITTLE_ENDIAN, HEADER_SIZE, MAJOR_VERSION,
    MINOR_VERSION, SUMMARY_MD_HEADER, TIFF_MAGIC,
};
use crate::io::{FileIo, ReadableFile};

/// Reader for a single NDTiff file.
///
/// Opening a file parses and validates the 28-byte header and the summary
/// metadata; after that, images and per-image metadata are fetched by
/// seeking to the offsets recorded in an [`IndexEntry`]. The file handle is
/// guarded by an internal mutex so one seek+read pair is never interleaved
/// with another; readers for distinct files can run concurrently.
pub struct SingleFileReader {
    path: PathBuf,
    file: Mutex<Box<dyn ReadableFile>>,
    summary_metadata: Value,
    major_version: u32,
    minor_version: u32,
    first_ifd_offset: u32,
}

impl std::fmt::Debug for SingleFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFileReader")
            .field("path", &self.path)
            .field("summary_metadata", &self.summary_metadata)
            .field("major_version", &self.major_version)
            .field("minor_version", &self.minor_version)
            .field("first_ifd_offset", &self.first_ifd_offset)
            .finish_non_exhaustive()
    }
}

impl SingleFileReader {
    /// Open an NDTiff file and parse its header.
    ///
    /// # Errors
    ///
    /// - [`FormatError::InvalidByteOrderMark`] if the first two bytes are
    ///   neither II nor MM
    /// - [`FormatError::ByteOrderMismatch`] if the mark does not match the
    ///   host byte order
    /// - [`FormatError::BadTiffMagic`] if the TIFF magic is not 42
    /// - [`FormatError::BadSummaryHeader`] if the summary-metadata header
    ///   word is wrong
    pub fn open(file_io: &dyn FileIo, path: &Path) -> Result<Self, FormatError> {
        tracing::debug!(path = %path.display(), "opening NDTiff file");
        let mut file = file_io.open_read(path)?;

        let header = file.read_exact_at(0, HEADER_SIZE)?;

        let mark = u16::from_le_bytes([header[0], header[1]]);
        match mark {
            BYTE_ORDER_LITTLE_ENDIAN => {
                if cfg!(target_endian = "big") {
                    return Err(FormatError::ByteOrderMismatch(mark));
                }
            }
            BYTE_ORDER_BIG_ENDIAN => {
                if cfg!(target_endian = "little") {
                    return Err(FormatError::ByteOrderMismatch(mark));
                }
            }
            _ => return Err(FormatError::InvalidByteOrderMark(mark)),
        }

        let magic = u16::from_le_bytes([header[2], header[3]]);
        if magic != TIFF_MAGIC {
            return Err(FormatError::BadTiffMagic(magic));
        }
        let first_ifd_offset = read_u32(&header, 4);

        let major_version = read_u32(&header, 12);
        let minor_version = read_u32(&header, 16);

        let summary_header = read_u32(&header, 20);
        if summary_header != SUMMARY_MD_HEADER {
            return Err(FormatError::BadSummaryHeader {
                expected: SUMMARY_MD_HEADER,
                actual: summary_header,
            });
        }
        let summary_length = read_u32(&header, 24);
        let summary_bytes = file.read_exact_at(HEADER_SIZE as u64, summary_length as usize)?;
        let summary_metadata = serde_json::from_slice(&summary_bytes)?;

        Ok(Self {
            path: path.to_owned(),
            file: Mutex::new(file),
            summary_metadata,
            major_version,
            minor_version,
            first_ifd_offset,
        })
    }

    /// Attach to a file an in-process writer is currently producing.
    ///
    /// The writer already knows the summary metadata, so header parsing is
    /// skipped and the current format version is assumed.
    pub fn attach(
        file_io: &dyn FileIo,
        path: &Path,
        summary_metadata: Value,
    ) -> Result<Self, FormatError> {
        let file = file_io.open_read(path)?;
        Ok(Self {
            path: path.to_owned(),
            file: Mutex::new(file),
            summary_metadata,
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            first_ifd_offset: 0,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The summary metadata stored at the top of the file.
    pub fn summary_metadata(&self) -> &Value {
        &self.summary_metadata
    }

    /// Major format version from the header.
    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    /// Minor format version from the header.
    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    /// Byte offset of the first IFD.
    pub fn first_ifd_offset(&self) -> u32 {
        self.first_ifd_offset
    }

    /// Read the pixels of the image located by `entry`.
    pub fn read_image(&self, entry: &IndexEntry) -> Result<Image, FormatError> {
        let data = {
            let mut file = self.file.lock().expect("reader mutex poisoned");
            file.read_exact_at(entry.pixel_offset as u64, entry.pixel_byte_count())?
        };
        Ok(Image::new(
            entry.image_width,
            entry.image_height,
            entry.pixel_type,
            data,
        ))
    }

    /// Read and parse the JSON metadata of the image located by `entry`.
    pub fn read_metadata(&self, entry: &IndexEntry) -> Result<Value, FormatError> {
        let data = {
            let mut file = self.file.lock().expect("reader mutex poisoned");
            file.read_exact_at(entry.metadata_offset as u64, entry.metadata_length as usize)?
        };
        Ok(serde_json::from_slice(&data)?)
    }
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// =============================================================================
// Tests
// =============================================================================
