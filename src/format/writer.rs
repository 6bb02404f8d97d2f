use std::path::Path;

use serde_json::Value;

use crate::axes::ImageCoords;
use crate::error::FormatError;
use crate::format::index::IndexEntry;
use crate::format::{
    ImageData, BYTE_ORDER_BIG_ENDIAN, BYTE_ORDER_LITTLE_ENDIAN, MAJOR_VERSION, MAX_FILE_SIZE,
    MINOR_VERSION, NDTIFF_MAGIC, SUMMARY_MD_HEADER, TIFF_MAGIC, UNCOMPRESSED,
};
use crate::io::{FileIo, WritableFile};

/// Number of directory entries in every IFD this writer produces.
const ENTRIES_PER_IFD: u32 = 13;

/// Slack reserved by `has_space_to_write` for alignment and padding.
const EXTRA_PADDING: u64 = 5_000_000;

// Required TIFF tags, in the order they appear in each IFD.
const WIDTH: u16 = 256;
const HEIGHT: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC_INTERPRETATION: u16 = 262;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const ROWS_PER_STRIP: u16 = 278;
const STRIP_BYTE_COUNTS: u16 = 279;
const X_RESOLUTION: u16 = 282;
const Y_RESOLUTION: u16 = 283;
const RESOLUTION_UNIT: u16 = 296;
/// Custom tag carrying the per-image JSON metadata.
const MM_METADATA: u16 = 51123;

/// Writer for a single NDTiff file.
///
/// Creating the writer pre-allocates the file to the 4 GiB cap, so later
/// appends cannot fail mid-image for lack of disk space, and writes the
/// 28-byte header plus the summary metadata. Each [`write_image`] call
/// appends one `IFD | bits-per-sample | resolutions | pixels | metadata`
/// record, word-aligned, and returns the [`IndexEntry`] locating it.
/// [`finish_writing`] patches the last IFD's next-IFD offset to zero and
/// truncates the pre-allocated tail.
///
/// [`write_image`]: SingleFileWriter::write_image
/// [`finish_writing`]: SingleFileWriter::finish_writing
pub struct SingleFileWriter {
    file: Box<dyn WritableFile>,
    filename: String,
    next_ifd_offset_location: Option<u64>,
    res_numerator: u32,
    res_denominator: u32,
}

impl SingleFileWriter {
    /// Create `filename` under `directory` (creating the directory if
    /// needed), pre-allocate it, and write the header and summary metadata.
    pub fn create(
        file_io: &dyn FileIo,
        directory: &Path,
        filename: &str,
        summary_metadata: &Value,
    ) -> Result<Self, FormatError> {
        tracing::debug!(directory = %directory.display(), filename, "creating NDTiff file");
        file_io.create_dir_all(directory)?;
        let path = file_io.path_join(directory, filename);
        let mut file = file_io.open_write(&path)?;

        // reserve the full file size up front
        file.seek(MAX_FILE_SIZE - 1)?;
        file.write_all(&[0])?;
        file.flush()?;
        file.seek(0)?;

        let mut writer = Self {
            file,
            filename: filename.to_owned(),
            next_ifd_offset_location: None,
            res_numerator: 1,
            res_denominator: 1,
        };
        writer.write_header_and_summary_md(summary_metadata)?;
        Ok(writer)
    }

    /// Basename of the file being written.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn write_header_and_summary_md(&mut self, summary_metadata: &Value) -> Result<(), FormatError> {
        let summary_bytes = serde_json::to_vec(summary_metadata)?;
        let md_length = summary_bytes.len() as u32;

        let mut first_ifd_offset = 28 + md_length;
        if first_ifd_offset % 2 == 1 {
            first_ifd_offset += 1; // start first IFD on a word
        }

        let mut header = Vec::with_capacity(28);
        if cfg!(target_endian = "big") {
            header.extend_from_slice(&BYTE_ORDER_BIG_ENDIAN.to_be_bytes());
        } else {
            header.extend_from_slice(&BYTE_ORDER_LITTLE_ENDIAN.to_le_bytes());
        }
        header.extend_from_slice(&TIFF_MAGIC.to_le_bytes());
        header.extend_from_slice(&first_ifd_offset.to_le_bytes());
        header.extend_from_slice(&NDTIFF_MAGIC.to_le_bytes());
        header.extend_from_slice(&MAJOR_VERSION.to_le_bytes());
        header.extend_from_slice(&MINOR_VERSION.to_le_bytes());
        header.extend_from_slice(&SUMMARY_MD_HEADER.to_le_bytes());
        header.extend_from_slice(&md_length.to_le_bytes());

        self.file.write_all(&header)?;
        self.file.write_all(&summary_bytes)?;
        Ok(())
    }

    /// Whether another image of this size still fits under the 4 GiB cap.
    pub fn has_space_to_write(
        &mut self,
        image: &ImageData,
        metadata_length: usize,
    ) -> Result<bool, FormatError> {
        let ifd_size = (ENTRIES_PER_IFD * 12 + 4 + 16) as u64;
        let size = metadata_length as u64
            + ifd_size
            + image.pixels().stored_len() as u64
            + EXTRA_PADDING
            + self.file.position()?;
        Ok(size < MAX_FILE_SIZE)
    }

    /// Append one image record and return the index entry locating it.
    ///
    /// `metadata` is the already-serialized UTF-8 JSON of the per-image
    /// metadata.
    pub fn write_image(
        &mut self,
        coordinates: &ImageCoords,
        image: &ImageData,
        metadata: &[u8],
    ) -> Result<IndexEntry, FormatError> {
        let mut position = self.file.position()?;
        if position % 2 == 1 {
            position += 1; // make IFD start on a word
            self.file.seek(position)?;
        }

        let rgb = image.pixels().is_rgb();
        let byte_depth = image.pixels().byte_depth() as u32;
        let pixel_byte_count = image.pixels().stored_len() as u64;

        // 2 bytes for the entry count, 12 per entry, 4 for the next-IFD
        // offset, 6 for bits per sample if RGB, 16 for the two resolution
        // rationals
        let next_ifd_offset_location = position + 2 + ENTRIES_PER_IFD as u64 * 12;
        let bits_per_sample_offset = next_ifd_offset_location + 4;
        let x_resolution_offset = bits_per_sample_offset + if rgb { 6 } else { 0 };
        let y_resolution_offset = x_resolution_offset + 8;
        let pixel_data_offset = y_resolution_offset + 8;
        let metadata_offset = pixel_data_offset + pixel_byte_count;

        let mut next_ifd_offset = metadata_offset + metadata.len() as u64;
        if next_ifd_offset % 2 == 1 {
            next_ifd_offset += 1;
        }

        let mut buffer = Vec::with_capacity(2 + ENTRIES_PER_IFD as usize * 12 + 4 + 6 + 16);
        buffer.extend_from_slice(&(ENTRIES_PER_IFD as u16).to_le_bytes());

        write_ifd_entry(&mut buffer, WIDTH, 4, 1, image.width());
        write_ifd_entry(&mut buffer, HEIGHT, 4, 1, image.height());
        write_ifd_entry(
            &mut buffer,
            BITS_PER_SAMPLE,
            3,
            if rgb { 3 } else { 1 },
            if rgb {
                bits_per_sample_offset as u32
            } else {
                byte_depth * 8
            },
        );
        write_ifd_entry(&mut buffer, COMPRESSION, 3, 1, 1);
        write_ifd_entry(
            &mut buffer,
            PHOTOMETRIC_INTERPRETATION,
            3,
            1,
            if rgb { 2 } else { 1 },
        );
        write_ifd_entry(&mut buffer, STRIP_OFFSETS, 4, 1, pixel_data_offset as u32);
        write_ifd_entry(&mut buffer, SAMPLES_PER_PIXEL, 3, 1, if rgb { 3 } else { 1 });
        write_ifd_entry(&mut buffer, ROWS_PER_STRIP, 3, 1, image.height());
        write_ifd_entry(&mut buffer, STRIP_BYTE_COUNTS, 4, 1, pixel_byte_count as u32);
        write_ifd_entry(&mut buffer, X_RESOLUTION, 5, 1, x_resolution_offset as u32);
        write_ifd_entry(&mut buffer, Y_RESOLUTION, 5, 1, y_resolution_offset as u32);
        write_ifd_entry(&mut buffer, RESOLUTION_UNIT, 3, 1, 3);
        write_ifd_entry(
            &mut buffer,
            MM_METADATA,
            2,
            metadata.len() as u32,
            metadata_offset as u32,
        );

        buffer.extend_from_slice(&(next_ifd_offset as u32).to_le_bytes());

        if rgb {
            let bits = (byte_depth * 8) as u16;
            for _ in 0..3 {
                buffer.extend_from_slice(&bits.to_le_bytes());
            }
        }
        for _ in 0..2 {
            buffer.extend_from_slice(&self.res_numerator.to_le_bytes());
            buffer.extend_from_slice(&self.res_denominator.to_le_bytes());
        }

        self.file.write_all(&buffer)?;
        self.file.write_all(&image.pixels().to_stored())?;
        self.file.write_all(metadata)?;

        self.next_ifd_offset_location = Some(next_ifd_offset_location);

        Ok(IndexEntry {
            axes: coordinates.clone(),
            filename: self.filename.clone(),
            pixel_offset: pixel_data_offset as u32,
            image_width: image.width(),
            image_height: image.height(),
            pixel_type: image.pixel_type(),
            pixel_compression: UNCOMPRESSED,
            metadata_offset: metadata_offset as u32,
            metadata_length: metadata.len() as u32,
            metadata_compression: UNCOMPRESSED,
        })
    }

    /// Terminate the IFD chain, truncate the pre-allocated tail, and flush.
    pub fn finish_writing(&mut self) -> Result<(), FormatError> {
        let end = self.file.position()?;
        if let Some(location) = self.next_ifd_offset_location.take() {
            self.file.seek(location)?;
            self.file.write_all(&0u32.to_le_bytes())?;
            self.file.seek(end)?;
        }
        self.file.truncate(end)?;
        self.file.flush()?;
        Ok(())
    }
}

fn write_ifd_entry(buffer: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    buffer.extend_from_slice(&tag.to_le_bytes());
    buffer.extend_from_slice(&field_type.to_le_bytes());
    buffer.extend_from_slice(&count.to_le_bytes());
    buffer.extend_from_slice(&value.to_le_bytes());
}

// =============================================================================
// Tests
// =============================================================================
