use crate::axes::ImageCoords;
use crate::error::FormatError;
use crate::format::image::PixelType;

/// The on-disk locator for one image: which file it lives in and where its
/// pixels and metadata sit inside that file.
///
/// Entries are stored back to back in the dataset's `NDTiff.index` file in
/// a portable little-endian record format, regardless of the byte order of
/// the TIFF files they point into:
///
/// ```text
/// u32  axes_length
/// [u8] UTF-8 JSON object of axis name -> value
/// u32  filename_length
/// [u8] UTF-8 filename (basename within the dataset directory)
/// u32  pixel_offset
/// u32  image_width
/// u32  image_height
/// u32  pixel_type
/// u32  pixel_compression
/// u32  metadata_offset
/// u32  metadata_length
/// u32  metadata_compression
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The axis coordinates identifying the image
    pub axes: ImageCoords,

    /// Basename of the file containing the image
    pub filename: String,

    /// Byte offset of the pixel data within the file
    pub pixel_offset: u32,

    /// Image width in pixels
    pub image_width: u32,

    /// Image height in pixels
    pub image_height: u32,

    /// Pixel type code
    pub pixel_type: PixelType,

    /// Pixel compression (only `UNCOMPRESSED` is defined)
    pub pixel_compression: u32,

    /// Byte offset of the image metadata within the file
    pub metadata_offset: u32,

    /// Byte length of the image metadata
    pub metadata_length: u32,

    /// Metadata compression (only `UNCOMPRESSED` is defined)
    pub metadata_compression: u32,
}

impl IndexEntry {
    /// Serialize this entry to its on-disk record form.
    pub fn encode(&self) -> Vec<u8> {
        let axes_json =
            serde_json::to_vec(&self.axes).expect("axis coordinates always serialize");
        let filename = self.filename.as_bytes();

        let mut buffer = Vec::with_capacity(8 + axes_json.len() + filename.len() + 32);
        buffer.extend_from_slice(&(axes_json.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&axes_json);
        buffer.extend_from_slice(&(filename.len() as u32).to_le_bytes());
        buffer.extend_from_slice(filename);
        for value in [
            self.pixel_offset,
            self.image_width,
            self.image_height,
            self.pixel_type.as_u32(),
            self.pixel_compression,
            self.metadata_offset,
            self.metadata_length,
            self.metadata_compression,
        ] {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        buffer
    }

    /// Decode one entry starting at `position`.
    ///
    /// Returns `Ok(None)` at end of stream: either a zero `axes_length`
    /// (the writer's terminator) or a record cut short by a crash. Both end
    /// the scan; a missing terminator is reported with a warning because
    /// the dataset may still be usable.
    pub fn decode(data: &[u8], position: usize) -> Result<Option<(Self, usize)>, FormatError> {
        let mut pos = position;

        let Some(axes_length) = read_u32_le(data, pos) else {
            warn_not_terminated();
            return Ok(None);
        };
        if axes_length == 0 {
            warn_not_terminated();
            return Ok(None);
        }
        pos += 4;

        let Some(axes_json) = data.get(pos..pos + axes_length as usize) else {
            warn_not_terminated();
            return Ok(None);
        };
        let axes: ImageCoords = serde_json::from_slice(axes_json)?;
        pos += axes_length as usize;

        let Some(filename_length) = read_u32_le(data, pos) else {
            warn_not_terminated();
            return Ok(None);
        };
        pos += 4;
        let Some(filename_bytes) = data.get(pos..pos + filename_length as usize) else {
            warn_not_terminated();
            return Ok(None);
        };
        let filename = String::from_utf8_lossy(filename_bytes).into_owned();
        pos += filename_length as usize;

        if data.len() < pos + 32 {
            warn_not_terminated();
            return Ok(None);
        }
        let mut fields = [0u32; 8];
        for field in fields.iter_mut() {
            *field = read_u32_le(data, pos).expect("length checked above");
            pos += 4;
        }
        let [pixel_offset, image_width, image_height, pixel_type, pixel_compression, metadata_offset, metadata_length, metadata_compression] =
            fields;

        let pixel_type =
            PixelType::from_u32(pixel_type).ok_or(FormatError::UnknownPixelType(pixel_type))?;

        Ok(Some((
            IndexEntry {
                axes,
                filename,
                pixel_offset,
                image_width,
                image_height,
                pixel_type,
                pixel_compression,
                metadata_offset,
                metadata_length,
                metadata_compression,
            },
            pos,
        )))
    }

    /// Whether this image decodes to an RGB buffer.
    pub fn is_rgb(&self) -> bool {
        self.pixel_type.is_rgb()
    }

    /// Byte length of the stored pixel data.
    pub fn pixel_byte_count(&self) -> usize {
        self.image_width as usize * self.image_height as usize * self.pixel_type.bytes_per_pixel()
    }
}

/// Decode an entire index file into its entries, in the order the writer
/// appended them.
///
/// The scan stops at a zero-length axes record or at a record cut short by
/// a crash, returning the entries parsed up to that point.
pub fn read_index(data: &[u8]) -> Result<Vec<IndexEntry>, FormatError> {
    let mut entries = Vec::new();
    let mut position = 0;
    while position < data.len() {
        match IndexEntry::decode(data, position)? {
            Some((entry, next)) => {
                entries.push(entry);
                position = next;
            }
            None => break,
        }
    }
    Ok(entries)
}

#[inline]
fn read_u32_le(data: &[u8], position: usize) -> Option<u32> {
    let bytes = data.get(position..position + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn warn_not_terminated() {
    tracing::warn!(
        "index appears to not have been properly terminated (the dataset may still work)"
    );
}

// =============================================================================
// Tests
// =============================================================================
