use bytes::Bytes;

// =============================================================================
// Pixel types
// =============================================================================

/// On-disk pixel type codes.
///
/// These are the values stored in the `pixel_type` field of every index
/// entry. Codes 3-6 are monochrome data with fewer than 16 significant bits
/// that is nevertheless stored two bytes per pixel, so they all read back as
/// 16-bit buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelType {
    /// 8-bit monochrome, one byte per pixel
    EightBit = 0,

    /// 16-bit monochrome, two bytes per pixel
    SixteenBit = 1,

    /// 8-bit RGB, three bytes per pixel (BGR byte order)
    EightBitRgb = 2,

    /// 10-bit monochrome stored in 16 bits
    TenBit = 3,

    /// 12-bit monochrome stored in 16 bits
    TwelveBit = 4,

    /// 14-bit monochrome stored in 16 bits
    FourteenBit = 5,

    /// 11-bit monochrome stored in 16 bits
    ElevenBit = 6,
}

impl PixelType {
    /// Create a PixelType from its on-disk code.
    ///
    /// Returns `None` for codes outside the defined 0-6 range.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PixelType::EightBit),
            1 => Some(PixelType::SixteenBit),
            2 => Some(PixelType::EightBitRgb),
            3 => Some(PixelType::TenBit),
            4 => Some(PixelType::TwelveBit),
            5 => Some(PixelType::FourteenBit),
            6 => Some(PixelType::ElevenBit),
            _ => None,
        }
    }

    /// The on-disk code.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Bytes of storage per pixel: 1, 2, or 3 for RGB.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::EightBit => 1,
            PixelType::EightBitRgb => 3,
            _ => 2,
        }
    }

    /// The element type buffers of this pixel type decode to.
    #[inline]
    pub const fn dtype(self) -> Dtype {
        match self {
            PixelType::EightBit | PixelType::EightBitRgb => Dtype::U8,
            _ => Dtype::U16,
        }
    }

    /// Number of significant bits per sample.
    #[inline]
    pub const fn bit_depth(self) -> u8 {
        match self {
            PixelType::EightBit | PixelType::EightBitRgb => 8,
            PixelType::TenBit => 10,
            PixelType::ElevenBit => 11,
            PixelType::TwelveBit => 12,
            PixelType::FourteenBit => 14,
            PixelType::SixteenBit => 16,
        }
    }

    /// Whether this is three-sample RGB data.
    #[inline]
    pub const fn is_rgb(self) -> bool {
        matches!(self, PixelType::EightBitRgb)
    }
}

/// Element type of a decoded pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// Unsigned 8-bit samples
    U8,
    /// Unsigned 16-bit samples
    U16,
}

impl Dtype {
    /// Bytes per sample.
    #[inline]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::U16 => 2,
        }
    }
}

// =============================================================================
// Stored images
// =============================================================================

/// One decoded 2-D image plane in its stored form.
///
/// Monochrome data is `width * height * bytes_per_pixel` bytes, row-major;
/// 16-bit samples are in host byte order. RGB data is three bytes per pixel
/// in BGR order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixel_type: PixelType,
    data: Bytes,
}

impl Image {
    /// Wrap a raw pixel buffer. `data` must hold exactly
    /// `width * height * pixel_type.bytes_per_pixel()` bytes.
    pub fn new(width: u32, height: u32, pixel_type: PixelType, data: Bytes) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * pixel_type.bytes_per_pixel()
        );
        Self {
            width,
            height,
            pixel_type,
            data,
        }
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The stored pixel type.
    #[inline]
    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// The element type of the decoded buffer.
    #[inline]
    pub fn dtype(&self) -> Dtype {
        self.pixel_type.dtype()
    }

    /// The raw pixel bytes.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Shape of the decoded buffer: `[height, width]`, or
    /// `[height, width, 3]` for RGB.
    pub fn shape(&self) -> Vec<usize> {
        if self.pixel_type.is_rgb() {
            vec![self.height as usize, self.width as usize, 3]
        } else {
            vec![self.height as usize, self.width as usize]
        }
    }

    /// The sample at `(y, x)`, widened to u64. For RGB, `sample` selects the
    /// stored byte within the pixel; for monochrome it must be 0.
    pub fn sample(&self, y: usize, x: usize, sample: usize) -> u64 {
        let bpp = self.pixel_type.bytes_per_pixel();
        let offset = (y * self.width as usize + x) * bpp;
        match self.pixel_type.dtype() {
            Dtype::U8 => self.data[offset + sample] as u64,
            Dtype::U16 => {
                u16::from_ne_bytes([self.data[offset], self.data[offset + 1]]) as u64
            }
        }
    }
}

// =============================================================================
// Write-side pixel buffers
// =============================================================================

/// Pixel data handed to `put_image`, before it is laid out on disk.
///
/// RGB is accepted only as a four-bytes-per-pixel source buffer; the writer
/// keeps bytes `[2, 1, 0]` of each four-byte group and drops byte 3, so an
/// ARGB-like source lands on disk as three BGR-ordered bytes per pixel.
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    /// One byte per pixel
    Mono8(Bytes),
    /// Two bytes per pixel, host byte order
    Mono16(Bytes),
    /// Four bytes per pixel source layout, stored as three
    Rgb8(Bytes),
}

impl PixelBuffer {
    /// Number of bytes this buffer occupies on disk.
    pub fn stored_len(&self) -> usize {
        match self {
            PixelBuffer::Mono8(data) | PixelBuffer::Mono16(data) => data.len(),
            PixelBuffer::Rgb8(data) => data.len() / 4 * 3,
        }
    }

    /// Whether this is RGB data.
    pub fn is_rgb(&self) -> bool {
        matches!(self, PixelBuffer::Rgb8(_))
    }

    /// Bytes per sample of the source data (1 or 2).
    pub(crate) fn byte_depth(&self) -> usize {
        match self {
            PixelBuffer::Mono8(_) | PixelBuffer::Rgb8(_) => 1,
            PixelBuffer::Mono16(_) => 2,
        }
    }

    /// The bytes as they are laid out on disk. Monochrome buffers pass
    /// through unchanged; RGB buffers are reshuffled four-to-three.
    pub(crate) fn to_stored(&self) -> Bytes {
        match self {
            PixelBuffer::Mono8(data) | PixelBuffer::Mono16(data) => data.clone(),
            PixelBuffer::Rgb8(data) => {
                let num_pixels = data.len() / 4;
                let mut stored = Vec::with_capacity(num_pixels * 3);
                for pixel in data.chunks_exact(4) {
                    stored.push(pixel[2]);
                    stored.push(pixel[1]);
                    stored.push(pixel[0]);
                }
                Bytes::from(stored)
            }
        }
    }
}

/// A 2-D image handed to `put_image`: dimensions, pixels, and an optional
/// explicit bit depth for 16-bit payloads holding 10/11/12/14-bit data.
#[derive(Debug, Clone)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: PixelBuffer,
    bit_depth: Option<u8>,
}

impl ImageData {
    /// 8-bit monochrome pixels, one byte each, row-major.
    pub fn mono8(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: PixelBuffer::Mono8(data.into()),
            bit_depth: None,
        }
    }

    /// 16-bit monochrome pixels, two bytes each in host byte order.
    pub fn mono16(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: PixelBuffer::Mono16(data.into()),
            bit_depth: None,
        }
    }

    /// RGB pixels in the four-bytes-per-pixel source layout described on
    /// [`PixelBuffer::Rgb8`].
    pub fn rgb8(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: PixelBuffer::Rgb8(data.into()),
            bit_depth: None,
        }
    }

    /// Declare the significant bit depth of a 16-bit payload (10, 11, 12,
    /// 14, or 16). Ignored for 8-bit and RGB data.
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel payload.
    #[inline]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// The pixel type code this image will carry in the index.
    pub fn pixel_type(&self) -> PixelType {
        match &self.pixels {
            PixelBuffer::Rgb8(_) => PixelType::EightBitRgb,
            PixelBuffer::Mono8(_) => PixelType::EightBit,
            PixelBuffer::Mono16(_) => match self.bit_depth {
                None | Some(16) => PixelType::SixteenBit,
                Some(10) => PixelType::TenBit,
                Some(11) => PixelType::ElevenBit,
                Some(12) => PixelType::TwelveBit,
                Some(14) => PixelType::FourteenBit,
                Some(other) => {
                    tracing::warn!(bit_depth = other, "unknown bit depth, assuming 16");
                    PixelType::SixteenBit
                }
            },
        }
    }

    /// Convert to the stored form returned by the read path.
    pub fn to_image(&self) -> Image {
        Image::new(
            self.width,
            self.height,
            self.pixel_type(),
            self.pixels.to_stored(),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
