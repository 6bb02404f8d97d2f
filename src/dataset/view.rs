//! Lazy chunked N-D array assembly.
//!
//! An [`ArrayView`] describes a dataset as one big array whose last two
//! axes are y and x, with one chunk per combination of stacked axis values.
//! Nothing is read until a chunk is requested, so a view over a dataset
//! much larger than RAM is cheap to build; [`ArrayView::materialize`]
//! concatenates every chunk into a single in-memory [`NdArray`] when the
//! caller wants one.
//!
//! Positions the dataset never filled in are zero tiles. With `stitched`,
//! the `row`/`column` grid of a tiled acquisition is laid out as one large
//! image per chunk, spanning the inclusive `[min, max]` range of both grid
//! axes and, at full resolution, cropping half the declared overlap from
//! each side of every tile.

use crate::axes::{AxisValue, ImageCoords, COLUMN_AXIS, ROW_AXIS};
use crate::dataset::NdStorage;
use crate::error::DatasetError;
use crate::format::Dtype;

// =============================================================================
// Parameters
// =============================================================================

/// Options for building an [`ArrayView`].
#[derive(Debug, Clone, Default)]
pub struct ArrayParams {
    axes: Option<Vec<String>>,
    stitched: bool,
    slices: ImageCoords,
}

impl ArrayParams {
    /// Default view: all known axes stacked in canonical order, not
    /// stitched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack over exactly these axes, in this order.
    pub fn axes<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes = Some(axes.into_iter().map(Into::into).collect());
        self
    }

    /// Lay out the `row`/`column` tile grid as one stitched image per
    /// chunk.
    pub fn stitched(mut self, stitched: bool) -> Self {
        self.stitched = stitched;
        self
    }

    /// Fix one axis to a single value instead of stacking over it.
    pub fn slice(mut self, axis: impl Into<String>, value: impl Into<AxisValue>) -> Self {
        self.slices.insert(axis, value);
        self
    }
}

// =============================================================================
// ArrayView
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Grid {
    min_row: i64,
    max_row: i64,
    min_column: i64,
    max_column: i64,
}

impl Grid {
    fn rows(&self) -> usize {
        (self.max_row - self.min_row + 1) as usize
    }

    fn columns(&self) -> usize {
        (self.max_column - self.min_column + 1) as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Crop {
    offset: [usize; 2],
    extent: [usize; 2],
}

/// A lazily evaluated chunked array over a dataset.
///
/// The view holds a chunk description (`{chunks, dtype, read-one-chunk}`);
/// each chunk is fetched through the dataset's read path on demand.
pub struct ArrayView<'a> {
    storage: &'a dyn NdStorage,
    stack_axes: Vec<(String, Vec<AxisValue>)>,
    slices: ImageCoords,
    stitched: bool,
    grid: Option<Grid>,
    tile_height: usize,
    tile_width: usize,
    crop_top: usize,
    crop_left: usize,
    bytes_per_pixel: usize,
    dtype: Dtype,
    rgb: bool,
    crop: Option<Crop>,
}

impl<'a> std::fmt::Debug for ArrayView<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayView")
            .field("stack_axes", &self.stack_axes)
            .field("slices", &self.slices)
            .field("stitched", &self.stitched)
            .field("grid", &self.grid)
            .field("tile_height", &self.tile_height)
            .field("tile_width", &self.tile_width)
            .field("crop_top", &self.crop_top)
            .field("crop_left", &self.crop_left)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .field("dtype", &self.dtype)
            .field("rgb", &self.rgb)
            .field("crop", &self.crop)
            .finish_non_exhaustive()
    }
}

impl<'a> ArrayView<'a> {
    /// Build a view over `storage`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::NotStitchable`] when stitching is requested but
    ///   the dataset declares no tile overlap or has no integer
    ///   `row`/`column` grid
    /// - [`DatasetError::MissingResolutionFlag`] when stitching is
    ///   requested but it is unknown whether this is a full-resolution
    ///   dataset
    /// - [`DatasetError::MissingImageProperties`] when no image has been
    ///   seen yet
    pub fn new(storage: &'a dyn NdStorage, params: ArrayParams) -> Result<Self, DatasetError> {
        let overlap = storage.overlap();
        let full_resolution = if params.stitched {
            if overlap.is_none() {
                return Err(DatasetError::NotStitchable);
            }
            storage
                .full_resolution()
                .ok_or(DatasetError::MissingResolutionFlag)?
        } else {
            storage.full_resolution().unwrap_or(false)
        };

        let properties = storage
            .image_properties()
            .ok_or(DatasetError::MissingImageProperties)?;

        // downsampled levels already have the tile edges removed, so only
        // the full resolution level shrinks its tiles
        let (tile_height, tile_width, crop_top, crop_left) =
            if params.stitched && full_resolution {
                let (overlap_y, overlap_x) = overlap.unwrap_or((0, 0));
                (
                    (properties.height - overlap_y) as usize,
                    (properties.width - overlap_x) as usize,
                    (overlap_y / 2) as usize,
                    (overlap_x / 2) as usize,
                )
            } else {
                (properties.height as usize, properties.width as usize, 0, 0)
            };

        let rgb = properties.bytes_per_pixel == 3 && properties.dtype == Dtype::U8;

        let mut slices = params.slices.clone();
        if params.stitched {
            slices.remove(ROW_AXIS);
            slices.remove(COLUMN_AXIS);
        }

        let axis_names = match &params.axes {
            Some(axes) => axes.clone(),
            None => storage.axis_names(),
        };
        let mut stack_axes = Vec::new();
        for name in axis_names {
            if slices.contains(&name) {
                continue;
            }
            if params.stitched && (name == ROW_AXIS || name == COLUMN_AXIS) {
                continue;
            }
            if let Some(values) = storage.axis_values(&name) {
                stack_axes.push((name, values));
            }
        }

        let grid = if params.stitched {
            Some(Self::grid_extent(storage)?)
        } else {
            None
        };

        Ok(Self {
            storage,
            stack_axes,
            slices,
            stitched: params.stitched,
            grid,
            tile_height,
            tile_width,
            crop_top,
            crop_left,
            bytes_per_pixel: properties.bytes_per_pixel,
            dtype: properties.dtype,
            rgb,
            crop: None,
        })
    }

    fn grid_extent(storage: &dyn NdStorage) -> Result<Grid, DatasetError> {
        let bounds = |axis: &str| -> Result<(i64, i64), DatasetError> {
            let values = storage.axis_values(axis).ok_or(DatasetError::NotStitchable)?;
            let mut min = i64::MAX;
            let mut max = i64::MIN;
            for value in &values {
                let value = value.as_int().ok_or(DatasetError::NotStitchable)? as i64;
                min = min.min(value);
                max = max.max(value);
            }
            if min > max {
                return Err(DatasetError::NotStitchable);
            }
            Ok((min, max))
        };
        let (min_row, max_row) = bounds(ROW_AXIS)?;
        let (min_column, max_column) = bounds(COLUMN_AXIS)?;
        Ok(Grid {
            min_row,
            max_row,
            min_column,
            max_column,
        })
    }

    /// Restrict the spatial extent of every chunk to a window; used by the
    /// pyramid composite to slice off padding beyond the data extent.
    pub(crate) fn with_crop(mut self, offset: [usize; 2], extent: [usize; 2]) -> Self {
        self.crop = Some(Crop { offset, extent });
        self
    }

    /// The axes being stacked over, with their ordered values.
    pub fn stack_axes(&self) -> &[(String, Vec<AxisValue>)] {
        &self.stack_axes
    }

    /// Number of chunks along each stacked axis.
    pub fn stack_shape(&self) -> Vec<usize> {
        self.stack_axes
            .iter()
            .map(|(_, values)| values.len())
            .collect()
    }

    /// Element type of the array.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Whether chunks carry a trailing RGB sample axis.
    pub fn is_rgb(&self) -> bool {
        self.rgb
    }

    fn raw_chunk_dims(&self) -> (usize, usize) {
        match &self.grid {
            Some(grid) => (
                self.tile_height * grid.rows(),
                self.tile_width * grid.columns(),
            ),
            None => (self.tile_height, self.tile_width),
        }
    }

    fn cropped_chunk_dims(&self) -> (usize, usize) {
        let (height, width) = self.raw_chunk_dims();
        match &self.crop {
            None => (height, width),
            Some(crop) => {
                let top = crop.offset[0].min(height);
                let left = crop.offset[1].min(width);
                (
                    crop.extent[0].min(height - top),
                    crop.extent[1].min(width - left),
                )
            }
        }
    }

    /// Spatial shape of one chunk: `[height, width]` plus a trailing 3 for
    /// RGB.
    pub fn chunk_shape(&self) -> Vec<usize> {
        let (height, width) = self.cropped_chunk_dims();
        if self.rgb {
            vec![height, width, 3]
        } else {
            vec![height, width]
        }
    }

    /// Full array shape: one dimension per stacked axis, then the chunk
    /// shape.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = self.stack_shape();
        shape.extend(self.chunk_shape());
        shape
    }

    /// Read the chunk at one combination of stacked-axis indices.
    ///
    /// `block` holds one index per stacked axis; positions with no image
    /// come back zero-filled.
    pub fn read_chunk(&self, block: &[usize]) -> Result<NdArray, DatasetError> {
        assert_eq!(
            block.len(),
            self.stack_axes.len(),
            "one index per stacked axis"
        );
        let mut coordinates = self.slices.clone();
        for (index, (name, values)) in self.stack_axes.iter().enumerate() {
            coordinates.insert(name.clone(), values[block[index]].clone());
        }

        let (raw_height, raw_width) = self.raw_chunk_dims();
        let data = if self.stitched {
            self.assemble_stitched(&coordinates)?
        } else if self.storage.has_image(&coordinates) {
            self.storage.read_image(&coordinates)?.data().to_vec()
        } else {
            vec![0u8; raw_height * raw_width * self.bytes_per_pixel]
        };

        let (data, height, width) = self.apply_crop(data, raw_height, raw_width);
        let shape = if self.rgb {
            vec![height, width, 3]
        } else {
            vec![height, width]
        };
        Ok(NdArray::new(shape, self.dtype, data))
    }

    fn assemble_stitched(&self, coordinates: &ImageCoords) -> Result<Vec<u8>, DatasetError> {
        let grid = self.grid.expect("stitched views always carry a grid");
        let bpp = self.bytes_per_pixel;
        let chunk_width = self.tile_width * grid.columns();
        let tile_row_bytes = self.tile_width * bpp;
        let mut data = vec![0u8; self.tile_height * grid.rows() * chunk_width * bpp];

        for (grid_row, row) in (grid.min_row..=grid.max_row).enumerate() {
            for (grid_column, column) in (grid.min_column..=grid.max_column).enumerate() {
                let mut tile_coordinates = coordinates.clone();
                tile_coordinates.insert(ROW_AXIS, row as i32);
                tile_coordinates.insert(COLUMN_AXIS, column as i32);
                if !self.storage.has_image(&tile_coordinates) {
                    continue; // stays zero-filled
                }
                let tile = self.storage.read_image(&tile_coordinates)?;
                let source = tile.data();
                let source_width = tile.width() as usize;
                for y in 0..self.tile_height {
                    let source_offset =
                        ((y + self.crop_top) * source_width + self.crop_left) * bpp;
                    let dest_offset = ((grid_row * self.tile_height + y) * chunk_width
                        + grid_column * self.tile_width)
                        * bpp;
                    data[dest_offset..dest_offset + tile_row_bytes]
                        .copy_from_slice(&source[source_offset..source_offset + tile_row_bytes]);
                }
            }
        }
        Ok(data)
    }

    fn apply_crop(&self, data: Vec<u8>, height: usize, width: usize) -> (Vec<u8>, usize, usize) {
        let Some(crop) = &self.crop else {
            return (data, height, width);
        };
        let top = crop.offset[0].min(height);
        let left = crop.offset[1].min(width);
        let new_height = crop.extent[0].min(height - top);
        let new_width = crop.extent[1].min(width - left);

        let bpp = self.bytes_per_pixel;
        let mut cropped = Vec::with_capacity(new_height * new_width * bpp);
        for y in 0..new_height {
            let offset = ((top + y) * width + left) * bpp;
            cropped.extend_from_slice(&data[offset..offset + new_width * bpp]);
        }
        (cropped, new_height, new_width)
    }

    /// Read every chunk and concatenate them into one in-memory array.
    pub fn materialize(&self) -> Result<NdArray, DatasetError> {
        let stack_shape = self.stack_shape();
        let (chunk_height, chunk_width) = self.cropped_chunk_dims();
        let chunk_bytes = chunk_height * chunk_width * self.bytes_per_pixel;
        let chunk_count: usize = stack_shape.iter().product();

        let mut data = Vec::with_capacity(chunk_count.max(1) * chunk_bytes);
        let mut block = vec![0usize; stack_shape.len()];
        loop {
            let chunk = self.read_chunk(&block)?;
            data.extend_from_slice(chunk.data());
            // advance the multi-index, last axis fastest
            let mut dimension = block.len();
            loop {
                if dimension == 0 {
                    return Ok(NdArray::new(self.shape(), self.dtype, data));
                }
                dimension -= 1;
                block[dimension] += 1;
                if block[dimension] < stack_shape[dimension] {
                    break;
                }
                block[dimension] = 0;
            }
        }
    }
}

// =============================================================================
// NdArray
// =============================================================================

/// A dense row-major N-D sample array materialized from an [`ArrayView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdArray {
    shape: Vec<usize>,
    dtype: Dtype,
    data: Vec<u8>,
}

impl NdArray {
    pub(crate) fn new(shape: Vec<usize>, dtype: Dtype, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            shape.iter().product::<usize>() * dtype.bytes_per_sample()
        );
        Self { shape, dtype, data }
    }

    /// The array shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type of the samples.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// The raw sample bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the array holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sample at a full multi-index, widened to u64.
    pub fn value_at(&self, index: &[usize]) -> u64 {
        assert_eq!(index.len(), self.shape.len(), "one index per dimension");
        let mut flat = 0usize;
        for (dimension, &position) in index.iter().enumerate() {
            assert!(position < self.shape[dimension], "index out of bounds");
            flat = flat * self.shape[dimension] + position;
        }
        let offset = flat * self.dtype.bytes_per_sample();
        match self.dtype {
            Dtype::U8 => self.data[offset] as u64,
            Dtype::U16 => u16::from_ne_bytes([self.data[offset], self.data[offset + 1]]) as u64,
        }
    }

    /// Iterate over every sample in row-major order, widened to u64.
    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        let step = self.dtype.bytes_per_sample();
        (0..self.len()).map(move |index| {
            let offset = index * step;
            match self.dtype {
                Dtype::U8 => self.data[offset] as u64,
                Dtype::U16 => {
                    u16::from_ne_bytes([self.data[offset], self.data[offset + 1]]) as u64
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
