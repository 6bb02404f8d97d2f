use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::axes::{AxisValue, ImageCoords, COLUMN_AXIS, ROW_AXIS};
use crate::dataset::view::{ArrayParams, ArrayView};
use crate::dataset::{Dataset, ImageProperties, NdStorage, FULL_RESOLUTION_DIR};
use crate::error::DatasetError;
use crate::format::Image;
use crate::io::{FileIo, StdFileIo};

/// Pixel extent below which descending to further pyramid levels is not
/// worth it.
const MIN_COMPOSITE_EXTENT: i64 = 16;

/// A multi-resolution NDTiff pyramid dataset.
///
/// The top-level directory holds one flat dataset per resolution level:
/// `Full resolution/` is level 0 and `Downsampled_<factor>x/` is level
/// `log2(factor)`, each level downsampling pixels by `2^level`. Reads
/// default to the full-resolution level; [`as_array_pyramid`] composes a
/// stitched array per level, cropped to the extent where data exists.
///
/// [`as_array_pyramid`]: PyramidDataset::as_array_pyramid
#[derive(Debug)]
pub struct PyramidDataset {
    path: PathBuf,
    levels: BTreeMap<u32, Dataset>,
}

impl PyramidDataset {
    /// Open a pyramid dataset directory read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        Self::open_with_io(path, Arc::new(StdFileIo))
    }

    /// Open a pyramid dataset directory read-only over a custom backend.
    pub fn open_with_io(
        path: impl AsRef<Path>,
        file_io: Arc<dyn FileIo>,
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_owned();
        tracing::debug!(path = %path.display(), "opening NDTiff pyramid dataset");

        let mut levels = BTreeMap::new();
        for name in file_io.list_dir(&path)? {
            let level_path = file_io.path_join(&path, &name);
            if !file_io.is_dir(&level_path) {
                continue;
            }
            if name == FULL_RESOLUTION_DIR {
                let level = Dataset::open_with_io(&level_path, Arc::clone(&file_io))?;
                level.set_full_resolution(true);
                levels.insert(0, level);
            } else if let Some(level_index) = parse_downsampled_level(&name) {
                let level = Dataset::open_with_io(&level_path, Arc::clone(&file_io))?;
                level.set_full_resolution(false);
                levels.insert(level_index, level);
            } else {
                tracing::debug!(directory = %name, "ignoring unrecognized directory");
            }
        }

        if !levels.contains_key(&0) {
            return Err(DatasetError::IndexNotFound(path));
        }
        Ok(Self { path, levels })
    }

    /// Create a live view of a pyramid another process is writing.
    ///
    /// Only the full-resolution level is monitored; entries arrive through
    /// [`Dataset::add_index_entry_bytes`] on that level.
    pub fn live(
        path: impl AsRef<Path>,
        summary_metadata: Value,
    ) -> Result<Self, DatasetError> {
        Self::live_with_io(path, summary_metadata, Arc::new(StdFileIo))
    }

    /// Create a live view over a custom backend.
    pub fn live_with_io(
        path: impl AsRef<Path>,
        summary_metadata: Value,
        file_io: Arc<dyn FileIo>,
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_owned();
        let full_res_path = file_io.path_join(&path, FULL_RESOLUTION_DIR);
        let full_res = Dataset::live_with_io(full_res_path, summary_metadata, file_io)?;
        full_res.set_full_resolution(true);
        let mut levels = BTreeMap::new();
        levels.insert(0, full_res);
        Ok(Self { path, levels })
    }

    /// The directory this pyramid lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The dataset at one resolution level, if that level exists.
    pub fn level(&self, resolution_level: u32) -> Option<&Dataset> {
        self.levels.get(&resolution_level)
    }

    /// The full-resolution dataset.
    pub fn full_resolution_level(&self) -> &Dataset {
        self.levels
            .get(&0)
            .expect("a pyramid always has a full resolution level")
    }

    /// Resolution levels in ascending order (0 = full resolution).
    pub fn resolution_levels(&self) -> impl Iterator<Item = (u32, &Dataset)> {
        self.levels.iter().map(|(&level, dataset)| (level, dataset))
    }

    /// Whether an image with these coordinates is present at one level.
    pub fn has_image_at(
        &self,
        resolution_level: u32,
        coordinates: &ImageCoords,
    ) -> Result<bool, DatasetError> {
        Ok(self.try_level(resolution_level)?.has_image(coordinates))
    }

    /// Read an image from one resolution level.
    pub fn read_image_at(
        &self,
        resolution_level: u32,
        coordinates: &ImageCoords,
    ) -> Result<Image, DatasetError> {
        self.try_level(resolution_level)?.read_image(coordinates)
    }

    /// Read image metadata from one resolution level.
    pub fn read_metadata_at(
        &self,
        resolution_level: u32,
        coordinates: &ImageCoords,
    ) -> Result<Value, DatasetError> {
        self.try_level(resolution_level)?.read_metadata(coordinates)
    }

    /// The coordinates of every image at one resolution level.
    pub fn get_image_coordinates_list_at(
        &self,
        resolution_level: u32,
    ) -> Result<Vec<ImageCoords>, DatasetError> {
        Ok(self.try_level(resolution_level)?.get_image_coordinates_list())
    }

    /// Channel names, taken from the full-resolution level.
    pub fn get_channel_names(&self) -> Vec<String> {
        self.full_resolution_level().get_channel_names()
    }

    /// Build a lazy array over one resolution level.
    pub fn as_array_at(
        &self,
        resolution_level: u32,
        params: ArrayParams,
    ) -> Result<ArrayView<'_>, DatasetError> {
        self.try_level(resolution_level)?.as_array(params)
    }

    /// Build a lazy array over the full-resolution level.
    pub fn as_array(&self, params: ArrayParams) -> Result<ArrayView<'_>, DatasetError> {
        self.as_array_at(0, params)
    }

    /// Compose one stitched array per resolution level, each cropped to
    /// the pixel extent where data was collected.
    ///
    /// The full-resolution extent is the tile-grid bounding box; for level
    /// `k` it is scaled down by `2^k`, snapped to tile boundaries, and the
    /// zero padding outside it is sliced off. Levels whose remaining
    /// extent in any axis drops below 16 pixels are not worth returning,
    /// so descent stops there.
    pub fn as_array_pyramid(
        &self,
        params: ArrayParams,
    ) -> Result<Vec<ArrayView<'_>>, DatasetError> {
        let full_res = self.full_resolution_level();
        let (overlap_y, overlap_x) =
            NdStorage::overlap(full_res).ok_or(DatasetError::NotStitchable)?;
        let properties = full_res
            .image_properties()
            .ok_or(DatasetError::MissingImageProperties)?;
        let tile_shape = [
            (properties.height - overlap_y) as i64,
            (properties.width - overlap_x) as i64,
        ];

        let (min_row, max_row) = int_bounds(full_res.axis_values(ROW_AXIS))
            .ok_or(DatasetError::NotStitchable)?;
        let (min_column, max_column) = int_bounds(full_res.axis_values(COLUMN_AXIS))
            .ok_or(DatasetError::NotStitchable)?;

        let extent_min = [min_row * tile_shape[0], min_column * tile_shape[1]];
        let extent_max = [
            (max_row + 1) * tile_shape[0],
            (max_column + 1) * tile_shape[1],
        ];

        let mut arrays = Vec::new();
        for (&level, dataset) in &self.levels {
            if level == 0 {
                arrays.push(dataset.as_array(params.clone())?);
                continue;
            }
            let scale = 1i64 << level;
            let scaled_min = [extent_min[0] / scale, extent_min[1] / scale];
            let scaled_max = [extent_max[0] / scale, extent_max[1] / scale];
            let extent = [scaled_max[0] - scaled_min[0], scaled_max[1] - scaled_min[1]];
            if extent[0].min(extent[1]) < MIN_COMPOSITE_EXTENT {
                break;
            }
            // tiles containing the scaled extent; the level's stitched
            // array begins at a tile boundary, so the leftover is the
            // in-array offset of the data
            let min_tile = [
                scaled_min[0].div_euclid(tile_shape[0]),
                scaled_min[1].div_euclid(tile_shape[1]),
            ];
            let container_min = [min_tile[0] * tile_shape[0], min_tile[1] * tile_shape[1]];
            let offset = [
                (scaled_min[0] - container_min[0]) as usize,
                (scaled_min[1] - container_min[1]) as usize,
            ];
            arrays.push(
                dataset
                    .as_array(params.clone())?
                    .with_crop(offset, [extent[0] as usize, extent[1] as usize]),
            );
        }
        Ok(arrays)
    }

    /// Release the file handles of every level.
    pub fn close(&self) {
        for dataset in self.levels.values() {
            NdStorage::close(dataset);
        }
    }

    fn try_level(&self, resolution_level: u32) -> Result<&Dataset, DatasetError> {
        self.levels
            .get(&resolution_level)
            .ok_or(DatasetError::UnknownResolutionLevel(resolution_level))
    }
}

impl NdStorage for PyramidDataset {
    fn has_image(&self, coordinates: &ImageCoords) -> bool {
        self.full_resolution_level().has_image(coordinates)
    }

    fn read_image(&self, coordinates: &ImageCoords) -> Result<Image, DatasetError> {
        self.full_resolution_level().read_image(coordinates)
    }

    fn read_metadata(&self, coordinates: &ImageCoords) -> Result<Value, DatasetError> {
        self.full_resolution_level().read_metadata(coordinates)
    }

    fn get_image_coordinates_list(&self) -> Vec<ImageCoords> {
        self.full_resolution_level().get_image_coordinates_list()
    }

    fn axis_names(&self) -> Vec<String> {
        self.full_resolution_level().axis_names()
    }

    fn axis_values(&self, axis: &str) -> Option<Vec<AxisValue>> {
        self.full_resolution_level().axis_values(axis)
    }

    fn image_properties(&self) -> Option<ImageProperties> {
        self.full_resolution_level().image_properties()
    }

    fn summary_metadata(&self) -> Value {
        self.full_resolution_level().summary_metadata()
    }

    fn overlap(&self) -> Option<(u32, u32)> {
        NdStorage::overlap(self.full_resolution_level())
    }

    fn full_resolution(&self) -> Option<bool> {
        Some(true)
    }

    fn await_new_image(&self, timeout: Option<Duration>) -> bool {
        self.full_resolution_level().await_new_image(timeout)
    }

    fn is_finished(&self) -> bool {
        self.full_resolution_level().is_finished()
    }

    fn close(&self) {
        PyramidDataset::close(self);
    }
}

/// Parse the downsample level out of a `Downsampled_<factor>x` directory
/// name; the factor is a power of two and the level is its log2.
fn parse_downsampled_level(name: &str) -> Option<u32> {
    let factor = name.strip_prefix("Downsampled_")?.strip_suffix('x')?;
    let factor: u32 = factor.parse().ok()?;
    if factor < 2 || !factor.is_power_of_two() {
        return None;
    }
    Some(factor.ilog2())
}

fn int_bounds(values: Option<Vec<AxisValue>>) -> Option<(i64, i64)> {
    let values = values?;
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for value in &values {
        let value = value.as_int()? as i64;
        min = min.min(value);
        max = max.max(value);
    }
    if min > max {
        return None;
    }
    Some((min, max))
}

// =============================================================================
// Tests
// =============================================================================
