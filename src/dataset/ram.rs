use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::axes::{AxesTable, AxisValue, ImageCoords, CHANNEL_AXIS};
use crate::dataset::events::{Latch, Signal};
use crate::dataset::view::{ArrayParams, ArrayView};
use crate::dataset::{ImageProperties, NdStorage};
use crate::error::DatasetError;
use crate::format::{Image, ImageData};

struct RamState {
    summary_metadata: Value,
    images: HashMap<ImageCoords, (Image, Value)>,
    axes: AxesTable,
    properties: Option<ImageProperties>,
}

/// A dataset held entirely in RAM.
///
/// Satisfies the same storage interface as a disk-backed [`Dataset`]
/// without any file I/O: an acquisition engine can sink images into it and
/// a viewer can read them back, build arrays, and wait on the same events.
///
/// [`Dataset`]: crate::dataset::Dataset
#[derive(Default)]
pub struct RamDataset {
    state: Mutex<RamState>,
    new_image: Signal,
    finished: Latch,
}

impl Default for RamState {
    fn default() -> Self {
        Self {
            summary_metadata: Value::Object(Default::default()),
            images: HashMap::new(),
            axes: AxesTable::new(),
            properties: None,
        }
    }
}

impl RamDataset {
    /// Create an empty in-memory dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the dataset-wide summary metadata.
    pub fn initialize(&self, summary_metadata: Value) {
        self.lock().summary_metadata = summary_metadata;
    }

    /// Store one image.
    pub fn put_image(
        &self,
        coordinates: &ImageCoords,
        image: &ImageData,
        metadata: &Value,
    ) -> Result<(), DatasetError> {
        let stored = image.to_image();
        let mut state = self.lock();
        state.axes.update(coordinates)?;
        if state.properties.is_none() {
            let pixel_type = stored.pixel_type();
            state.properties = Some(ImageProperties {
                width: stored.width(),
                height: stored.height(),
                dtype: pixel_type.dtype(),
                bytes_per_pixel: pixel_type.bytes_per_pixel(),
            });
        }
        state
            .images
            .insert(coordinates.clone(), (stored, metadata.clone()));
        self.new_image.notify();
        Ok(())
    }

    /// No more images will be stored.
    pub fn finish(&self) {
        self.finished.set();
    }

    /// Wait until [`finish`](RamDataset::finish) has been called, or
    /// `timeout` elapses.
    pub fn block_until_finished(&self, timeout: Option<Duration>) -> bool {
        self.finished.wait(timeout)
    }

    /// Channel names: the values of the string `channel` axis in
    /// first-seen order.
    pub fn get_channel_names(&self) -> Vec<String> {
        self.lock()
            .axes
            .string_values(CHANNEL_AXIS)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Build a lazily evaluated chunked array over this dataset.
    pub fn as_array(&self, params: ArrayParams) -> Result<ArrayView<'_>, DatasetError> {
        ArrayView::new(self, params)
    }

    fn lock(&self) -> MutexGuard<'_, RamState> {
        self.state.lock().expect("RAM dataset mutex poisoned")
    }
}

impl NdStorage for RamDataset {
    fn has_image(&self, coordinates: &ImageCoords) -> bool {
        let state = self.lock();
        let Ok(coordinates) = state.axes.consolidate(coordinates) else {
            return false;
        };
        state.images.contains_key(&coordinates)
    }

    fn read_image(&self, coordinates: &ImageCoords) -> Result<Image, DatasetError> {
        let state = self.lock();
        let coordinates = state.axes.consolidate(coordinates)?;
        state
            .images
            .get(&coordinates)
            .map(|(image, _)| image.clone())
            .ok_or_else(|| DatasetError::ImageNotFound {
                coordinates: coordinates.to_string(),
            })
    }

    fn read_metadata(&self, coordinates: &ImageCoords) -> Result<Value, DatasetError> {
        let state = self.lock();
        let coordinates = state.axes.consolidate(coordinates)?;
        state
            .images
            .get(&coordinates)
            .map(|(_, metadata)| metadata.clone())
            .ok_or_else(|| DatasetError::ImageNotFound {
                coordinates: coordinates.to_string(),
            })
    }

    fn get_image_coordinates_list(&self) -> Vec<ImageCoords> {
        self.lock().images.keys().cloned().collect()
    }

    fn axis_names(&self) -> Vec<String> {
        self.lock().axes.sorted_names()
    }

    fn axis_values(&self, axis: &str) -> Option<Vec<AxisValue>> {
        self.lock().axes.domain(axis).map(|domain| domain.values())
    }

    fn image_properties(&self) -> Option<ImageProperties> {
        self.lock().properties
    }

    fn summary_metadata(&self) -> Value {
        self.lock().summary_metadata.clone()
    }

    fn overlap(&self) -> Option<(u32, u32)> {
        None
    }

    fn full_resolution(&self) -> Option<bool> {
        None
    }

    fn await_new_image(&self, timeout: Option<Duration>) -> bool {
        self.new_image.wait(timeout)
    }

    fn is_finished(&self) -> bool {
        self.finished.is_set()
    }

    fn close(&self) {
        let mut state = self.lock();
        state.images.clear();
        state.axes = AxesTable::new();
        state.properties = None;
    }
}

// =============================================================================
// Tests
// =============================================================================
