//! The dataset engine.
//!
//! A [`Dataset`] owns everything above the single-file layer: the decoded
//! index, a pool of open file readers keyed by filename, the axis tables,
//! at most one active writer, and the events live observers wait on. It
//! comes in three flavors sharing one type:
//!
//! - **read-only**: opened from a finished dataset directory on disk;
//! - **writable**: created empty, fed through `put_image`, closed with
//!   `finish`;
//! - **live**: a view of a dataset a *different* process is writing, grown
//!   by feeding index-entry bytes to `add_index_entry_bytes` as they appear
//!   at the tail of `NDTiff.index`.
//!
//! All three (plus [`PyramidDataset`] and [`RamDataset`]) expose the same
//! read capability through the [`NdStorage`] trait, which is what the lazy
//! array view in [`view`](crate::dataset::ArrayView) builds on.
//!
//! One mutex guards all mutable dataset state. Readers serialize their own
//! seek+read internally, so concurrent reads that target distinct files
//! only contend for the brief index lookup.

mod events;
mod pyramid;
mod ram;
mod view;

pub use pyramid::PyramidDataset;
pub use ram::RamDataset;
pub use view::{ArrayParams, ArrayView, NdArray};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::axes::{AxesTable, AxisValue, ImageCoords, CHANNEL_AXIS};
use crate::error::{DatasetError, FormatError};
use crate::format::{
    read_index, Dtype, Image, ImageData, IndexEntry, SingleFileReader, SingleFileWriter,
    MAJOR_VERSION, MINOR_VERSION,
};
use crate::io::{FileIo, StdFileIo, WritableFile};

use events::{Latch, Signal};

/// Name of the index file within a dataset directory.
pub const INDEX_FILE_NAME: &str = "NDTiff.index";

/// Name of the level-0 directory of a pyramid dataset.
pub const FULL_RESOLUTION_DIR: &str = "Full resolution";

/// Per-image pixel properties, inferred once from the first image seen and
/// assumed uniform across the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProperties {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Element type of decoded buffers
    pub dtype: Dtype,
    /// Bytes of storage per pixel (3 for RGB)
    pub bytes_per_pixel: usize,
}

impl ImageProperties {
    fn from_entry(entry: &IndexEntry) -> Self {
        Self {
            width: entry.image_width,
            height: entry.image_height,
            dtype: entry.pixel_type.dtype(),
            bytes_per_pixel: entry.pixel_type.bytes_per_pixel(),
        }
    }
}

// =============================================================================
// NdStorage
// =============================================================================

/// The read capability every storage flavor provides.
///
/// [`Dataset`], [`PyramidDataset`] (forwarding to its full-resolution
/// level), and [`RamDataset`] all implement this; the lazy chunked array
/// view is written against it.
pub trait NdStorage: Send + Sync {
    /// Whether an image with these coordinates is present (indexed or
    /// pending write).
    fn has_image(&self, coordinates: &ImageCoords) -> bool;

    /// Read the pixels of the image with these coordinates.
    fn read_image(&self, coordinates: &ImageCoords) -> Result<Image, DatasetError>;

    /// Read the metadata of the image with these coordinates.
    fn read_metadata(&self, coordinates: &ImageCoords) -> Result<Value, DatasetError>;

    /// The coordinates of every image in the dataset.
    fn get_image_coordinates_list(&self) -> Vec<ImageCoords>;

    /// Axis names in canonical order (row, column, position, time, channel,
    /// z; unknown names sort with channel).
    fn axis_names(&self) -> Vec<String>;

    /// The ordered distinct values seen on one axis.
    fn axis_values(&self, axis: &str) -> Option<Vec<AxisValue>>;

    /// Pixel properties, once at least one image has been seen.
    fn image_properties(&self) -> Option<ImageProperties>;

    /// The dataset-wide summary metadata.
    fn summary_metadata(&self) -> Value;

    /// Declared tile overlap `(y, x)`, if the summary metadata carries one.
    fn overlap(&self) -> Option<(u32, u32)>;

    /// Whether this is the full-resolution level of a pyramid, when known.
    fn full_resolution(&self) -> Option<bool>;

    /// Wait for the next image to arrive; clears the signal when observed.
    fn await_new_image(&self, timeout: Option<Duration>) -> bool;

    /// Whether the dataset is finished and no more images will arrive.
    fn is_finished(&self) -> bool;

    /// Release file handles and other resources.
    fn close(&self);
}

// =============================================================================
// Dataset
// =============================================================================

struct State {
    summary_metadata: Value,
    major_version: u32,
    minor_version: u32,
    index: HashMap<ImageCoords, IndexEntry>,
    readers: HashMap<String, Arc<SingleFileReader>>,
    axes: AxesTable,
    channels: Vec<(String, AxisValue)>,
    properties: Option<ImageProperties>,
    overlap: Option<(u32, u32)>,
    full_resolution: Option<bool>,
    write_pending: HashMap<ImageCoords, (Image, Value)>,
    current_writer: Option<SingleFileWriter>,
    index_file: Option<Box<dyn WritableFile>>,
    file_index: u32,
}

impl State {
    fn empty(summary_metadata: Value) -> Self {
        let overlap = overlap_from_summary(&summary_metadata);
        Self {
            summary_metadata,
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            index: HashMap::new(),
            readers: HashMap::new(),
            axes: AxesTable::new(),
            channels: Vec::new(),
            properties: None,
            overlap,
            full_resolution: None,
            write_pending: HashMap::new(),
            current_writer: None,
            index_file: None,
            file_index: 0,
        }
    }
}

/// A single (non-pyramid) NDTiff dataset.
///
/// See the [module documentation](self) for the three lifecycles. All
/// methods take `&self`; a `Dataset` wrapped in an [`Arc`] can be shared
/// freely between a writer thread and reader threads.
pub struct Dataset {
    path: PathBuf,
    file_io: Arc<dyn FileIo>,
    writable: bool,
    name: Option<String>,
    state: Mutex<State>,
    new_image: Signal,
    finished: Latch,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("writable", &self.writable)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Dataset {
    /// Open a finished dataset directory read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        Self::open_with_io(path, Arc::new(StdFileIo))
    }

    /// Open a finished dataset directory read-only over a custom backend.
    pub fn open_with_io(
        path: impl AsRef<Path>,
        file_io: Arc<dyn FileIo>,
    ) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_owned();
        tracing::debug!(path = %path.display(), "opening NDTiff dataset");

        let index_path = file_io.path_join(&path, INDEX_FILE_NAME);
        let mut index_file = file_io.open_read(&index_path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                DatasetError::IndexNotFound(path.clone())
            } else {
                DatasetError::Io(error)
            }
        })?;
        let index_bytes = index_file.read_to_end_at(0)?;
        let entries = read_index(&index_bytes)?;

        let mut tiff_names: Vec<String> = file_io
            .list_dir(&path)?
            .into_iter()
            .filter(|name| name.ends_with(".tif"))
            .collect();
        tiff_names.sort();

        let mut readers = HashMap::new();
        let (mut major_version, mut minor_version) = (0, 0);
        for name in &tiff_names {
            let reader =
                SingleFileReader::open(&*file_io, &file_io.path_join(&path, name))?;
            major_version = reader.major_version();
            minor_version = reader.minor_version();
            readers.insert(name.clone(), Arc::new(reader));
        }

        let summary_metadata = tiff_names
            .first()
            .and_then(|name| readers.get(name))
            .map(|reader| reader.summary_metadata().clone())
            .unwrap_or_else(|| Value::Object(Default::default()));
        let overlap = overlap_from_summary(&summary_metadata);

        let mut axes = AxesTable::new();
        for entry in &entries {
            axes.update(&entry.axes)?;
        }
        let properties = entries.first().map(ImageProperties::from_entry);
        let index: HashMap<ImageCoords, IndexEntry> = entries
            .into_iter()
            .map(|entry| (entry.axes.clone(), entry))
            .collect();

        let mut state = State {
            summary_metadata,
            major_version,
            minor_version,
            index,
            readers,
            axes,
            channels: Vec::new(),
            properties,
            overlap,
            // stitch handling for pyramid levels is overridden by the parent
            full_resolution: Some(false),
            write_pending: HashMap::new(),
            current_writer: None,
            index_file: None,
            file_index: 0,
        };
        update_channel_names(&mut state)?;

        tracing::debug!(
            images = state.index.len(),
            files = state.readers.len(),
            "dataset opened"
        );
        Ok(Self {
            path,
            file_io,
            writable: false,
            name: None,
            state: Mutex::new(state),
            new_image: Signal::new(),
            finished: Latch::new(),
        })
    }

    /// Create a new writable dataset.
    ///
    /// With a `name`, a uniquely numbered directory `{name}_{N}` is created
    /// under `path` and files carry the name as a prefix; otherwise images
    /// are written into `path` itself.
    pub fn create(path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, DatasetError> {
        Self::create_with_io(path, name, Arc::new(StdFileIo))
    }

    /// Create a new writable dataset over a custom backend.
    pub fn create_with_io(
        path: impl AsRef<Path>,
        name: Option<&str>,
        file_io: Arc<dyn FileIo>,
    ) -> Result<Self, DatasetError> {
        let root = path.as_ref();
        let path = match name {
            Some(name) => create_unique_acq_dir(&*file_io, root, name)?,
            None => {
                file_io.create_dir_all(root)?;
                root.to_owned()
            }
        };
        Ok(Self {
            path,
            file_io,
            writable: true,
            name: name.map(str::to_owned),
            state: Mutex::new(State::empty(Value::Object(Default::default()))),
            new_image: Signal::new(),
            finished: Latch::new(),
        })
    }

    /// Create a live view of a dataset another process is writing.
    ///
    /// The view starts empty and grows as index-entry bytes are fed to
    /// [`add_index_entry_bytes`](Dataset::add_index_entry_bytes).
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
        let mut state = State::empty(summary_metadata);
        state.full_resolution = Some(false);
        Ok(Self {
            path: path.as_ref().to_owned(),
            file_io,
            writable: false,
            name: None,
            state: Mutex::new(state),
            new_image: Signal::new(),
            finished: Latch::new(),
        })
    }

    /// The directory this dataset lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the dataset-wide summary metadata before the first
    /// `put_image`.
    pub fn initialize(&self, summary_metadata: Value) {
        let mut state = self.lock();
        state.overlap = overlap_from_summary(&summary_metadata);
        state.summary_metadata = summary_metadata;
    }

    /// Major format version of the files backing this dataset.
    pub fn major_version(&self) -> u32 {
        self.lock().major_version
    }

    /// Minor format version of the files backing this dataset.
    pub fn minor_version(&self) -> u32 {
        self.lock().minor_version
    }

    /// Channel names in index order.
    pub fn get_channel_names(&self) -> Vec<String> {
        self.lock()
            .channels
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Write one image.
    ///
    /// The image is immediately visible to concurrent readers of this
    /// dataset (from RAM while the file write is in flight), the index
    /// entry is appended to `NDTiff.index` for external observers, and the
    /// active file is rolled over when the image would push it past the
    /// 4 GiB cap.
    pub fn put_image(
        &self,
        coordinates: &ImageCoords,
        image: &ImageData,
        metadata: &Value,
    ) -> Result<(), DatasetError> {
        if !self.writable {
            return Err(DatasetError::ReadOnly);
        }
        let metadata_bytes = serde_json::to_vec(metadata).map_err(FormatError::from)?;

        let mut guard = self.lock();
        let state = &mut *guard;

        state
            .write_pending
            .insert(coordinates.clone(), (image.to_image(), metadata.clone()));
        state.axes.update(coordinates)?;
        update_channel_names(state)?;
        if state.properties.is_none() {
            let pixel_type = image.pixel_type();
            state.properties = Some(ImageProperties {
                width: image.width(),
                height: image.height(),
                dtype: pixel_type.dtype(),
                bytes_per_pixel: pixel_type.bytes_per_pixel(),
            });
        }

        // let viewers update as soon as the image is ready in RAM
        self.new_image.notify();

        if state.current_writer.is_none() {
            let filename = self.stack_filename(None);
            state.current_writer = Some(SingleFileWriter::create(
                &*self.file_io,
                &self.path,
                &filename,
                &state.summary_metadata,
            )?);
            state.file_index += 1;
            let index_path = self.file_io.path_join(&self.path, INDEX_FILE_NAME);
            state.index_file = Some(self.file_io.open_write(&index_path)?);
        } else {
            let writer = state.current_writer.as_mut().expect("checked above");
            if !writer.has_space_to_write(image, metadata_bytes.len())? {
                tracing::debug!(
                    file_index = state.file_index,
                    "file full, rolling over to a new file"
                );
                writer.finish_writing()?;
                let filename = self.stack_filename(Some(state.file_index));
                state.current_writer = Some(SingleFileWriter::create(
                    &*self.file_io,
                    &self.path,
                    &filename,
                    &state.summary_metadata,
                )?);
                state.file_index += 1;
            }
        }

        let writer = state.current_writer.as_mut().expect("writer just ensured");
        let entry = writer.write_image(coordinates, image, &metadata_bytes)?;

        self.install_entry(state, entry.clone(), false)?;

        let index_file = state.index_file.as_mut().expect("opened with the writer");
        index_file.write_all(&entry.encode())?;
        index_file.flush()?;

        state.write_pending.remove(coordinates);
        Ok(())
    }

    /// Close the active writer (terminating its IFD chain and truncating
    /// the pre-allocated tail), close the index file, and signal
    /// `finished`.
    pub fn finish(&self) -> Result<(), DatasetError> {
        {
            let mut state = self.lock();
            if let Some(mut writer) = state.current_writer.take() {
                writer.finish_writing()?;
            }
            if let Some(mut index_file) = state.index_file.take() {
                index_file.flush()?;
            }
        }
        self.finished.set();
        Ok(())
    }

    /// Wait until [`finish`](Dataset::finish) has been called, or `timeout`
    /// elapses. Returns whether the dataset is finished.
    pub fn block_until_finished(&self, timeout: Option<Duration>) -> bool {
        self.finished.wait(timeout)
    }

    /// Install an index entry for an image that is already on disk.
    ///
    /// This is how a live view learns about images an external writer has
    /// persisted: it opens a reader for the containing file on first sight,
    /// infers pixel properties if they are still unknown, and (with
    /// `new_image_updates`) updates the axis tables and wakes
    /// `await_new_image` waiters.
    pub fn add_index_entry(
        &self,
        entry: IndexEntry,
        new_image_updates: bool,
    ) -> Result<ImageCoords, DatasetError> {
        let mut state = self.lock();
        self.install_entry(&mut state, entry, new_image_updates)
    }

    /// Parse one raw index record from an external writer and install it.
    ///
    /// Returns `None` for the zero-length terminator record.
    pub fn add_index_entry_bytes(
        &self,
        data: &[u8],
    ) -> Result<Option<ImageCoords>, DatasetError> {
        match IndexEntry::decode(data, 0).map_err(DatasetError::Format)? {
            Some((entry, _)) => Ok(Some(self.add_index_entry(entry, true)?)),
            None => Ok(None),
        }
    }

    /// Build a lazily evaluated chunked array over this dataset.
    pub fn as_array(&self, params: ArrayParams) -> Result<ArrayView<'_>, DatasetError> {
        ArrayView::new(self, params)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("dataset mutex poisoned")
    }

    fn stack_filename(&self, file_index: Option<u32>) -> String {
        let base = match file_index {
            None => "NDTiffStack.tif".to_owned(),
            Some(index) => format!("NDTiffStack_{index}.tif"),
        };
        match &self.name {
            Some(name) => format!("{name}_{base}"),
            None => base,
        }
    }

    fn install_entry(
        &self,
        state: &mut State,
        entry: IndexEntry,
        new_image_updates: bool,
    ) -> Result<ImageCoords, DatasetError> {
        let coordinates = entry.axes.clone();

        if !state.readers.contains_key(&entry.filename) {
            let file_path = self.file_io.path_join(&self.path, &entry.filename);
            let reader = if self.writable {
                // this process is writing the file, so the summary is known
                SingleFileReader::attach(
                    &*self.file_io,
                    &file_path,
                    state.summary_metadata.clone(),
                )?
            } else {
                let reader = SingleFileReader::open(&*self.file_io, &file_path)?;
                state.major_version = reader.major_version();
                state.minor_version = reader.minor_version();
                reader
            };
            state.readers.insert(entry.filename.clone(), Arc::new(reader));
        }

        if state.properties.is_none() {
            state.properties = Some(ImageProperties::from_entry(&entry));
        }
        state.index.insert(coordinates.clone(), entry);

        if new_image_updates {
            state.axes.update(&coordinates)?;
            update_channel_names(state)?;
            self.new_image.notify();
        }
        Ok(coordinates)
    }

    fn lookup(
        &self,
        coordinates: &ImageCoords,
    ) -> Result<Lookup, DatasetError> {
        let state = self.lock();
        let coordinates = state.axes.consolidate(coordinates)?;
        if let Some((image, metadata)) = state.write_pending.get(&coordinates) {
            return Ok(Lookup::Pending(image.clone(), metadata.clone()));
        }
        match state.index.get(&coordinates) {
            Some(entry) => {
                let reader = state
                    .readers
                    .get(&entry.filename)
                    .cloned()
                    .expect("a reader exists for every indexed file");
                Ok(Lookup::OnDisk(entry.clone(), reader))
            }
            None => Err(DatasetError::ImageNotFound {
                coordinates: coordinates.to_string(),
            }),
        }
    }

    pub(crate) fn set_full_resolution(&self, full_resolution: bool) {
        self.lock().full_resolution = Some(full_resolution);
    }
}

enum Lookup {
    Pending(Image, Value),
    OnDisk(IndexEntry, Arc<SingleFileReader>),
}

impl NdStorage for Dataset {
    fn has_image(&self, coordinates: &ImageCoords) -> bool {
        let state = self.lock();
        let Ok(coordinates) = state.axes.consolidate(coordinates) else {
            return false;
        };
        state.write_pending.contains_key(&coordinates) || state.index.contains_key(&coordinates)
    }

    fn read_image(&self, coordinates: &ImageCoords) -> Result<Image, DatasetError> {
        match self.lookup(coordinates)? {
            Lookup::Pending(image, _) => Ok(image),
            // the dataset lock is already released; the reader serializes
            // its own seek+read
            Lookup::OnDisk(entry, reader) => Ok(reader.read_image(&entry)?),
        }
    }

    fn read_metadata(&self, coordinates: &ImageCoords) -> Result<Value, DatasetError> {
        match self.lookup(coordinates)? {
            Lookup::Pending(_, metadata) => Ok(metadata),
            Lookup::OnDisk(entry, reader) => Ok(reader.read_metadata(&entry)?),
        }
    }

    fn get_image_coordinates_list(&self) -> Vec<ImageCoords> {
        self.lock().index.keys().cloned().collect()
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
        self.lock().overlap
    }

    fn full_resolution(&self) -> Option<bool> {
        self.lock().full_resolution
    }

    fn await_new_image(&self, timeout: Option<Duration>) -> bool {
        self.new_image.wait(timeout)
    }

    fn is_finished(&self) -> bool {
        self.finished.is_set()
    }

    fn close(&self) {
        self.lock().readers.clear();
    }
}

// =============================================================================
// Dataset opener
// =============================================================================

/// A dataset opened from disk: flat or multi-resolution.
#[derive(Debug)]
pub enum AnyDataset {
    /// A single-level dataset
    Flat(Dataset),
    /// A multi-resolution pyramid
    Pyramid(PyramidDataset),
}

impl AnyDataset {
    /// The common read capability of whichever flavor was opened.
    pub fn storage(&self) -> &dyn NdStorage {
        match self {
            AnyDataset::Flat(dataset) => dataset,
            AnyDataset::Pyramid(pyramid) => pyramid,
        }
    }
}

/// Open the dataset at `path`, dispatching on its on-disk layout.
///
/// A directory with a `Full resolution` subdirectory whose files carry
/// major version 3 opens as a [`PyramidDataset`]; a directory with a
/// top-level `NDTiff.index` opens as a flat [`Dataset`]; anything else
/// fails.
pub fn open_dataset(path: impl AsRef<Path>) -> Result<AnyDataset, DatasetError> {
    open_dataset_with_io(path, Arc::new(StdFileIo))
}

/// [`open_dataset`] over a custom backend.
pub fn open_dataset_with_io(
    path: impl AsRef<Path>,
    file_io: Arc<dyn FileIo>,
) -> Result<AnyDataset, DatasetError> {
    let path = path.as_ref();
    let entries = file_io.list_dir(path)?;

    let has_full_res = entries.iter().any(|name| {
        name == FULL_RESOLUTION_DIR && file_io.is_dir(&file_io.path_join(path, name))
    });
    if has_full_res {
        let full_res_path = file_io.path_join(path, FULL_RESOLUTION_DIR);
        let tiff_name = file_io
            .list_dir(&full_res_path)?
            .into_iter()
            .find(|name| name.ends_with(".tif"))
            .ok_or_else(|| DatasetError::IndexNotFound(full_res_path.clone()))?;
        let mut file = file_io.open_read(&file_io.path_join(&full_res_path, &tiff_name))?;
        let version_bytes = file.read_exact_at(12, 4)?;
        let major_version = u32::from_le_bytes([
            version_bytes[0],
            version_bytes[1],
            version_bytes[2],
            version_bytes[3],
        ]);
        if major_version != MAJOR_VERSION {
            return Err(DatasetError::Format(FormatError::UnsupportedMajorVersion(
                major_version,
            )));
        }
        return Ok(AnyDataset::Pyramid(PyramidDataset::open_with_io(
            path, file_io,
        )?));
    }

    if entries.iter().any(|name| name == INDEX_FILE_NAME) {
        return Ok(AnyDataset::Flat(Dataset::open_with_io(path, file_io)?));
    }

    Err(DatasetError::IndexNotFound(path.to_owned()))
}

// =============================================================================
// Helpers
// =============================================================================

fn overlap_from_summary(summary_metadata: &Value) -> Option<(u32, u32)> {
    let y = summary_metadata.get("GridPixelOverlapY")?.as_u64()?;
    let x = summary_metadata.get("GridPixelOverlapX")?.as_u64()?;
    Some((y as u32, x as u32))
}

/// Keep the channel-name table current.
///
/// From format 3.2 on, channel names are simply the values of the string
/// `channel` axis, in first-seen order. Pre-3.2 datasets carry a `ChNames`
/// list in the summary metadata; older ones only name channels in each
/// image's metadata, so names are discovered by reading one image per
/// integer channel value.
fn update_channel_names(state: &mut State) -> Result<(), DatasetError> {
    let version = (state.major_version, state.minor_version);
    if version >= (MAJOR_VERSION, 2) {
        if let Some(values) = state.axes.string_values(CHANNEL_AXIS) {
            state.channels = values
                .iter()
                .enumerate()
                .map(|(index, name)| (name.clone(), AxisValue::Int(index as i32)))
                .collect();
        }
        return Ok(());
    }

    if let Some(names) = state
        .summary_metadata
        .get("ChNames")
        .and_then(|value| value.as_array())
    {
        state.channels = names
            .iter()
            .filter_map(|value| value.as_str())
            .enumerate()
            .map(|(index, name)| (name.to_owned(), AxisValue::Int(index as i32)))
            .collect();
        return Ok(());
    }

    let Some(channel_count) = state.axes.domain(CHANNEL_AXIS).map(|domain| domain.len())
    else {
        return Ok(());
    };
    let lookups: Vec<(AxisValue, IndexEntry)> = state
        .index
        .iter()
        .filter_map(|(coordinates, entry)| {
            coordinates
                .get(CHANNEL_AXIS)
                .map(|value| (value.clone(), entry.clone()))
        })
        .collect();
    for (value, entry) in lookups {
        if state.channels.len() == channel_count {
            break;
        }
        if state.channels.iter().any(|(_, known)| *known == value) {
            continue;
        }
        let reader = state
            .readers
            .get(&entry.filename)
            .cloned()
            .expect("a reader exists for every indexed file");
        let metadata = reader.read_metadata(&entry)?;
        if let Some(name) = metadata.get("Channel").and_then(|value| value.as_str()) {
            state.channels.push((name.to_owned(), value));
        }
    }
    Ok(())
}

fn create_unique_acq_dir(
    file_io: &dyn FileIo,
    root: &Path,
    prefix: &str,
) -> Result<PathBuf, DatasetError> {
    file_io.create_dir_all(root)?;
    let marker = format!("{prefix}_");
    let mut max_number = 0u32;
    for entry in file_io.list_dir(root)? {
        if let Some(rest) = entry.strip_prefix(&marker) {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if let Ok(number) = digits.parse::<u32>() {
                max_number = max_number.max(number);
            }
        }
    }
    let dir = file_io.path_join(root, &format!("{}_{}", prefix, max_number + 1));
    file_io.create_dir_all(&dir)?;
    Ok(dir)
}

// =============================================================================
// Tests
// =============================================================================
