//! Axis names, axis values, and image coordinates.
//!
//! A dataset addresses each 2-D image plane by a sparse set of named axis
//! coordinates, e.g. `{time: 3, channel: "DAPI", z: 0}`. Axis values are
//! either 32-bit signed integers or UTF-8 strings; per dataset, each axis
//! name is bound to exactly one value kind the first time it is seen.
//!
//! The recognized axis names (`row`, `column`, `position`, `time`,
//! `channel`, `z`) carry a canonical precedence used when presenting axes
//! in a fixed order; any other name is permitted and sorts next to
//! `channel`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Tile-grid row axis.
pub const ROW_AXIS: &str = "row";
/// Tile-grid column axis.
pub const COLUMN_AXIS: &str = "column";
/// XY stage position axis.
pub const POSITION_AXIS: &str = "position";
/// Time point axis.
pub const TIME_AXIS: &str = "time";
/// Channel axis.
pub const CHANNEL_AXIS: &str = "channel";
/// Z slice axis.
pub const Z_AXIS: &str = "z";

/// Precedence of an axis name in the canonical presentation order.
///
/// Axes are sorted by this key, descending. Unrecognized axes share the
/// channel precedence and therefore stack next to channel axes.
pub(crate) fn axis_order_key(name: &str) -> u8 {
    match name {
        ROW_AXIS => 7,
        COLUMN_AXIS => 6,
        POSITION_AXIS => 5,
        TIME_AXIS => 4,
        CHANNEL_AXIS => 3,
        Z_AXIS => 2,
        _ => 3,
    }
}

// =============================================================================
// AxisValue
// =============================================================================

/// The value of one axis coordinate: a 32-bit signed integer or a string.
///
/// The untagged serde representation matches the JSON axes object stored in
/// the index file, where `{"time": 3, "channel": "DAPI"}` mixes both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
    /// Integer-valued coordinate
    Int(i32),
    /// String-valued coordinate
    Str(String),
}

impl AxisValue {
    /// The integer value, if this is an integer coordinate.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            AxisValue::Int(i) => Some(*i),
            AxisValue::Str(_) => None,
        }
    }

    /// The string value, if this is a string coordinate.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AxisValue::Int(_) => None,
            AxisValue::Str(s) => Some(s),
        }
    }
}

impl From<i32> for AxisValue {
    fn from(value: i32) -> Self {
        AxisValue::Int(value)
    }
}

impl From<&str> for AxisValue {
    fn from(value: &str) -> Self {
        AxisValue::Str(value.to_owned())
    }
}

impl From<String> for AxisValue {
    fn from(value: String) -> Self {
        AxisValue::Str(value)
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Int(i) => write!(f, "{i}"),
            AxisValue::Str(s) => write!(f, "{s}"),
        }
    }
}

// =============================================================================
// ImageCoords
// =============================================================================

/// The set of axis coordinates that identifies one image in a dataset.
///
/// Equality is set equality: two coordinate sets are the same image key if
/// they contain the same (axis, value) pairs, regardless of the order in
/// which they were built.
///
/// # Example
///
/// ```
/// use ndtiff::ImageCoords;
///
/// let coords = ImageCoords::new().time(3).channel("DAPI").z(0);
/// assert_eq!(coords.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCoords(BTreeMap<String, AxisValue>);

impl ImageCoords {
    /// Create an empty coordinate set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel coordinate (integer index or string name).
    pub fn channel(self, value: impl Into<AxisValue>) -> Self {
        self.axis(CHANNEL_AXIS, value)
    }

    /// Set the z-slice coordinate.
    pub fn z(self, value: i32) -> Self {
        self.axis(Z_AXIS, value)
    }

    /// Set the time-point coordinate.
    pub fn time(self, value: i32) -> Self {
        self.axis(TIME_AXIS, value)
    }

    /// Set the XY-position coordinate (integer index or string name).
    pub fn position(self, value: impl Into<AxisValue>) -> Self {
        self.axis(POSITION_AXIS, value)
    }

    /// Set the tile-grid row coordinate.
    pub fn row(self, value: i32) -> Self {
        self.axis(ROW_AXIS, value)
    }

    /// Set the tile-grid column coordinate.
    pub fn column(self, value: i32) -> Self {
        self.axis(COLUMN_AXIS, value)
    }

    /// Set a coordinate on an arbitrarily named axis.
    pub fn axis(mut self, name: impl Into<String>, value: impl Into<AxisValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert a coordinate in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AxisValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Remove an axis, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<AxisValue> {
        self.0.remove(name)
    }

    /// The value on `name`, if set.
    pub fn get(&self, name: &str) -> Option<&AxisValue> {
        self.0.get(name)
    }

    /// Whether a coordinate is set on `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of coordinates in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over (axis, value) pairs in axis-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AxisValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for ImageCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<AxisValue>> FromIterator<(K, V)> for ImageCoords {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        ImageCoords(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// =============================================================================
// AxesTable
// =============================================================================

/// The set of values observed on one axis.
///
/// Integer values are kept sorted ascending. String values are recorded in
/// first-seen order, which defines the integer-index translation (the
/// first string seen on an axis is index 0); when the axis is *stacked*
/// into an array, its values are presented sorted, matching the
/// presentation order of integer axes.
#[derive(Debug, Clone)]
pub enum AxisDomain {
    /// Sorted distinct integer values
    Int(BTreeSet<i32>),
    /// Distinct string values in first-seen order
    Str(Vec<String>),
}

impl AxisDomain {
    /// Number of distinct values seen on this axis.
    pub fn len(&self) -> usize {
        match self {
            AxisDomain::Int(set) => set.len(),
            AxisDomain::Str(values) => values.len(),
        }
    }

    /// Whether no value has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The values of this axis in presentation order: ascending for
    /// integers, sorted for strings.
    pub fn values(&self) -> Vec<AxisValue> {
        match self {
            AxisDomain::Int(set) => set.iter().map(|i| AxisValue::Int(*i)).collect(),
            AxisDomain::Str(values) => {
                let mut sorted = values.clone();
                sorted.sort();
                sorted.into_iter().map(AxisValue::Str).collect()
            }
        }
    }
}

/// Bookkeeping for every axis a dataset has seen: value kind, ordered
/// distinct values, and the first-seen order of axis names used for the
/// canonical sort.
#[derive(Debug, Clone, Default)]
pub(crate) struct AxesTable {
    domains: HashMap<String, AxisDomain>,
    seen_order: Vec<String>,
}

impl AxesTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the coordinates of a newly seen image.
    ///
    /// Binds each previously unseen axis to the kind of its value; fails
    /// with [`DatasetError::AxisTypeConflict`] when an axis that was bound
    /// to one kind is given a value of the other.
    pub(crate) fn update(&mut self, coords: &ImageCoords) -> Result<(), DatasetError> {
        for (name, value) in coords.iter() {
            match self.domains.get_mut(name) {
                None => {
                    self.seen_order.push(name.to_owned());
                    let domain = match value {
                        AxisValue::Int(i) => AxisDomain::Int(BTreeSet::from([*i])),
                        AxisValue::Str(s) => AxisDomain::Str(vec![s.clone()]),
                    };
                    self.domains.insert(name.to_owned(), domain);
                }
                Some(AxisDomain::Int(set)) => match value {
                    AxisValue::Int(i) => {
                        set.insert(*i);
                    }
                    AxisValue::Str(_) => {
                        return Err(DatasetError::AxisTypeConflict {
                            axis: name.to_owned(),
                        })
                    }
                },
                Some(AxisDomain::Str(values)) => match value {
                    AxisValue::Str(s) => {
                        if !values.contains(s) {
                            values.push(s.clone());
                        }
                    }
                    AxisValue::Int(_) => {
                        return Err(DatasetError::AxisTypeConflict {
                            axis: name.to_owned(),
                        })
                    }
                },
            }
        }
        Ok(())
    }

    /// Axis names in canonical order: precedence descending, ties in
    /// first-seen order.
    pub(crate) fn sorted_names(&self) -> Vec<String> {
        let mut names = self.seen_order.clone();
        // sort_by is stable, so equal keys keep first-seen order
        names.sort_by(|a, b| axis_order_key(b).cmp(&axis_order_key(a)));
        names
    }

    /// The value domain of one axis.
    pub(crate) fn domain(&self, name: &str) -> Option<&AxisDomain> {
        self.domains.get(name)
    }

    /// The ordered string values of a string-valued axis.
    pub(crate) fn string_values(&self, name: &str) -> Option<&[String]> {
        match self.domains.get(name) {
            Some(AxisDomain::Str(values)) => Some(values),
            _ => None,
        }
    }

    /// Normalize caller-supplied coordinates against this table.
    ///
    /// Translates integer indices supplied on string-valued axes into the
    /// underlying string (index 0 is the first string seen), and remaps the
    /// deprecated `channel_name` axis to `channel`. Coordinates on axes the
    /// table has never seen pass through unchanged.
    pub(crate) fn consolidate(&self, coords: &ImageCoords) -> Result<ImageCoords, DatasetError> {
        let mut out = ImageCoords::new();
        for (name, value) in coords.iter() {
            let name = if name == "channel_name" {
                tracing::warn!("channel_name is deprecated, use \"channel\" instead");
                CHANNEL_AXIS
            } else {
                name
            };
            let value = match (self.domains.get(name), value) {
                (Some(AxisDomain::Str(values)), AxisValue::Int(i)) => {
                    let index = usize::try_from(*i).ok().filter(|i| *i < values.len());
                    match index {
                        Some(index) => AxisValue::Str(values[index].clone()),
                        None => {
                            return Err(DatasetError::StringAxisIndexOutOfRange {
                                axis: name.to_owned(),
                                index: *i,
                                len: values.len(),
                            })
                        }
                    }
                }
                _ => value.clone(),
            };
            out.insert(name, value);
        }
        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
