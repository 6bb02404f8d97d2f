//! Axis bookkeeping, string axes, channel names, and the I/O seam.

use std::sync::Arc;

use ndtiff::{ArrayParams, Dataset, DatasetError, ImageCoords, NdStorage};
use serde_json::json;

use super::test_utils::{mono16_fill, FailingFileIo};

#[test]
fn test_axes_sort_in_canonical_order() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    // written in a scrambled order on purpose
    for z in 0..4 {
        for channel in ["DAPI", "FITC"] {
            for time in 0..3 {
                dataset
                    .put_image(
                        &ImageCoords::new().z(z).channel(channel).time(time),
                        &mono16_fill(8, 8, 1),
                        &json!({}),
                    )
                    .unwrap();
            }
        }
    }
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    assert_eq!(reopened.axis_names(), vec!["time", "channel", "z"]);

    // the default array stacks (|time|, |channel|, |z|) ahead of y, x
    let view = reopened.as_array(ArrayParams::new()).unwrap();
    assert_eq!(view.shape(), vec![3, 2, 4, 8, 8]);
}

#[test]
fn test_channel_names_from_string_axis() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    for (index, channel) in ["DAPI", "FITC"].iter().enumerate() {
        dataset
            .put_image(
                &ImageCoords::new().channel(*channel),
                &mono16_fill(8, 8, index as u16 + 1),
                &json!({}),
            )
            .unwrap();
    }
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    assert_eq!(reopened.get_channel_names(), vec!["DAPI", "FITC"]);

    // integer channel indices resolve through first-seen order
    let dapi = reopened
        .read_image(&ImageCoords::new().channel(0))
        .unwrap();
    assert_eq!(dapi.sample(0, 0, 0), 1);
    let fitc = reopened
        .read_image(&ImageCoords::new().channel(1))
        .unwrap();
    assert_eq!(fitc.sample(0, 0, 0), 2);
}

#[test]
fn test_string_axis_index_translation_matches_write_order() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    dataset
        .put_image(
            &ImageCoords::new().channel("DAPI"),
            &mono16_fill(16, 16, 42),
            &json!({}),
        )
        .unwrap();

    // the first string seen is index 0, already before finish
    let by_index = dataset.read_image(&ImageCoords::new().channel(0)).unwrap();
    let by_name = dataset
        .read_image(&ImageCoords::new().channel("DAPI"))
        .unwrap();
    assert_eq!(by_index.data(), by_name.data());
    dataset.finish().unwrap();
}

#[test]
fn test_labeled_positions_stack_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    // acquisition order Pos2, Pos0, Pos1 with [0, 0] pixels 0, 1, 2
    for (position, fill) in [("Pos2", 0u16), ("Pos0", 1), ("Pos1", 2)] {
        dataset
            .put_image(
                &ImageCoords::new().position(position),
                &mono16_fill(8, 8, fill),
                &json!({"PositionName": position}),
            )
            .unwrap();
    }
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let values: Vec<String> = reopened
        .axis_values("position")
        .unwrap()
        .into_iter()
        .map(|value| value.as_str().unwrap().to_owned())
        .collect();
    assert_eq!(values, vec!["Pos0", "Pos1", "Pos2"]);

    for position in ["Pos0", "Pos1", "Pos2"] {
        let metadata = reopened
            .read_metadata(&ImageCoords::new().position(position))
            .unwrap();
        assert_eq!(metadata["PositionName"], position);
    }

    // stacking follows the sorted position order, so the [0, 0] pixels
    // come back as (1, 2, 0)
    let array = reopened
        .as_array(ArrayParams::new())
        .unwrap()
        .materialize()
        .unwrap();
    assert_eq!(array.shape(), &[3, 8, 8]);
    assert_eq!(
        [
            array.value_at(&[0, 0, 0]),
            array.value_at(&[1, 0, 0]),
            array.value_at(&[2, 0, 0]),
        ],
        [1, 2, 0]
    );
}

#[test]
fn test_unordered_z_axis_stacks_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    // z written 0..5 then -5..0; pixel marks acquisition order
    let z_order: Vec<i32> = (0..5).chain(-5..0).collect();
    for (acquisition_index, z) in z_order.iter().enumerate() {
        dataset
            .put_image(
                &ImageCoords::new().z(*z),
                &mono16_fill(4, 4, acquisition_index as u16),
                &json!({}),
            )
            .unwrap();
    }
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let array = reopened
        .as_array(ArrayParams::new())
        .unwrap()
        .materialize()
        .unwrap();
    assert_eq!(array.shape(), &[10, 4, 4]);

    // slices come back in ascending z order
    let mut sorted_z = z_order.clone();
    sorted_z.sort();
    for (slice, z) in sorted_z.iter().enumerate() {
        let acquisition_index = z_order.iter().position(|v| v == z).unwrap() as u64;
        assert_eq!(array.value_at(&[slice, 0, 0]), acquisition_index);
    }
}

#[test]
fn test_axis_type_conflict_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    dataset
        .put_image(
            &ImageCoords::new().channel("DAPI"),
            &mono16_fill(4, 4, 0),
            &json!({}),
        )
        .unwrap();
    let err = dataset
        .put_image(
            &ImageCoords::new().axis("channel", 5),
            &mono16_fill(4, 4, 0),
            &json!({}),
        )
        .unwrap_err();
    assert!(matches!(err, DatasetError::AxisTypeConflict { axis } if axis == "channel"));
    dataset.finish().unwrap();
}

#[test]
fn test_custom_axis_names_are_stored_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    let coordinates = ImageCoords::new().time(0).axis("mutant", "B12");
    dataset
        .put_image(&coordinates, &mono16_fill(4, 4, 9), &json!({}))
        .unwrap();
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    assert!(reopened.has_image(&coordinates));
    assert!(reopened.axis_names().contains(&"mutant".to_owned()));
    let read = reopened.read_image(&coordinates).unwrap();
    assert_eq!(read.sample(0, 0, 0), 9);
}

#[test]
fn test_failing_backend_propagates_io_errors() {
    let err = Dataset::open_with_io("/nonexistent/dataset", Arc::new(FailingFileIo)).unwrap_err();
    assert!(matches!(err, DatasetError::Io(_)));

    let err =
        ndtiff::open_dataset_with_io("/nonexistent/dataset", Arc::new(FailingFileIo)).unwrap_err();
    assert!(matches!(err, DatasetError::Io(_)));

    let err = Dataset::create_with_io("/nonexistent/dataset", None, Arc::new(FailingFileIo))
        .unwrap_err();
    assert!(matches!(err, DatasetError::Io(_)));
}
