//! Write-then-read round trips through the full dataset engine.

use ndtiff::{
    open_dataset, AnyDataset, ArrayParams, Dataset, Dtype, ImageCoords, ImageData, NdStorage,
    PixelType,
};
use serde_json::json;

use super::test_utils::{mono16_fill, mono8_fill};

#[test]
fn test_write_then_read_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    let mut written = Vec::new();
    for time in 0..10 {
        let image = mono16_fill(256, 256, time as u16);
        let coordinates = ImageCoords::new().time(time);
        dataset
            .put_image(&coordinates, &image, &json!({"time_metadata": time}))
            .unwrap();
        written.push(image.to_image());

        // visible immediately, before finish
        assert!(dataset.has_image(&coordinates));
        let read = dataset.read_image(&coordinates).unwrap();
        assert_eq!(read.data(), written[time as usize].data());
    }
    dataset.finish().unwrap();
    assert!(dataset.is_finished());

    // still readable through the same handle after finish
    for time in 0..10 {
        let coordinates = ImageCoords::new().time(time);
        let read = dataset.read_image(&coordinates).unwrap();
        assert_eq!(read.data(), written[time as usize].data());
    }

    // and after re-opening from disk
    let reopened = Dataset::open(dir.path()).unwrap();
    for time in 0..10 {
        let coordinates = ImageCoords::new().time(time);
        let read = reopened.read_image(&coordinates).unwrap();
        assert_eq!(read.data(), written[time as usize].data());
        assert_eq!(
            reopened.read_metadata(&coordinates).unwrap(),
            json!({"time_metadata": time})
        );
    }
}

#[test]
fn test_reopened_dataset_lists_all_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    let mut expected = Vec::new();
    for time in 0..3 {
        for z in 0..4 {
            let coordinates = ImageCoords::new().time(time).z(z);
            dataset
                .put_image(&coordinates, &mono8_fill(16, 16, 1), &json!({}))
                .unwrap();
            expected.push(coordinates);
        }
    }
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let listed = reopened.get_image_coordinates_list();
    assert_eq!(listed.len(), expected.len());
    for coordinates in &expected {
        assert!(listed.contains(coordinates));
        assert!(reopened.has_image(coordinates));
    }
}

#[test]
fn test_missing_image_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));
    dataset
        .put_image(&ImageCoords::new().time(0), &mono8_fill(8, 8, 1), &json!({}))
        .unwrap();
    dataset.finish().unwrap();

    assert!(!dataset.has_image(&ImageCoords::new().time(1)));
    let err = dataset
        .read_image(&ImageCoords::new().time(1))
        .unwrap_err();
    assert!(matches!(err, ndtiff::DatasetError::ImageNotFound { .. }));
}

#[test]
fn test_eleven_bit_data_reads_as_u16() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    let image = mono16_fill(64, 64, 1000).with_bit_depth(11);
    dataset
        .put_image(
            &ImageCoords::new().time(0),
            &image,
            &json!({"BitDepth": 11}),
        )
        .unwrap();
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let coordinates = ImageCoords::new().time(0);
    assert_eq!(
        reopened.read_metadata(&coordinates).unwrap()["BitDepth"],
        11
    );
    let read = reopened.read_image(&coordinates).unwrap();
    assert_eq!(read.pixel_type(), PixelType::ElevenBit);
    assert_eq!(read.dtype(), Dtype::U16);
    assert_eq!(read.sample(0, 0, 0), 1000);
}

#[test]
fn test_rgb_roundtrip_stores_bgr() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));

    // 2x1 image, 4 bytes per source pixel
    let source = vec![10u8, 20, 30, 0, 40, 50, 60, 0];
    dataset
        .put_image(
            &ImageCoords::new().time(0),
            &ImageData::rgb8(2, 1, source),
            &json!({}),
        )
        .unwrap();
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let read = reopened.read_image(&ImageCoords::new().time(0)).unwrap();
    assert_eq!(read.pixel_type(), PixelType::EightBitRgb);
    assert_eq!(read.shape(), vec![1, 2, 3]);
    // bytes [2, 1, 0] of each source pixel survive
    assert_eq!(&read.data()[..], &[30, 20, 10, 60, 50, 40]);
}

#[test]
fn test_open_dataset_dispatches_to_flat() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));
    dataset
        .put_image(&ImageCoords::new().time(0), &mono8_fill(8, 8, 3), &json!({}))
        .unwrap();
    dataset.finish().unwrap();

    match open_dataset(dir.path()).unwrap() {
        AnyDataset::Flat(flat) => {
            assert!(flat.has_image(&ImageCoords::new().time(0)));
        }
        AnyDataset::Pyramid(_) => panic!("flat dataset opened as pyramid"),
    }
}

#[test]
fn test_named_dataset_gets_unique_directory_and_prefix() {
    let root = tempfile::tempdir().unwrap();

    let first = Dataset::create(root.path(), Some("acq")).unwrap();
    first.initialize(json!({}));
    first
        .put_image(&ImageCoords::new().time(0), &mono8_fill(4, 4, 1), &json!({}))
        .unwrap();
    first.finish().unwrap();
    assert!(first.path().ends_with("acq_1"));
    assert!(first.path().join("acq_NDTiffStack.tif").exists());

    let second = Dataset::create(root.path(), Some("acq")).unwrap();
    assert!(second.path().ends_with("acq_2"));
}

#[test]
fn test_summary_metadata_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({"Prefix": "exp42", "Interval_ms": 250}));
    dataset
        .put_image(&ImageCoords::new().time(0), &mono8_fill(4, 4, 1), &json!({}))
        .unwrap();
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let summary = reopened.summary_metadata();
    assert_eq!(summary["Prefix"], "exp42");
    assert_eq!(summary["Interval_ms"], 250);
    assert_eq!(reopened.major_version(), 3);
    assert_eq!(reopened.minor_version(), 3);
}

#[test]
fn test_default_array_is_time_stacked() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));
    for time in 0..5 {
        dataset
            .put_image(
                &ImageCoords::new().time(time),
                &mono16_fill(16, 8, time as u16),
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
    assert_eq!(array.shape(), &[5, 8, 16]);
    for time in 0..5 {
        assert_eq!(array.value_at(&[time, 0, 0]), time as u64);
        assert_eq!(array.value_at(&[time, 7, 15]), time as u64);
    }
}
