//! Stitched array assembly and the multi-resolution pyramid composite.

use std::path::Path;

use ndtiff::{
    open_dataset, AnyDataset, ArrayParams, Dataset, DatasetError, ImageCoords, ImageData,
    NdStorage, PyramidDataset, FULL_RESOLUTION_DIR,
};
use serde_json::{json, Value};

use super::test_utils::{mono16_fill, mono16_gradient};

fn grid_summary(overlap_y: u32, overlap_x: u32) -> Value {
    json!({
        "GridPixelOverlapY": overlap_y,
        "GridPixelOverlapX": overlap_x,
    })
}

/// Write one resolution level as a flat dataset of grid tiles.
fn write_level(path: &Path, summary: &Value, tiles: &[(i32, i32, ImageData)]) {
    let dataset = Dataset::create(path, None).unwrap();
    dataset.initialize(summary.clone());
    for (row, column, image) in tiles {
        dataset
            .put_image(
                &ImageCoords::new().row(*row).column(*column),
                image,
                &json!({}),
            )
            .unwrap();
    }
    dataset.finish().unwrap();
}

#[test]
fn test_stitched_corners_with_partial_grid() {
    let dir = tempfile::tempdir().unwrap();
    // tiles on the main diagonal only; the off-diagonal corners stay empty
    write_level(
        &dir.path().join(FULL_RESOLUTION_DIR),
        &grid_summary(0, 0),
        &[
            (0, 0, mono16_fill(16, 16, 5)),
            (1, 1, mono16_fill(16, 16, 7)),
        ],
    );

    let pyramid = match open_dataset(dir.path()).unwrap() {
        AnyDataset::Pyramid(pyramid) => pyramid,
        AnyDataset::Flat(_) => panic!("pyramid layout opened as flat"),
    };
    let array = pyramid
        .as_array_at(0, ArrayParams::new().stitched(true))
        .unwrap()
        .materialize()
        .unwrap();

    assert_eq!(array.shape(), &[32, 32]);
    assert!(array.value_at(&[0, 0]) > 0);
    assert!(array.value_at(&[31, 31]) > 0);
    assert_eq!(array.value_at(&[0, 31]), 0);
    assert_eq!(array.value_at(&[31, 0]), 0);
}

#[test]
fn test_full_resolution_stitching_crops_half_overlap_per_side() {
    let dir = tempfile::tempdir().unwrap();
    // 12x12 tiles with 4 pixels of overlap leave 8x8 of unique content
    write_level(
        &dir.path().join(FULL_RESOLUTION_DIR),
        &grid_summary(4, 4),
        &[
            (0, 0, mono16_gradient(12, 12, 0)),
            (0, 1, mono16_gradient(12, 12, 1000)),
        ],
    );

    let pyramid = PyramidDataset::open(dir.path()).unwrap();
    let array = pyramid
        .as_array_at(0, ArrayParams::new().stitched(true))
        .unwrap()
        .materialize()
        .unwrap();
    assert_eq!(array.shape(), &[8, 16]);

    // the tile at (0, 0) contributes exactly rows 2..10, columns 2..10 of
    // its source (floor(4/2) from the low side, ceil(4/2) from the high)
    assert_eq!(array.value_at(&[0, 0]), 2 * 12 + 2);
    assert_eq!(array.value_at(&[7, 7]), 9 * 12 + 9);
    // the tile at (0, 1) starts at stitched column 8
    assert_eq!(array.value_at(&[0, 8]), 2 * 12 + 2 + 1000);
    assert_eq!(array.value_at(&[7, 15]), 9 * 12 + 9 + 1000);
}

#[test]
fn test_negative_grid_indices_span_inclusive_range() {
    let dir = tempfile::tempdir().unwrap();
    write_level(
        &dir.path().join(FULL_RESOLUTION_DIR),
        &grid_summary(0, 0),
        &[
            (-1, -1, mono16_fill(8, 8, 3)),
            (0, 0, mono16_fill(8, 8, 9)),
        ],
    );

    let pyramid = PyramidDataset::open(dir.path()).unwrap();
    let array = pyramid
        .as_array_at(0, ArrayParams::new().stitched(true))
        .unwrap()
        .materialize()
        .unwrap();

    // grid spans rows -1..=0, columns -1..=0; the tile at (-1, -1) lands
    // at grid position (0, 0)
    assert_eq!(array.shape(), &[16, 16]);
    assert_eq!(array.value_at(&[0, 0]), 3);
    assert_eq!(array.value_at(&[8, 8]), 9);
    assert_eq!(array.value_at(&[0, 8]), 0);
    assert_eq!(array.value_at(&[8, 0]), 0);
}

#[test]
fn test_stitched_grid_with_stacked_time_axis() {
    let dir = tempfile::tempdir().unwrap();
    let level_path = dir.path().join(FULL_RESOLUTION_DIR);
    let dataset = Dataset::create(&level_path, None).unwrap();
    dataset.initialize(grid_summary(0, 0));
    for time in 0..2 {
        for (row, column) in [(0, 0), (0, 1)] {
            // leave one tile out at time 1
            if time == 1 && column == 1 {
                continue;
            }
            dataset
                .put_image(
                    &ImageCoords::new().time(time).row(row).column(column),
                    &mono16_fill(8, 8, (time * 10 + column + 1) as u16),
                    &json!({}),
                )
                .unwrap();
        }
    }
    dataset.finish().unwrap();

    let pyramid = PyramidDataset::open(dir.path()).unwrap();
    let array = pyramid
        .as_array_at(0, ArrayParams::new().stitched(true))
        .unwrap()
        .materialize()
        .unwrap();

    assert_eq!(array.shape(), &[2, 8, 16]);
    assert_eq!(array.value_at(&[0, 0, 0]), 1);
    assert_eq!(array.value_at(&[0, 0, 8]), 2);
    assert_eq!(array.value_at(&[1, 0, 0]), 11);
    // the missing tile reads as zeros rather than raising
    assert_eq!(array.value_at(&[1, 0, 8]), 0);
}

#[test]
fn test_pyramid_composite_crops_each_level_to_data_extent() {
    let dir = tempfile::tempdir().unwrap();
    let summary = grid_summary(8, 8);
    // 40x40 tiles with 8 of overlap: 32x32 unique, 2x2 grid = 64x64 total
    let mut full_res_tiles = Vec::new();
    for row in 0..2 {
        for column in 0..2 {
            full_res_tiles.push((row, column, mono16_fill(40, 40, 100)));
        }
    }
    write_level(
        &dir.path().join(FULL_RESOLUTION_DIR),
        &summary,
        &full_res_tiles,
    );
    // at 2x downsampling the same extent fits in one tile
    write_level(
        &dir.path().join("Downsampled_2x"),
        &summary,
        &[(0, 0, mono16_fill(40, 40, 50))],
    );

    let pyramid = PyramidDataset::open(dir.path()).unwrap();
    assert_eq!(pyramid.resolution_levels().count(), 2);

    let arrays = pyramid
        .as_array_pyramid(ArrayParams::new().stitched(true))
        .unwrap();
    assert_eq!(arrays.len(), 2);

    let full = arrays[0].materialize().unwrap();
    assert_eq!(full.shape(), &[64, 64]);
    assert_eq!(full.value_at(&[0, 0]), 100);

    // the downsampled level is cropped from its 40x40 tile down to the
    // 32x32 extent where full-resolution data exists
    let half = arrays[1].materialize().unwrap();
    assert_eq!(half.shape(), &[32, 32]);
    assert_eq!(half.value_at(&[0, 0]), 50);
}

#[test]
fn test_stitching_requires_declared_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));
    dataset
        .put_image(
            &ImageCoords::new().row(0).column(0),
            &mono16_fill(8, 8, 1),
            &json!({}),
        )
        .unwrap();
    dataset.finish().unwrap();

    let reopened = Dataset::open(dir.path()).unwrap();
    let err = reopened
        .as_array(ArrayParams::new().stitched(true))
        .unwrap_err();
    assert!(matches!(err, DatasetError::NotStitchable));
}

#[test]
fn test_pyramid_level_access() {
    let dir = tempfile::tempdir().unwrap();
    write_level(
        &dir.path().join(FULL_RESOLUTION_DIR),
        &grid_summary(0, 0),
        &[(0, 0, mono16_fill(8, 8, 4))],
    );
    write_level(
        &dir.path().join("Downsampled_2x"),
        &grid_summary(0, 0),
        &[(0, 0, mono16_fill(8, 8, 2))],
    );

    let pyramid = PyramidDataset::open(dir.path()).unwrap();
    let coordinates = ImageCoords::new().row(0).column(0);

    assert!(pyramid.has_image_at(0, &coordinates).unwrap());
    assert!(pyramid.has_image_at(1, &coordinates).unwrap());
    assert_eq!(
        pyramid
            .read_image_at(1, &coordinates)
            .unwrap()
            .sample(0, 0, 0),
        2
    );
    // reads through the common storage interface hit the full resolution
    assert_eq!(pyramid.read_image(&coordinates).unwrap().sample(0, 0, 0), 4);

    let err = pyramid.has_image_at(5, &coordinates).unwrap_err();
    assert!(matches!(err, DatasetError::UnknownResolutionLevel(5)));
}
