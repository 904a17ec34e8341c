//! Cells on a stepped illumination field are found once the wavelet
//! approximation band is dropped.

use celltrack::config::{LabelingConfig, MaskConfig};
use celltrack::image_proc::thresholding::ThresholdMethod;
use celltrack::image_proc::{MaskBuilder, ObjectLabeler, WaveletKernel};
use ndarray::Array2;
use test_helpers::{disk_mask, in_disk};

const SIZE: usize = 128;
const BLOCK: usize = 32;
const RADIUS: f64 = 6.0;
const CELL_CONTRAST: f64 = 150.0;

/// One cell per 32x32 tile, centred in it.
fn centers() -> Vec<(f64, f64)> {
    let offset = (BLOCK / 2) as f64;
    (0..SIZE / BLOCK)
        .flat_map(|i| (0..SIZE / BLOCK).map(move |j| (i, j)))
        .map(|(i, j)| (offset + (i * BLOCK) as f64, offset + (j * BLOCK) as f64))
        .collect()
}

/// Background brightens by 300 per tile from the top-left corner.
fn illumination(row: usize, col: usize) -> f64 {
    100.0 + 300.0 * ((row / BLOCK) + (col / BLOCK)) as f64
}

fn uneven_frame() -> Array2<f64> {
    let centers = centers();
    Array2::from_shape_fn((SIZE, SIZE), |(r, c)| {
        let cell = centers.iter().any(|&center| in_disk(r, c, center, RADIUS));
        illumination(r, c) + if cell { CELL_CONTRAST } else { 0.0 }
    })
}

fn mask_config(keep_bands: Vec<usize>) -> MaskConfig {
    MaskConfig {
        keep_bands,
        kernel: WaveletKernel::Haar,
        levels: Some(5),
        block_size: 31,
        threshold_method: ThresholdMethod::Gaussian,
        threshold_offset: -1.0,
        erosion_radius: 0,
    }
}

#[test]
fn test_dropping_approximation_recovers_every_cell() {
    let _ = env_logger::builder().is_test(true).try_init();

    let frame = uneven_frame();
    // A cell in the dimmest tile is darker than bare background in the brightest
    assert!(frame[[16, 16]] < frame[[SIZE - 1, SIZE - 1]]);

    let config = mask_config(vec![1, 2, 3, 4, 5]);
    let expected = disk_mask((SIZE, SIZE), &centers(), RADIUS);

    let mask = MaskBuilder::from_config(&config)
        .segment(frame.view())
        .unwrap();
    assert_eq!(mask, expected);

    let labeler = ObjectLabeler::from_config(
        &config,
        &LabelingConfig {
            min_object_size: 50,
        },
    );
    let (labels, count) = labeler.label_frame(frame.view()).unwrap();
    assert_eq!(count, 16);
    for &(row, col) in &centers() {
        assert!(labels[[row as usize, col as usize]] > 0);
    }
}

#[test]
fn test_keeping_approximation_lets_tile_edges_through() {
    let frame = uneven_frame();
    let expected = disk_mask((SIZE, SIZE), &centers(), RADIUS);

    let mask = MaskBuilder::from_config(&mask_config((1..=6).collect()))
        .segment(frame.view())
        .unwrap();

    // Background on the bright side of each tile edge clears the local mean
    assert_ne!(mask, expected);
    assert!(mask[[BLOCK, 0]]);
    assert!(!mask[[BLOCK - 1, 0]]);
}
