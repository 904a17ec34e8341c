//! Adaptive thresholding and connected-component labeling.
//!
//! Foreground is decided per pixel against a threshold computed from its own
//! neighbourhood.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::image_proc::gaussian::{gaussian_filter, uniform_filter};
use crate::stack::{LabeledImage, Mask};

/// 8-connectivity neighboring offsets
#[rustfmt::skip]
pub(crate) const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1),           (0, 1),
    (1, -1),  (1, 0),  (1, 1),
];

/// How the local neighbourhood is weighted when computing per-pixel thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Gaussian-weighted mean with `sigma = (block_size - 1) / 6`
    #[default]
    Gaussian,
    /// Unweighted mean over the `block_size x block_size` window
    Mean,
}

/// Compute a per-pixel threshold surface.
///
/// # Arguments
///
/// * `image` - Input image
/// * `block_size` - Odd neighbourhood size; should exceed the expected object size
/// * `method` - Neighbourhood weighting
/// * `offset` - Constant subtracted from the local mean
///
/// # Returns
///
/// Threshold image with the same dimensions as `image`
pub fn threshold_local(
    image: ArrayView2<f64>,
    block_size: usize,
    method: ThresholdMethod,
    offset: f64,
) -> Result<Array2<f64>, PipelineError> {
    if block_size % 2 == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "threshold block size must be odd, got {block_size}"
        )));
    }

    let local = match method {
        ThresholdMethod::Gaussian => {
            let sigma = (block_size as f64 - 1.0) / 6.0;
            gaussian_filter(image, sigma)
        }
        ThresholdMethod::Mean => uniform_filter(image, block_size),
    };

    Ok(local.mapv(|t| t - offset))
}

/// Mark pixels strictly above their own threshold as foreground.
///
/// # Arguments
///
/// * `image` - Input image
/// * `thresholds` - Per-pixel threshold surface of the same shape
///
/// # Returns
///
/// A binary mask where true indicates a pixel above its threshold
pub fn apply_threshold(image: ArrayView2<f64>, thresholds: ArrayView2<f64>) -> Mask {
    let mut mask = Array2::from_elem(image.dim(), false);
    ndarray::Zip::from(&mut mask)
        .and(image)
        .and(thresholds)
        .for_each(|m, &v, &t| *m = v > t);
    mask
}

/// Find connected components in a binary mask
///
/// This uses a simple 8-connectivity flood fill algorithm. Labels are
/// assigned in raster order of each component's first pixel.
///
/// # Arguments
///
/// * `mask` - Binary mask
///
/// # Returns
///
/// A labeled image where each connected component has a unique label, and the
/// number of components
pub fn connected_components(mask: ArrayView2<bool>) -> (LabeledImage, u32) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut label_counter = 0;

    // Flood fill each component
    for i in 0..rows {
        for j in 0..cols {
            if mask[[i, j]] && labels[[i, j]] == 0 {
                label_counter += 1;
                let mut stack = vec![(i, j)];

                while let Some((y, x)) = stack.pop() {
                    if !mask[[y, x]] || labels[[y, x]] != 0 {
                        continue;
                    }

                    labels[[y, x]] = label_counter;

                    for &(dy, dx) in &NEIGHBORS_8 {
                        let ny = y as isize + dy;
                        let nx = x as isize + dx;

                        if ny >= 0 && ny < rows as isize && nx >= 0 && nx < cols as isize {
                            let ny = ny as usize;
                            let nx = nx as usize;

                            if mask[[ny, nx]] && labels[[ny, nx]] == 0 {
                                stack.push((ny, nx));
                            }
                        }
                    }
                }
            }
        }
    }

    (labels, label_counter)
}

/// Pixel count of every label `1..=num_labels` (index 0 counts background).
pub fn component_areas(labels: ArrayView2<u32>, num_labels: u32) -> Vec<usize> {
    let mut areas = vec![0usize; num_labels as usize + 1];
    for &label in labels.iter() {
        if let Some(area) = areas.get_mut(label as usize) {
            *area += 1;
        }
    }
    areas
}

/// Label connected components, dropping any smaller than `min_size` pixels.
///
/// Surviving components are renumbered `1..=n` in raster order.
///
/// # Returns
///
/// The labeled image and the number of surviving components
pub fn label_objects(mask: ArrayView2<bool>, min_size: usize) -> (LabeledImage, u32) {
    let (labels, num_labels) = connected_components(mask);
    let areas = component_areas(labels.view(), num_labels);

    let mut remap = vec![0u32; num_labels as usize + 1];
    let mut kept = 0;
    for label in 1..=num_labels as usize {
        if areas[label] >= min_size {
            kept += 1;
            remap[label] = kept;
        }
    }

    if kept < num_labels {
        log::debug!(
            "Removed {} of {} components smaller than {} px",
            num_labels - kept,
            num_labels,
            min_size
        );
    }

    (labels.mapv(|label| remap[label as usize]), kept)
}

/// Clear every connected component smaller than `min_size` pixels.
pub fn remove_small_objects(mask: ArrayView2<bool>, min_size: usize) -> Mask {
    let (labels, _) = label_objects(mask, min_size);
    labels.mapv(|label| label > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_apply_threshold() {
        let image = arr2(&[[0.1, 0.9], [0.8, 0.2]]);
        let thresholds = arr2(&[[0.5, 0.5], [0.8, 0.1]]);

        let mask = apply_threshold(image.view(), thresholds.view());

        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 1]]);
        // Equal to the threshold is background
        assert!(!mask[[1, 0]]);
        assert!(mask[[1, 1]]);
    }

    #[test]
    fn test_threshold_local_rejects_even_block() {
        let image = Array2::<f64>::zeros((8, 8));
        assert!(matches!(
            threshold_local(image.view(), 10, ThresholdMethod::Gaussian, 0.0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_local_threshold_handles_illumination_gradient() {
        // Two equally contrasted spots on very different backgrounds
        let mut image =
            Array2::from_shape_fn((40, 80), |(_, c)| if c < 40 { 10.0 } else { 200.0 });
        for r in 18..22 {
            for c in 18..22 {
                image[[r, c]] += 20.0;
            }
            for c in 58..62 {
                image[[r, c]] += 20.0;
            }
        }

        // Negative offset: foreground must beat the local mean by 5
        let thresholds =
            threshold_local(image.view(), 15, ThresholdMethod::Mean, -5.0).unwrap();
        let mask = apply_threshold(image.view(), thresholds.view());

        assert!(mask[[20, 20]]);
        assert!(mask[[20, 60]]);
        // Flat background well away from the step stays background
        assert!(!mask[[5, 5]]);
        assert!(!mask[[5, 70]]);
    }

    #[test]
    fn test_connected_components() {
        let mask = arr2(&[
            [false, true,  true,  false],
            [false, true,  false, false],
            [false, false, false, true ],
            [false, false, true,  true ],
        ]);

        let (labels, num_labels) = connected_components(mask.view());

        // (1,1) and (2,3) are not diagonal neighbours, so two components
        assert_eq!(num_labels, 2);

        let label1 = labels[[0, 1]];
        let label2 = labels[[2, 3]];

        assert!(label1 > 0);
        assert!(label2 > 0);
        assert_ne!(label1, label2);

        assert_eq!(labels[[0, 1]], labels[[0, 2]]);
        assert_eq!(labels[[0, 1]], labels[[1, 1]]);

        assert_eq!(labels[[2, 3]], labels[[3, 3]]);
        assert_eq!(labels[[2, 3]], labels[[3, 2]]);
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mask = arr2(&[[true, false], [false, true]]);
        let (_, n) = connected_components(mask.view());
        assert_eq!(n, 1);
    }

    #[test]
    fn test_label_objects_drops_small_and_renumbers() {
        let mask = arr2(&[
            [true,  false, false, true,  true ],
            [false, false, false, true,  true ],
            [false, false, false, false, false],
            [true,  true,  true,  false, false],
        ]);

        let (labels, n) = label_objects(mask.view(), 3);

        assert_eq!(n, 2);
        // The single pixel at (0,0) is gone
        assert_eq!(labels[[0, 0]], 0);
        assert_eq!(labels[[0, 3]], 1);
        assert_eq!(labels[[3, 0]], 2);

        let areas = component_areas(labels.view(), n);
        assert!(areas[1..].iter().all(|&a| a >= 3));
        for ((r, c), &label) in labels.indexed_iter() {
            assert_eq!(label > 0, mask[[r, c]] && (r, c) != (0, 0));
        }
    }

    #[test]
    fn test_remove_small_objects() {
        let mask = arr2(&[[true, false, true], [false, false, true]]);
        let cleaned = remove_small_objects(mask.view(), 2);
        assert_eq!(cleaned, arr2(&[[false, false, true], [false, false, true]]));
    }
}
