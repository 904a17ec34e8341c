//! Local-maxima detection for watershed markers.

use ndarray::{Array2, ArrayView2, Axis, Zip};

use crate::image_proc::thresholding::connected_components;
use crate::stack::LabeledImage;

/// Sliding-window maximum over a `size x size` window, clamping at the borders.
pub fn maximum_filter(image: ArrayView2<f64>, size: usize) -> Array2<f64> {
    if size <= 1 {
        return image.to_owned();
    }
    let rows_done = max_along(image, Axis(0), size / 2);
    max_along(rows_done.view(), Axis(1), size / 2)
}

fn max_along(image: ArrayView2<f64>, axis: Axis, radius: usize) -> Array2<f64> {
    let n = image.len_of(axis);
    let mut output = Array2::zeros(image.raw_dim());
    Zip::from(output.lanes_mut(axis))
        .and(image.lanes(axis))
        .for_each(|mut out, lane| {
            for i in 0..n {
                let lo = i.saturating_sub(radius);
                let hi = (i + radius).min(n - 1);
                out[i] = (lo..=hi).map(|j| lane[j]).fold(f64::NEG_INFINITY, f64::max);
            }
        });
    output
}

/// Coordinates `(row, col)` of local maxima at least `min_distance` apart.
///
/// A pixel is a candidate when it equals the maximum of its
/// `(2 * min_distance + 1)²` neighbourhood and is strictly brighter than the
/// image minimum, so flat images have no peaks. Candidates are accepted
/// brightest first (raster order among equals); every remaining candidate
/// within Chebyshev distance `min_distance` of an accepted peak is dropped.
///
/// With `exclude_border`, peaks closer than `min_distance` to the frame edge
/// are ignored.
///
/// Returned peaks are in acceptance order.
pub fn peak_local_max(
    image: ArrayView2<f64>,
    min_distance: usize,
    exclude_border: bool,
) -> Vec<(usize, usize)> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let floor = image.iter().copied().fold(f64::INFINITY, f64::min);
    let local_max = maximum_filter(image, 2 * min_distance + 1);
    let border = if exclude_border { min_distance } else { 0 };

    let mut candidates: Vec<(usize, usize)> = image
        .indexed_iter()
        .filter(|&((r, c), &v)| {
            r >= border
                && c >= border
                && r + border < rows
                && c + border < cols
                && v > floor
                && v == local_max[[r, c]]
        })
        .map(|(idx, _)| idx)
        .collect();

    // Stable sort keeps raster order among equal intensities
    candidates.sort_by(|a, b| image[*b].total_cmp(&image[*a]));

    let mut accepted: Vec<(usize, usize)> = Vec::new();
    for (r, c) in candidates {
        let suppressed = accepted
            .iter()
            .any(|&(pr, pc)| r.abs_diff(pr).max(c.abs_diff(pc)) <= min_distance);
        if !suppressed {
            accepted.push((r, c));
        }
    }
    accepted
}

/// Turn peak coordinates into a marker image.
///
/// Touching peaks merge into one marker. Markers are numbered `1..=n` in
/// raster order of their first pixel.
pub fn label_markers(shape: (usize, usize), peaks: &[(usize, usize)]) -> (LabeledImage, u32) {
    let mut seeds = Array2::from_elem(shape, false);
    for &(r, c) in peaks {
        seeds[[r, c]] = true;
    }
    connected_components(seeds.view())
}
