//! Separable smoothing filters with reflecting borders.
//!
//! Borders are handled by half-sample reflection (`d c b a | a b c d | d c b a`),
//! which keeps flat regions flat right up to the frame edge.

use ndarray::{Array2, ArrayView2, Axis, Zip};

/// Kernel half-width as a multiple of sigma.
pub const TRUNCATE: f64 = 4.0;

/// Normalized 1D Gaussian kernel of radius `round(TRUNCATE * sigma)`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= total);
    kernel
}

/// Map a possibly out-of-range index onto `0..n` by mirror reflection.
pub(crate) fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

/// Correlate every lane along `axis` with a centered, odd-length kernel.
fn correlate_axis(image: ArrayView2<f64>, axis: Axis, kernel: &[f64]) -> Array2<f64> {
    let n = image.len_of(axis);
    let radius = kernel.len() / 2;
    let mut output = Array2::zeros(image.raw_dim());
    let mut padded = vec![0.0; n + 2 * radius];

    Zip::from(output.lanes_mut(axis))
        .and(image.lanes(axis))
        .for_each(|mut out, lane| {
            for (p, slot) in padded.iter_mut().enumerate() {
                *slot = lane[reflect_index(p as isize - radius as isize, n)];
            }
            for i in 0..n {
                out[i] = kernel
                    .iter()
                    .zip(&padded[i..i + kernel.len()])
                    .map(|(w, v)| w * v)
                    .sum();
            }
        });

    output
}

/// Gaussian blur with standard deviation `sigma` (pixels).
///
/// `sigma <= 0` returns an unmodified copy.
pub fn gaussian_filter(image: ArrayView2<f64>, sigma: f64) -> Array2<f64> {
    if sigma <= 0.0 {
        return image.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let rows_done = correlate_axis(image, Axis(0), &kernel);
    correlate_axis(rows_done.view(), Axis(1), &kernel)
}

/// Box-filter local mean over a `size x size` window.
pub fn uniform_filter(image: ArrayView2<f64>, size: usize) -> Array2<f64> {
    if size <= 1 {
        return image.to_owned();
    }
    let kernel = vec![1.0 / size as f64; size];
    let rows_done = correlate_axis(image, Axis(0), &kernel);
    correlate_axis(rows_done.view(), Axis(1), &kernel)
}
