//! Synthetic microscopy frames for tests and benchmarks.
//!
//! Everything here is deterministic: noise comes from a seeded ChaCha stream,
//! so a failing test reproduces bit for bit.
//!
//! # Scene Construction
//!
//! Frames are plain `ndarray::Array2<f64>` in `(row, col)` order. Cells are
//! rendered as flat disks or as cones peaking at their centre; the cone shape
//! gives the watershed a single maximum per cell.
//!
//! ```rust
//! use test_helpers::{add_gaussian_noise, disk_frame};
//!
//! let frame = disk_frame((64, 64), &[(32.0, 32.0)], 10.0, 200.0, 0.0);
//! let noisy = add_gaussian_noise(&frame, 2.0, 42);
//! assert_eq!(noisy.dim(), (64, 64));
//! ```

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Whether `(row, col)` lies inside the disk of `radius` around `center`.
///
/// The boundary is inclusive, so a radius-10 disk covers 317 pixels.
pub fn in_disk(row: usize, col: usize, center: (f64, f64), radius: f64) -> bool {
    let dy = row as f64 - center.0;
    let dx = col as f64 - center.1;
    dy * dy + dx * dx <= radius * radius
}

/// Union of disks of one radius as a boolean mask.
pub fn disk_mask(shape: (usize, usize), centers: &[(f64, f64)], radius: f64) -> Array2<bool> {
    Array2::from_shape_fn(shape, |(r, c)| {
        centers.iter().any(|&center| in_disk(r, c, center, radius))
    })
}

/// Flat disks of value `foreground` on a constant `background`.
pub fn disk_frame(
    shape: (usize, usize),
    centers: &[(f64, f64)],
    radius: f64,
    foreground: f64,
    background: f64,
) -> Array2<f64> {
    disk_mask(shape, centers, radius).mapv(|inside| if inside { foreground } else { background })
}

/// Disks whose intensity falls linearly from `peak` at the centre to zero at
/// the rim. Where disks overlap the brighter contribution wins.
pub fn cone_frame(
    shape: (usize, usize),
    centers: &[(f64, f64)],
    radius: f64,
    peak: f64,
) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(r, c)| {
        centers
            .iter()
            .map(|&(cy, cx)| {
                let d = ((r as f64 - cy).powi(2) + (c as f64 - cx).powi(2)).sqrt();
                if d <= radius {
                    peak * (1.0 - d / (radius + 1.0))
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    })
}

/// Independent normal samples, one per pixel.
pub fn seeded_normal_frame(shape: (usize, usize), mean: f64, std: f64, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(mean, std).expect("standard deviation must be finite and >= 0");
    Array2::from_shape_simple_fn(shape, || normal.sample(&mut rng))
}

/// `frame` plus zero-mean Gaussian read noise.
pub fn add_gaussian_noise(frame: &Array2<f64>, std: f64, seed: u64) -> Array2<f64> {
    frame + &seeded_normal_frame(frame.dim(), 0.0, std, seed)
}

/// A cell drifting along a straight line, one disk per frame.
///
/// Returns the disk centres so tests can compare against tracked positions.
pub fn drifting_disk_frames(
    shape: (usize, usize),
    start: (f64, f64),
    step: (f64, f64),
    n_frames: usize,
    radius: f64,
    foreground: f64,
) -> (Vec<Array2<f64>>, Vec<(f64, f64)>) {
    let centers: Vec<(f64, f64)> = (0..n_frames)
        .map(|t| (start.0 + step.0 * t as f64, start.1 + step.1 * t as f64))
        .collect();
    let frames = centers
        .iter()
        .map(|&center| disk_frame(shape, &[center], radius, foreground, 0.0))
        .collect();
    (frames, centers)
}
