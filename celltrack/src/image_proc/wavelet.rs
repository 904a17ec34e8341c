//! Multi-level 2D discrete wavelet transform used as a band-pass denoiser.
//!
//! The transform is orthonormal with periodic extension, so reconstruction is
//! exact (to floating point precision) for any frame whose sides are divisible
//! by `2^levels`. Sub-bands are addressed with the same numbering used to
//! configure the pipeline:
//!
//! - band `1` is the finest detail level,
//! - band `levels` is the coarsest detail level,
//! - band `levels + 1` is the approximation.
//!
//! Zeroing the finest bands removes pixel noise; zeroing the coarsest bands and
//! the approximation removes slowly varying illumination.

use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

const HAAR: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB2: [f64; 4] = [
    0.48296291314469025,
    0.836516303737469,
    0.22414386804185735,
    -0.12940952255092145,
];

const DB3: [f64; 6] = [
    0.3326705529509569,
    0.8068915093133388,
    0.4598775021193313,
    -0.13501102001039084,
    -0.08544127388224149,
    0.035226291882100656,
];

const DB4: [f64; 8] = [
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

/// Orthonormal wavelet families available to the spectral filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveletKernel {
    Haar,
    Db2,
    Db3,
    Db4,
}

impl WaveletKernel {
    /// Scaling (low-pass) filter taps.
    pub fn low_pass(&self) -> &'static [f64] {
        match self {
            WaveletKernel::Haar => &HAAR,
            WaveletKernel::Db2 => &DB2,
            WaveletKernel::Db3 => &DB3,
            WaveletKernel::Db4 => &DB4,
        }
    }

    /// Wavelet (high-pass) filter taps, the quadrature mirror of [`Self::low_pass`].
    pub fn high_pass(&self) -> Vec<f64> {
        let lo = self.low_pass();
        let n = lo.len();
        (0..n)
            .map(|j| {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                sign * lo[n - 1 - j]
            })
            .collect()
    }

    pub fn filter_len(&self) -> usize {
        self.low_pass().len()
    }

    /// Deepest decomposition that is both meaningful for this filter length and
    /// exactly invertible for a `rows x cols` frame. Returns 0 if none is.
    pub fn max_level(&self, rows: usize, cols: usize) -> usize {
        let shortest = rows.min(cols);
        let support = (self.filter_len() - 1).max(1);
        if shortest < support {
            return 0;
        }
        let mut level = ((shortest / support) as f64).log2().floor() as usize;
        while level > 0 && !divisible_by_pow2(rows, cols, level) {
            level -= 1;
        }
        level
    }
}

impl FromStr for WaveletKernel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haar" | "db1" => Ok(WaveletKernel::Haar),
            "db2" => Ok(WaveletKernel::Db2),
            "db3" => Ok(WaveletKernel::Db3),
            "db4" => Ok(WaveletKernel::Db4),
            other => Err(PipelineError::UnknownKernel(other.to_string())),
        }
    }
}

impl fmt::Display for WaveletKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveletKernel::Haar => write!(f, "haar"),
            WaveletKernel::Db2 => write!(f, "db2"),
            WaveletKernel::Db3 => write!(f, "db3"),
            WaveletKernel::Db4 => write!(f, "db4"),
        }
    }
}

fn divisible_by_pow2(rows: usize, cols: usize, level: usize) -> bool {
    let step = 1usize << level;
    rows % step == 0 && cols % step == 0
}

/// The three oriented detail bands of one decomposition level.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBands {
    pub horizontal: Array2<f64>,
    pub vertical: Array2<f64>,
    pub diagonal: Array2<f64>,
}

impl DetailBands {
    fn zero(&mut self) {
        self.horizontal.fill(0.0);
        self.vertical.fill(0.0);
        self.diagonal.fill(0.0);
    }
}

/// Wavelet decomposition of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletPyramid {
    kernel: WaveletKernel,
    /// Coarsest low-pass band.
    pub approximation: Array2<f64>,
    /// Detail bands ordered coarsest first.
    pub details: Vec<DetailBands>,
}

impl WaveletPyramid {
    /// Decompose `image` into `levels` detail levels plus an approximation.
    pub fn decompose(
        image: ArrayView2<f64>,
        kernel: WaveletKernel,
        levels: usize,
    ) -> Result<Self, PipelineError> {
        let (rows, cols) = image.dim();
        if levels == 0 {
            return Err(PipelineError::Dimension(
                "wavelet decomposition needs at least one level".to_string(),
            ));
        }
        if !divisible_by_pow2(rows, cols, levels) {
            return Err(PipelineError::Dimension(format!(
                "{rows}x{cols} frame cannot be decomposed to {levels} levels: \
                 both sides must be divisible by {}",
                1usize << levels
            )));
        }

        let lo = kernel.low_pass();
        let hi = kernel.high_pass();

        let mut current = image.to_owned();
        let mut finest_first = Vec::with_capacity(levels);
        for _ in 0..levels {
            let (low, high) = analyze(current.view(), Axis(1), lo, &hi);
            let (approx, horizontal) = analyze(low.view(), Axis(0), lo, &hi);
            let (vertical, diagonal) = analyze(high.view(), Axis(0), lo, &hi);
            finest_first.push(DetailBands {
                horizontal,
                vertical,
                diagonal,
            });
            current = approx;
        }
        finest_first.reverse();

        Ok(Self {
            kernel,
            approximation: current,
            details: finest_first,
        })
    }

    pub fn levels(&self) -> usize {
        self.details.len()
    }

    /// Band number of the approximation (`levels + 1`).
    pub fn approximation_band(&self) -> usize {
        self.levels() + 1
    }

    /// Zero every band whose number is not listed in `keep`.
    pub fn retain_bands(&mut self, keep: &[usize]) {
        let levels = self.levels();
        for (i, bands) in self.details.iter_mut().enumerate() {
            let band = levels - i;
            if !keep.contains(&band) {
                bands.zero();
            }
        }
        if !keep.contains(&(levels + 1)) {
            self.approximation.fill(0.0);
        }
    }

    /// Inverse transform back to image space.
    pub fn reconstruct(&self) -> Array2<f64> {
        let lo = self.kernel.low_pass();
        let hi = self.kernel.high_pass();

        let mut current = self.approximation.clone();
        for bands in &self.details {
            let low = synthesize(current.view(), bands.horizontal.view(), Axis(0), lo, &hi);
            let high = synthesize(
                bands.vertical.view(),
                bands.diagonal.view(),
                Axis(0),
                lo,
                &hi,
            );
            current = synthesize(low.view(), high.view(), Axis(1), lo, &hi);
        }
        current
    }
}

/// Single-level analysis along one axis: returns (low-pass, high-pass) halves.
fn analyze(
    input: ArrayView2<f64>,
    axis: Axis,
    lo: &[f64],
    hi: &[f64],
) -> (Array2<f64>, Array2<f64>) {
    let n = input.len_of(axis);
    let half = n / 2;
    let mut shape = input.raw_dim();
    shape[axis.index()] = half;
    let mut low = Array2::zeros(shape);
    let mut high = Array2::zeros(shape);

    Zip::from(input.lanes(axis))
        .and(low.lanes_mut(axis))
        .and(high.lanes_mut(axis))
        .for_each(|x, mut a, mut d| {
            for k in 0..half {
                let mut sum_lo = 0.0;
                let mut sum_hi = 0.0;
                for (j, (&l, &h)) in lo.iter().zip(hi).enumerate() {
                    let sample = x[(2 * k + j) % n];
                    sum_lo += l * sample;
                    sum_hi += h * sample;
                }
                a[k] = sum_lo;
                d[k] = sum_hi;
            }
        });

    (low, high)
}

/// Single-level synthesis along one axis, the transpose of [`analyze`].
fn synthesize(
    low: ArrayView2<f64>,
    high: ArrayView2<f64>,
    axis: Axis,
    lo: &[f64],
    hi: &[f64],
) -> Array2<f64> {
    let half = low.len_of(axis);
    let n = half * 2;
    let mut shape = low.raw_dim();
    shape[axis.index()] = n;
    let mut output = Array2::zeros(shape);

    Zip::from(output.lanes_mut(axis))
        .and(low.lanes(axis))
        .and(high.lanes(axis))
        .for_each(|mut x, a, d| {
            for k in 0..half {
                for (j, (&l, &h)) in lo.iter().zip(hi).enumerate() {
                    x[(2 * k + j) % n] += l * a[k] + h * d[k];
                }
            }
        });

    output
}

/// Band-pass filter built on [`WaveletPyramid`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFilter {
    pub kernel: WaveletKernel,
    /// Decomposition depth; `None` picks [`WaveletKernel::max_level`].
    pub levels: Option<usize>,
    /// Band numbers that survive reconstruction.
    pub keep_bands: Vec<usize>,
}

impl SpectralFilter {
    pub fn new(kernel: WaveletKernel, levels: Option<usize>, keep_bands: Vec<usize>) -> Self {
        Self {
            kernel,
            levels,
            keep_bands,
        }
    }

    /// Every band of a `levels`-deep decomposition, approximation included.
    pub fn all_bands(levels: usize) -> Vec<usize> {
        (1..=levels + 1).collect()
    }

    /// Decomposition depth used for a `rows x cols` frame.
    pub fn resolve_levels(&self, rows: usize, cols: usize) -> Result<usize, PipelineError> {
        match self.levels {
            Some(levels) => Ok(levels),
            None => match self.kernel.max_level(rows, cols) {
                0 => Err(PipelineError::Dimension(format!(
                    "{rows}x{cols} frame is too small or has odd sides for a {} decomposition",
                    self.kernel
                ))),
                levels => Ok(levels),
            },
        }
    }

    /// Decompose, zero the bands not kept, and reconstruct.
    pub fn transform(&self, image: ArrayView2<f64>) -> Result<Array2<f64>, PipelineError> {
        let (rows, cols) = image.dim();
        let levels = self.resolve_levels(rows, cols)?;

        let mut pyramid = WaveletPyramid::decompose(image, self.kernel, levels)?;
        if let Some(band) = self.keep_bands.iter().find(|&&b| b == 0 || b > levels + 1) {
            log::debug!(
                "Band {} does not exist in a {}-level decomposition, ignoring",
                band,
                levels
            );
        }
        pyramid.retain_bands(&self.keep_bands);
        Ok(pyramid.reconstruct())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_helpers::seeded_normal_frame;

    #[test]
    fn test_filters_are_orthonormal() {
        for kernel in [
            WaveletKernel::Haar,
            WaveletKernel::Db2,
            WaveletKernel::Db3,
            WaveletKernel::Db4,
        ] {
            let lo = kernel.low_pass();
            let sum: f64 = lo.iter().sum();
            let energy: f64 = lo.iter().map(|v| v * v).sum();
            assert_abs_diff_eq!(sum, std::f64::consts::SQRT_2, epsilon = 1e-10);
            assert_abs_diff_eq!(energy, 1.0, epsilon = 1e-10);

            let hi = kernel.high_pass();
            let cross: f64 = lo.iter().zip(&hi).map(|(a, b)| a * b).sum();
            assert_abs_diff_eq!(cross, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_full_band_list_is_identity() {
        let image = seeded_normal_frame((64, 48), 100.0, 20.0, 7);
        for kernel in [WaveletKernel::Haar, WaveletKernel::Db2, WaveletKernel::Db4] {
            let filter = SpectralFilter::new(kernel, Some(3), SpectralFilter::all_bands(3));
            let out = filter.transform(image.view()).unwrap();
            assert_eq!(out.dim(), image.dim());
            for (a, b) in out.iter().zip(image.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_keeping_nothing_gives_zero_image() {
        let image = seeded_normal_frame((32, 32), 50.0, 5.0, 11);
        let filter = SpectralFilter::new(WaveletKernel::Db2, Some(2), vec![]);
        let out = filter.transform(image.view()).unwrap();
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_approximation_only_keeps_the_mean() {
        // A constant image lives entirely in the approximation band.
        let image = Array2::from_elem((16, 16), 42.0);
        let pyramid = WaveletPyramid::decompose(image.view(), WaveletKernel::Db3, 2).unwrap();
        for bands in &pyramid.details {
            assert!(bands.horizontal.iter().all(|v| v.abs() < 1e-9));
            assert!(bands.vertical.iter().all(|v| v.abs() < 1e-9));
            assert!(bands.diagonal.iter().all(|v| v.abs() < 1e-9));
        }

        let filter = SpectralFilter::new(WaveletKernel::Db3, Some(2), vec![3]);
        let out = filter.transform(image.view()).unwrap();
        for v in out.iter() {
            assert_abs_diff_eq!(*v, 42.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_band_shapes_halve_per_level() {
        let image = Array2::<f64>::zeros((64, 32));
        let pyramid = WaveletPyramid::decompose(image.view(), WaveletKernel::Haar, 3).unwrap();
        assert_eq!(pyramid.levels(), 3);
        assert_eq!(pyramid.approximation.dim(), (8, 4));
        assert_eq!(pyramid.details[0].diagonal.dim(), (8, 4));
        assert_eq!(pyramid.details[2].diagonal.dim(), (32, 16));
        assert_eq!(pyramid.approximation_band(), 4);
    }

    #[test]
    fn test_incompatible_dimensions_fail() {
        let image = Array2::<f64>::zeros((30, 32));
        let filter = SpectralFilter::new(WaveletKernel::Db2, Some(2), vec![1, 2, 3]);
        assert!(matches!(
            filter.transform(image.view()),
            Err(PipelineError::Dimension(_))
        ));

        let odd = Array2::<f64>::zeros((31, 33));
        let auto = SpectralFilter::new(WaveletKernel::Haar, None, vec![1]);
        assert!(matches!(
            auto.transform(odd.view()),
            Err(PipelineError::Dimension(_))
        ));
    }

    #[test]
    fn test_max_level_respects_filter_length_and_divisibility() {
        assert_eq!(WaveletKernel::Haar.max_level(64, 64), 6);
        assert_eq!(WaveletKernel::Db4.max_level(2048, 2048), 8);
        // 96 = 32 * 3: log2(96 / 7) = 3.77 -> 3, and 96 is divisible by 8
        assert_eq!(WaveletKernel::Db4.max_level(96, 96), 3);
        // 100 = 4 * 25 caps the depth at 2
        assert_eq!(WaveletKernel::Haar.max_level(100, 128), 2);
        assert_eq!(WaveletKernel::Db4.max_level(5, 5), 0);
    }

    #[test]
    fn test_kernel_names_round_trip() {
        for name in ["haar", "db2", "db3", "db4"] {
            let kernel: WaveletKernel = name.parse().unwrap();
            assert_eq!(kernel.to_string(), name);
        }
        assert_eq!("DB1".parse::<WaveletKernel>().unwrap(), WaveletKernel::Haar);
        assert!(matches!(
            "coif11".parse::<WaveletKernel>(),
            Err(PipelineError::UnknownKernel(_))
        ));
    }
}
