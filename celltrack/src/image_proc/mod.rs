//! Image processing stages that turn raw frames into labeled objects.

pub mod distance;
pub mod gaussian;
pub mod labeling;
pub mod mask;
pub mod morphology;
pub mod peaks;
pub mod thresholding;
pub mod watershed;
pub mod wavelet;

pub use labeling::ObjectLabeler;
pub use mask::MaskBuilder;
pub use watershed::{Segmentation, WatershedSegmenter};
pub use wavelet::{SpectralFilter, WaveletKernel};
