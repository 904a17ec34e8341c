//! Foreground mask construction: wavelet band-pass, local threshold, erosion.

use ndarray::ArrayView2;

use crate::config::MaskConfig;
use crate::error::PipelineError;
use crate::image_proc::morphology::binary_erosion;
use crate::image_proc::thresholding::{apply_threshold, threshold_local, ThresholdMethod};
use crate::image_proc::wavelet::SpectralFilter;
use crate::stack::Mask;

/// Builds a binary cell mask from one raw frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskBuilder {
    pub filter: SpectralFilter,
    pub block_size: usize,
    pub method: ThresholdMethod,
    pub offset: f64,
    pub erosion_radius: usize,
}

impl MaskBuilder {
    pub fn from_config(config: &MaskConfig) -> Self {
        Self {
            filter: SpectralFilter::new(config.kernel, config.levels, config.keep_bands.clone()),
            block_size: config.block_size,
            method: config.threshold_method,
            offset: config.threshold_offset,
            erosion_radius: config.erosion_radius,
        }
    }

    /// Mask of `image`, same shape.
    ///
    /// The band-passed frame is compared against its own local threshold;
    /// the raw intensities play no further part after filtering.
    pub fn segment(&self, image: ArrayView2<f64>) -> Result<Mask, PipelineError> {
        let filtered = self.filter.transform(image)?;
        let thresholds =
            threshold_local(filtered.view(), self.block_size, self.method, self.offset)?;
        let mask = apply_threshold(filtered.view(), thresholds.view());
        Ok(binary_erosion(mask.view(), self.erosion_radius))
    }
}
