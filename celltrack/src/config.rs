//! Pipeline configuration.
//!
//! Every tunable of every stage lives here and is passed explicitly into the
//! stage that needs it. `Default` reproduces the reference imaging setup.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PipelineError;
use crate::image_proc::thresholding::ThresholdMethod;
use crate::image_proc::wavelet::WaveletKernel;

/// Wavelet band-pass, local threshold and erosion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Wavelet bands kept before reconstruction (1 = finest detail)
    pub keep_bands: Vec<usize>,
    /// Wavelet family
    pub kernel: WaveletKernel,
    /// Decomposition depth; `None` uses the deepest level the frame allows
    pub levels: Option<usize>,
    /// Local threshold neighbourhood (odd, larger than a cell)
    pub block_size: usize,
    pub threshold_method: ThresholdMethod,
    /// Subtracted from the local mean before comparison
    pub threshold_offset: f64,
    /// Disk radius for the post-threshold erosion
    pub erosion_radius: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            keep_bands: vec![3, 4, 5],
            kernel: WaveletKernel::Db4,
            levels: None,
            block_size: 311,
            threshold_method: ThresholdMethod::Gaussian,
            threshold_offset: 0.0,
            erosion_radius: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Mask components smaller than this many pixels are discarded
    pub min_object_size: usize,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            min_object_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatershedConfig {
    /// Gaussian sigma applied to the raw frame before marker detection
    pub blur_sigma: f64,
    /// Minimum separation between markers, in pixels
    pub min_peak_distance: usize,
    /// Ignore maxima closer than `min_peak_distance` to the frame edge
    pub exclude_border: bool,
}

impl Default for WatershedConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 9.0,
            min_peak_distance: 5,
            exclude_border: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Percentile of in-object intensities reported per object
    pub percentile: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { percentile: 90.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Detections with a smaller area are dropped before linking
    pub min_area: usize,
    /// Largest frame-to-frame displacement that can be linked (pixels)
    pub max_displacement: f64,
    /// Frames a particle may go undetected and still keep its identity
    pub memory: usize,
    /// Trajectories with fewer frames than this are discarded
    pub stub_min_frames: usize,
    /// Intensity tables only keep trajectories longer than this
    pub long_min_frames: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_area: 100,
            max_displacement: 50.0,
            memory: 8,
            stub_min_frames: 5,
            long_min_frames: 35,
        }
    }
}

/// A non-nuclear channel whose intensities are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterChannel {
    /// Channel name as known to the image source
    pub name: String,
    /// Short label used in output file names
    pub label: String,
}

impl ReporterChannel {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel used for segmentation
    pub nuclear: String,
    pub reporters: Vec<ReporterChannel>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            nuclear: "DeepBlue".to_string(),
            reporters: vec![
                ReporterChannel::new("Cyan", "viral"),
                ReporterChannel::new("FarRed", "death"),
            ],
        }
    }
}

/// Complete configuration for one experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mask: MaskConfig,
    pub labeling: LabelingConfig,
    pub watershed: WatershedConfig,
    pub features: FeatureConfig,
    pub tracking: TrackingConfig,
    pub channels: ChannelConfig,
}

impl PipelineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.mask.block_size % 2 == 0 {
            return invalid(format!(
                "mask.block_size must be odd, got {}",
                self.mask.block_size
            ));
        }
        if self.mask.levels == Some(0) {
            return invalid("mask.levels must be at least 1".to_string());
        }
        if !self.watershed.blur_sigma.is_finite() || self.watershed.blur_sigma < 0.0 {
            return invalid(format!(
                "watershed.blur_sigma must be a non-negative number, got {}",
                self.watershed.blur_sigma
            ));
        }
        if self.watershed.min_peak_distance == 0 {
            return invalid("watershed.min_peak_distance must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.features.percentile) {
            return invalid(format!(
                "features.percentile must lie in [0, 100], got {}",
                self.features.percentile
            ));
        }
        if !(self.tracking.max_displacement > 0.0) {
            return invalid(format!(
                "tracking.max_displacement must be positive, got {}",
                self.tracking.max_displacement
            ));
        }
        if self.channels.reporters.is_empty() {
            return invalid("channels.reporters must name at least one channel".to_string());
        }
        Ok(())
    }
}
