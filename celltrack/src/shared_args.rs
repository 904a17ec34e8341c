use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::image_proc::wavelet::WaveletKernel;
use clap::Parser;
use std::path::PathBuf;

/// Parse a band list in format "3,4,5"
fn parse_bands(s: &str) -> Result<Vec<usize>, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid band number: '{}'", part.trim()))
        })
        .collect()
}

/// Comma-separated wavelet band list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandList(pub Vec<usize>);

impl std::str::FromStr for BandList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bands(s).map(BandList)
    }
}

/// Pipeline configuration arguments shared by the binaries
///
/// Values given here override the JSON config file, which in turn overrides
/// the built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
pub struct SharedPipelineArgs {
    /// JSON pipeline configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Wavelet bands kept before thresholding (e.g. "3,4,5")
    #[arg(long)]
    pub keep_bands: Option<BandList>,

    /// Wavelet kernel (haar, db2, db3, db4)
    #[arg(long)]
    pub kernel: Option<WaveletKernel>,

    /// Disk radius used to erode the mask, in pixels
    #[arg(long)]
    pub erosion_radius: Option<usize>,

    /// Gaussian sigma applied before watershed marker detection
    #[arg(long)]
    pub blur_sigma: Option<f64>,

    /// Largest frame-to-frame displacement the linker accepts, in pixels
    #[arg(long)]
    pub max_displacement: Option<f64>,

    /// Frames a cell may be missing and keep its identity
    #[arg(long)]
    pub memory: Option<usize>,

    /// Intensity tables only keep trajectories longer than this many frames
    #[arg(long)]
    pub long_min_frames: Option<usize>,
}

impl SharedPipelineArgs {
    /// Build the effective configuration and validate it.
    pub fn resolve_config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => {
                log::info!("Loading pipeline configuration from {}", path.display());
                PipelineConfig::load(path)?
            }
            None => PipelineConfig::default(),
        };

        if let Some(BandList(bands)) = &self.keep_bands {
            config.mask.keep_bands = bands.clone();
        }
        if let Some(kernel) = self.kernel {
            config.mask.kernel = kernel;
        }
        if let Some(radius) = self.erosion_radius {
            config.mask.erosion_radius = radius;
        }
        if let Some(sigma) = self.blur_sigma {
            config.watershed.blur_sigma = sigma;
        }
        if let Some(displacement) = self.max_displacement {
            config.tracking.max_displacement = displacement;
        }
        if let Some(memory) = self.memory {
            config.tracking.memory = memory;
        }
        if let Some(frames) = self.long_min_frames {
            config.tracking.long_min_frames = frames;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bands() {
        assert_eq!(parse_bands("3,4,5").unwrap(), vec![3, 4, 5]);
        assert_eq!(parse_bands(" 1 , 2").unwrap(), vec![1, 2]);
        assert!(parse_bands("3,x").is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let args = SharedPipelineArgs::parse_from([
            "celltrack",
            "--kernel",
            "db2",
            "--keep-bands",
            "2,3",
            "--memory",
            "4",
            "--max-displacement",
            "25.5",
        ]);
        let config = args.resolve_config().unwrap();

        assert_eq!(config.mask.kernel, WaveletKernel::Db2);
        assert_eq!(config.mask.keep_bands, vec![2, 3]);
        assert_eq!(config.tracking.memory, 4);
        assert_eq!(config.tracking.max_displacement, 25.5);
        // Untouched values keep their defaults
        assert_eq!(config.tracking.long_min_frames, 35);
        assert_eq!(config.mask.erosion_radius, 6);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = SharedPipelineArgs {
            max_displacement: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            args.resolve_config(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_kernel_fails_to_parse() {
        assert!(SharedPipelineArgs::try_parse_from(["celltrack", "--kernel", "coif11"]).is_err());
    }
}
