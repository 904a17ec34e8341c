//! Segmentation and tracking of cells in time-lapse microscopy.
//!
//! The nuclear channel of each position is band-pass filtered with a wavelet
//! transform, thresholded against its local neighbourhood, eroded and
//! labeled; touching cells are then split with a distance-transform
//! watershed. Every labeled object is measured against each reporter channel,
//! linked across frames into particles, and the long-lived particles are
//! pivoted into particle x frame intensity tables.
//!
//! All volumes use one layout, `(row, col, frame)`; see [`stack`].

pub mod config;
pub mod error;
pub mod features;
pub mod image_proc;
pub mod intensity;
pub mod io;
pub mod pipeline;
pub mod shared_args;
pub mod stack;
pub mod tracking;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use features::{DetectionTable, FeatureExtractor, ObjectRecord};
pub use intensity::IntensityTable;
pub use pipeline::{run_experiment, PositionPipeline, PositionReport};
pub use stack::{LabeledImage, LabeledVolume, Mask, Stack};
pub use tracking::{Linker, Tracker, TrajectoryTable};
