//! Per-position pipeline and the experiment driver.
//!
//! A position is segmented once on its nuclear channel; the resulting label
//! volume is then measured, linked and tabulated against every reporter
//! channel. Positions share nothing and run in parallel.

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ChannelConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::features::{DetectionTable, FeatureExtractor};
use crate::image_proc::{ObjectLabeler, Segmentation, WatershedSegmenter};
use crate::intensity::IntensityTable;
use crate::io::{ResultSink, StackSource};
use crate::stack::{LabeledVolume, Stack};
use crate::tracking::{Tracker, TrajectoryTable};

/// Everything derived from one reporter channel at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResult {
    /// Raw per-frame measurements, before any area filter
    pub detections: DetectionTable,
    /// Linked and stub-filtered
    pub trajectories: TrajectoryTable,
    /// Trajectories passing the long-track filter
    pub long_trajectories: TrajectoryTable,
    pub intensities: IntensityTable,
    /// Frames with no detection left after the area filter
    pub empty_frames: Vec<usize>,
}

impl ChannelResult {
    /// The empty frames as recoverable errors.
    pub fn empty_detections(&self) -> Vec<PipelineError> {
        self.empty_frames
            .iter()
            .map(|&frame| PipelineError::EmptyDetection { frame })
            .collect()
    }
}

/// Per-channel counts reported for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub label: String,
    pub detections: usize,
    pub particles: usize,
    pub long_particles: usize,
    pub empty_frames: Vec<usize>,
}

/// Outcome of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionReport {
    pub position: usize,
    pub frames: usize,
    /// Watershed markers per frame
    pub markers: Vec<u32>,
    pub channels: Vec<ChannelSummary>,
}

/// All stages of the pipeline, configured once.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPipeline {
    pub labeler: ObjectLabeler,
    pub segmenter: WatershedSegmenter,
    pub extractor: FeatureExtractor,
    pub tracker: Tracker,
}

impl PositionPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            labeler: ObjectLabeler::from_config(&config.mask, &config.labeling),
            segmenter: WatershedSegmenter::from_config(&config.watershed),
            extractor: FeatureExtractor::new(config.features.percentile),
            tracker: Tracker::from_config(&config.tracking),
        })
    }

    /// Label the nuclear stack and split touching cells.
    pub fn segment(&self, nuclear: &Stack) -> Result<Segmentation, PipelineError> {
        let masks = self.labeler.label_stack(nuclear)?;
        self.segmenter.segment(nuclear, &masks)
    }

    /// Measure, link and tabulate one reporter channel.
    pub fn analyze_channel(
        &self,
        labels: &LabeledVolume,
        intensity: &Stack,
    ) -> Result<ChannelResult, PipelineError> {
        let detections = self.extractor.extract(labels, intensity)?;

        let empty_frames = detections
            .filter_min_area(self.tracker.min_area)
            .empty_frames();
        for &frame in &empty_frames {
            log::warn!("{}", PipelineError::EmptyDetection { frame });
        }

        let trajectories = self.tracker.track(&detections);
        let long_trajectories = self.tracker.long_trajectories(&trajectories);
        let intensities = IntensityTable::build(&long_trajectories);

        Ok(ChannelResult {
            detections,
            trajectories,
            long_trajectories,
            intensities,
            empty_frames,
        })
    }

    /// Run one position end to end, persisting every reporter's tables.
    ///
    /// Reading, shape checks and analysis of all reporters finish before the
    /// first table is written, so a stage failure leaves no output behind. A
    /// failing write can still leave earlier reporters' files in place.
    pub fn run_position(
        &self,
        source: &dyn StackSource,
        channels: &ChannelConfig,
        position: usize,
        sink: &dyn ResultSink,
    ) -> Result<PositionReport, PipelineError> {
        let nuclear = source.read_stack(&channels.nuclear, position)?;
        let reporters = channels
            .reporters
            .iter()
            .map(|reporter| {
                let stack = source.read_stack(&reporter.name, position)?;
                nuclear.ensure_same_shape(stack.dim(), &format!("channel {}", reporter.name))?;
                Ok::<_, PipelineError>((reporter, stack))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let (rows, cols, frames) = nuclear.dim();
        log::info!("Position {position}: segmenting {frames} frames of {rows}x{cols}");
        let segmentation = self.segment(&nuclear)?;

        let results = reporters
            .iter()
            .map(|(reporter, stack)| {
                let result = self.analyze_channel(&segmentation.labels, stack)?;
                Ok::<_, PipelineError>((*reporter, result))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let mut summaries = Vec::with_capacity(results.len());
        for (reporter, result) in results {
            sink.write_trajectories(&reporter.label, position, &result.trajectories)?;
            sink.write_intensities(&reporter.label, position, &result.intensities)?;

            let summary = ChannelSummary {
                label: reporter.label.clone(),
                detections: result.detections.len(),
                particles: result.trajectories.particles().len(),
                long_particles: result.long_trajectories.particles().len(),
                empty_frames: result.empty_frames,
            };
            log::info!(
                "Position {}: {} has {} particles, {} long",
                position,
                summary.label,
                summary.particles,
                summary.long_particles
            );
            summaries.push(summary);
        }

        Ok(PositionReport {
            position,
            frames,
            markers: segmentation.markers,
            channels: summaries,
        })
    }
}

/// Result of one position within an experiment.
#[derive(Debug)]
pub struct PositionOutcome {
    pub position: usize,
    pub result: Result<PositionReport, PipelineError>,
}

/// Run every position the source offers, in parallel.
///
/// A failing position is logged and reported; it does not stop the others.
/// `on_done` is called once per finished position.
pub fn run_experiment(
    config: &PipelineConfig,
    source: &dyn StackSource,
    sink: &dyn ResultSink,
    on_done: impl Fn(&PositionOutcome) + Sync,
) -> Result<Vec<PositionOutcome>, PipelineError> {
    let pipeline = PositionPipeline::new(config)?;
    let positions = source.positions()?;
    if positions.is_empty() {
        return Err(PipelineError::EmptyStack(
            "source has no positions".to_string(),
        ));
    }
    log::info!("Processing {} positions", positions.len());

    let outcomes: Vec<PositionOutcome> = positions
        .par_iter()
        .map(|&position| {
            let result = pipeline.run_position(source, &config.channels, position, sink);
            if let Err(e) = &result {
                log::warn!("Position {position} skipped: {e}");
            }
            let outcome = PositionOutcome { position, result };
            on_done(&outcome);
            outcome
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    log::info!(
        "Finished {} positions, {} failed",
        outcomes.len(),
        failed
    );
    Ok(outcomes)
}
