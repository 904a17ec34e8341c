//! Per-object measurements: centroid, area and an intensity percentile.

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::stack::{LabeledVolume, Stack};

/// One labeled object in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub frame: usize,
    /// Frame-local label the object was measured under
    pub label: u32,
    /// Centroid row
    pub y: f64,
    /// Centroid column
    pub x: f64,
    /// Pixel count
    pub area: usize,
    /// Intensity percentile over the object's pixels
    pub intensity: f64,
}

/// Detections of one frame, ordered by label.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: usize,
    pub records: Vec<ObjectRecord>,
}

impl FrameDetections {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Detections of every frame in a stack, in frame order.
///
/// Frames without objects keep an empty entry so frame indices stay dense.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionTable {
    frames: Vec<FrameDetections>,
}

impl DetectionTable {
    pub fn new(frames: Vec<FrameDetections>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[FrameDetections] {
        &self.frames
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Total detections over all frames.
    pub fn len(&self) -> usize {
        self.frames.iter().map(|f| f.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, frame by frame.
    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.frames.iter().flat_map(|f| f.records.iter())
    }

    /// Keep only detections with `area >= min_area`.
    pub fn filter_min_area(&self, min_area: usize) -> DetectionTable {
        let frames = self
            .frames
            .iter()
            .map(|f| FrameDetections {
                frame: f.frame,
                records: f
                    .records
                    .iter()
                    .filter(|r| r.area >= min_area)
                    .copied()
                    .collect(),
            })
            .collect();
        DetectionTable { frames }
    }

    /// Frame indices that have no detections.
    pub fn empty_frames(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter(|f| f.is_empty())
            .map(|f| f.frame)
            .collect()
    }
}

/// Percentile of `values` with linear interpolation between closest ranks.
///
/// `p` is in percent. The slice is sorted in place. Returns NaN when empty.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}

#[derive(Default)]
struct Accumulator {
    sum_row: f64,
    sum_col: f64,
    values: Vec<f64>,
}

/// Measures labeled objects against an intensity channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureExtractor {
    pub percentile: f64,
}

impl FeatureExtractor {
    pub fn new(percentile: f64) -> Self {
        Self { percentile }
    }

    /// Measure every positive label of one frame.
    ///
    /// Records are ordered by label. Labels between 1 and the frame's maximum
    /// that have no pixels produce no record.
    pub fn extract_frame(
        &self,
        labels: ArrayView2<u32>,
        intensity: ArrayView2<f64>,
        frame: usize,
    ) -> Result<FrameDetections, PipelineError> {
        if labels.dim() != intensity.dim() {
            return Err(PipelineError::Dimension(format!(
                "frame {frame}: labels {:?} and intensities {:?} differ in shape",
                labels.dim(),
                intensity.dim()
            )));
        }

        let max_label = labels.iter().copied().max().unwrap_or(0) as usize;
        let mut objects: Vec<Accumulator> =
            (0..=max_label).map(|_| Accumulator::default()).collect();

        for (((row, col), &label), &value) in labels.indexed_iter().zip(intensity.iter()) {
            if label == 0 {
                continue;
            }
            let acc = &mut objects[label as usize];
            acc.sum_row += row as f64;
            acc.sum_col += col as f64;
            acc.values.push(value);
        }

        let mut records = Vec::with_capacity(max_label);
        let mut missing = 0;
        for (label, acc) in objects.iter_mut().enumerate().skip(1) {
            let area = acc.values.len();
            if area == 0 {
                missing += 1;
                continue;
            }
            records.push(ObjectRecord {
                frame,
                label: label as u32,
                y: acc.sum_row / area as f64,
                x: acc.sum_col / area as f64,
                area,
                intensity: percentile(&mut acc.values, self.percentile),
            });
        }

        if missing > 0 {
            log::warn!(
                "Frame {frame}: {missing} of {max_label} labels have no pixels and were skipped"
            );
        }

        Ok(FrameDetections { frame, records })
    }

    /// Measure every frame of `labels` against `intensity`.
    pub fn extract(
        &self,
        labels: &LabeledVolume,
        intensity: &Stack,
    ) -> Result<DetectionTable, PipelineError> {
        intensity.ensure_same_shape(labels.dim(), "labeled volume")?;

        let frames = (0..labels.n_frames())
            .into_par_iter()
            .map(|k| self.extract_frame(labels.frame(k), intensity.frame(k), k))
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let table = DetectionTable::new(frames);
        log::debug!(
            "Measured {} objects over {} frames",
            table.len(),
            table.n_frames()
        );
        Ok(table)
    }
}
