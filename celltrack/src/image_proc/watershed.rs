//! Marker-controlled watershed for splitting touching cells.
//!
//! Markers come from local maxima of the Gaussian-blurred raw frame. They
//! flood the negated distance transform of the frame's mask, so basins meet
//! along the valleys between touching round objects.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::config::WatershedConfig;
use crate::error::PipelineError;
use crate::image_proc::distance::distance_transform;
use crate::image_proc::gaussian::gaussian_filter;
use crate::image_proc::peaks::{label_markers, peak_local_max};
use crate::image_proc::thresholding::NEIGHBORS_8;
use crate::stack::{LabeledImage, LabeledVolume, Stack};

/// Pixel waiting to be flooded. Lower surface values pop first, then
/// earlier insertions.
#[derive(Debug, Clone, Copy)]
struct FloodEntry {
    value: f64,
    age: u64,
    row: usize,
    col: usize,
}

impl PartialEq for FloodEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodEntry {}

impl PartialOrd for FloodEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodEntry {
    // Reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.age.cmp(&self.age))
    }
}

/// Flood `surface` from `markers`, restricted to `mask`.
///
/// Marker pixels outside the mask are dropped. Every mask pixel reachable
/// (8-connectivity) from a marker receives that marker's label; mask regions
/// without a marker stay `0`. Surviving labels are renumbered `1..=k` in
/// ascending marker order.
///
/// # Returns
///
/// The label image and `k`
pub fn watershed(
    surface: ArrayView2<f64>,
    markers: ArrayView2<u32>,
    mask: ArrayView2<bool>,
) -> Result<(LabeledImage, u32), PipelineError> {
    let shape = surface.dim();
    if markers.dim() != shape || mask.dim() != shape {
        return Err(PipelineError::Dimension(format!(
            "watershed inputs disagree: surface {:?}, markers {:?}, mask {:?}",
            shape,
            markers.dim(),
            mask.dim()
        )));
    }
    let (rows, cols) = shape;

    let mut labels: LabeledImage = Array2::zeros(shape);
    let mut heap = BinaryHeap::new();
    let mut age = 0u64;

    for ((row, col), &marker) in markers.indexed_iter() {
        if marker > 0 && mask[[row, col]] {
            labels[[row, col]] = marker;
            heap.push(FloodEntry {
                value: surface[[row, col]],
                age,
                row,
                col,
            });
            age += 1;
        }
    }

    while let Some(FloodEntry { row, col, .. }) = heap.pop() {
        let label = labels[[row, col]];
        for &(dy, dx) in &NEIGHBORS_8 {
            let ny = row as isize + dy;
            let nx = col as isize + dx;
            if ny < 0 || nx < 0 || ny >= rows as isize || nx >= cols as isize {
                continue;
            }
            let (ny, nx) = (ny as usize, nx as usize);
            if mask[[ny, nx]] && labels[[ny, nx]] == 0 {
                labels[[ny, nx]] = label;
                heap.push(FloodEntry {
                    value: surface[[ny, nx]],
                    age,
                    row: ny,
                    col: nx,
                });
                age += 1;
            }
        }
    }

    Ok(relabel_sequential(labels))
}

/// Renumber the labels present in `labels` to `1..=k`, preserving their order.
pub fn relabel_sequential(labels: LabeledImage) -> (LabeledImage, u32) {
    let max = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut present = vec![false; max + 1];
    for &label in labels.iter() {
        present[label as usize] = true;
    }

    let mut remap = vec![0u32; max + 1];
    let mut next = 0;
    for label in 1..=max {
        if present[label] {
            next += 1;
            remap[label] = next;
        }
    }

    (labels.mapv(|label| remap[label as usize]), next)
}

/// Watershed result for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSegmentation {
    pub labels: LabeledImage,
    /// Distinct labels in `labels`
    pub num_labels: u32,
    /// Markers detected in the blurred frame
    pub num_markers: u32,
}

/// Watershed result for a whole stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub labels: LabeledVolume,
    /// Marker count per frame
    pub markers: Vec<u32>,
}

impl Segmentation {
    /// Distinct label count per frame.
    pub fn label_counts(&self) -> Vec<u32> {
        (0..self.labels.n_frames())
            .map(|k| self.labels.max_label(k))
            .collect()
    }
}

/// Splits touching objects in a labeled mask volume.
#[derive(Debug, Clone, PartialEq)]
pub struct WatershedSegmenter {
    pub blur_sigma: f64,
    pub min_peak_distance: usize,
    pub exclude_border: bool,
}

impl WatershedSegmenter {
    pub fn new(blur_sigma: f64, min_peak_distance: usize, exclude_border: bool) -> Self {
        Self {
            blur_sigma,
            min_peak_distance,
            exclude_border,
        }
    }

    pub fn from_config(config: &WatershedConfig) -> Self {
        Self::new(
            config.blur_sigma,
            config.min_peak_distance,
            config.exclude_border,
        )
    }

    /// Segment one frame given its raw intensities and foreground mask.
    pub fn segment_frame(
        &self,
        raw: ArrayView2<f64>,
        mask: ArrayView2<bool>,
    ) -> Result<FrameSegmentation, PipelineError> {
        if raw.dim() != mask.dim() {
            return Err(PipelineError::Dimension(format!(
                "raw frame {:?} and mask {:?} differ in shape",
                raw.dim(),
                mask.dim()
            )));
        }

        let blurred = gaussian_filter(raw, self.blur_sigma);
        let peaks = peak_local_max(blurred.view(), self.min_peak_distance, self.exclude_border);
        let (markers, num_markers) = label_markers(raw.dim(), &peaks);

        let surface = distance_transform(mask).mapv(|d| -d);
        let (labels, num_labels) = watershed(surface.view(), markers.view(), mask)?;

        let unclaimed = labels
            .iter()
            .zip(mask.iter())
            .filter(|(&label, &fg)| fg && label == 0)
            .count();
        if unclaimed > 0 {
            log::debug!("{unclaimed} mask pixels lie in regions without a marker");
        }

        Ok(FrameSegmentation {
            labels,
            num_labels,
            num_markers,
        })
    }

    /// Segment every frame of `raw` using the foreground of `masks`.
    ///
    /// Frames are processed in parallel; the output keeps frame order.
    pub fn segment(
        &self,
        raw: &Stack,
        masks: &LabeledVolume,
    ) -> Result<Segmentation, PipelineError> {
        raw.ensure_same_shape(masks.dim(), "mask volume")?;

        let frames: Vec<FrameSegmentation> = (0..raw.n_frames())
            .into_par_iter()
            .map(|k| {
                let mask = masks.mask(k);
                let result = self.segment_frame(raw.frame(k), mask.view())?;
                log::debug!(
                    "Frame {}: {} markers, {} watershed labels",
                    k,
                    result.num_markers,
                    result.num_labels
                );
                Ok::<_, PipelineError>(result)
            })
            .collect::<Result<_, PipelineError>>()?;

        let markers = frames.iter().map(|f| f.num_markers).collect();
        let label_frames: Vec<LabeledImage> = frames.into_iter().map(|f| f.labels).collect();

        Ok(Segmentation {
            labels: LabeledVolume::from_frames(&label_frames)?,
            markers,
        })
    }
}
