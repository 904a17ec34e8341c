//! Per-frame object labeling of the nuclear channel.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::config::{LabelingConfig, MaskConfig};
use crate::error::PipelineError;
use crate::image_proc::mask::MaskBuilder;
use crate::image_proc::thresholding::label_objects;
use crate::stack::{LabeledImage, LabeledVolume, Stack};

/// Masks each frame, drops specks and labels what is left (8-connectivity).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLabeler {
    pub mask_builder: MaskBuilder,
    pub min_object_size: usize,
}

impl ObjectLabeler {
    pub fn new(mask_builder: MaskBuilder, min_object_size: usize) -> Self {
        Self {
            mask_builder,
            min_object_size,
        }
    }

    pub fn from_config(mask: &MaskConfig, labeling: &LabelingConfig) -> Self {
        Self::new(MaskBuilder::from_config(mask), labeling.min_object_size)
    }

    /// Label one frame. Returns the label image and its object count.
    pub fn label_frame(
        &self,
        image: ArrayView2<f64>,
    ) -> Result<(LabeledImage, u32), PipelineError> {
        let mask = self.mask_builder.segment(image)?;
        Ok(label_objects(mask.view(), self.min_object_size))
    }

    /// Label every frame of `stack`, in parallel, keeping frame order.
    ///
    /// Labels are frame-local; the same number in two frames means nothing.
    pub fn label_stack(&self, stack: &Stack) -> Result<LabeledVolume, PipelineError> {
        let frames = (0..stack.n_frames())
            .into_par_iter()
            .map(|k| {
                let (labels, count) = self.label_frame(stack.frame(k))?;
                log::debug!("Frame {k}: {count} objects of at least {} px", self.min_object_size);
                Ok::<_, PipelineError>(labels)
            })
            .collect::<Result<Vec<LabeledImage>, PipelineError>>()?;

        LabeledVolume::from_frames(&frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::thresholding::{component_areas, ThresholdMethod};
    use crate::image_proc::wavelet::{SpectralFilter, WaveletKernel};
    use ndarray::Array2;

    fn labeler(min_object_size: usize) -> ObjectLabeler {
        let mask = MaskConfig {
            keep_bands: SpectralFilter::all_bands(2),
            kernel: WaveletKernel::Haar,
            levels: Some(2),
            block_size: 21,
            threshold_method: ThresholdMethod::Gaussian,
            threshold_offset: -1.0,
            erosion_radius: 0,
        };
        ObjectLabeler::from_config(&mask, &LabelingConfig { min_object_size })
    }

    /// A 6-pixel-radius blob, a 2x2 speck and a 4x4 square.
    fn scene() -> Array2<f64> {
        Array2::from_shape_fn((48, 48), |(r, c)| {
            let blob = (r as f64 - 12.0).powi(2) + (c as f64 - 12.0).powi(2) <= 36.0;
            let speck = (30..32).contains(&r) && (8..10).contains(&c);
            let square = (30..34).contains(&r) && (30..34).contains(&c);
            if blob || speck || square {
                150.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_small_objects_removed() {
        let (labels, count) = labeler(10).label_frame(scene().view()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(labels[[30, 8]], 0);
        assert!(labels[[12, 12]] > 0);
        assert!(labels[[31, 31]] > 0);

        let areas = component_areas(labels.view(), count);
        assert!(areas[1..].iter().all(|&a| a >= 10));
    }

    #[test]
    fn test_labels_cover_exactly_the_kept_foreground() {
        let image = scene();
        let labeler = labeler(1);
        let mask = labeler.mask_builder.segment(image.view()).unwrap();
        let (labels, count) = labeler.label_frame(image.view()).unwrap();
        assert_eq!(count, 3);
        for (label, fg) in labels.iter().zip(mask.iter()) {
            assert_eq!(*label > 0, *fg);
        }
    }

    #[test]
    fn test_label_stack_keeps_frame_order() {
        let full = scene();
        let empty = Array2::zeros((48, 48));
        let stack = Stack::from_frames(&[full.clone(), empty, full]).unwrap();

        let volume = labeler(10).label_stack(&stack).unwrap();
        assert_eq!(volume.dim(), (48, 48, 3));
        assert_eq!(volume.max_label(0), 2);
        assert_eq!(volume.max_label(1), 0);
        assert_eq!(volume.max_label(2), 2);
        assert_eq!(volume.frame(0), volume.frame(2));
    }
}
