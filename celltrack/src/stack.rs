//! Canonical in-memory layout for time-lapse data.
//!
//! Every stage reads and writes 3D arrays indexed `(row, col, frame)`. Frames
//! are extracted with [`Stack::frame`] / [`LabeledVolume::frame`] and
//! reassembled with the `from_frames` constructors, so no stage ever has to
//! swap axes after the fact.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::error::PipelineError;

/// Binary foreground mask for one frame.
pub type Mask = Array2<bool>;

/// Per-frame label image. `0` is background; labels carry no identity across frames.
pub type LabeledImage = Array2<u32>;

/// Raw intensity samples for one channel at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    data: Array3<f64>,
}

impl Stack {
    /// Wrap an existing `(row, col, frame)` array.
    pub fn from_array(data: Array3<f64>) -> Result<Self, PipelineError> {
        let (rows, cols, frames) = data.dim();
        if frames == 0 || rows == 0 || cols == 0 {
            return Err(PipelineError::EmptyStack(format!(
                "stack has shape {rows}x{cols}x{frames}"
            )));
        }
        Ok(Self { data })
    }

    /// Assemble a stack from frames in acquisition order.
    pub fn from_frames(frames: &[Array2<f64>]) -> Result<Self, PipelineError> {
        let views: Vec<ArrayView2<f64>> = frames.iter().map(|f| f.view()).collect();
        Self::from_array(stack_frames(&views)?)
    }

    /// Shape as `(rows, cols, frames)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Shape of a single frame as `(rows, cols)`.
    pub fn frame_dim(&self) -> (usize, usize) {
        let (rows, cols, _) = self.data.dim();
        (rows, cols)
    }

    pub fn n_frames(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn frame(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(2), index)
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    /// Fail with `Dimension` unless `other` has exactly this stack's shape.
    pub fn ensure_same_shape(
        &self,
        other: (usize, usize, usize),
        what: &str,
    ) -> Result<(), PipelineError> {
        if self.dim() != other {
            return Err(PipelineError::Dimension(format!(
                "{what} has shape {:?}, expected {:?}",
                other,
                self.dim()
            )));
        }
        Ok(())
    }
}

/// Per-frame label images stacked along the frame axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVolume {
    data: Array3<u32>,
}

impl LabeledVolume {
    pub fn from_array(data: Array3<u32>) -> Result<Self, PipelineError> {
        let (rows, cols, frames) = data.dim();
        if frames == 0 || rows == 0 || cols == 0 {
            return Err(PipelineError::EmptyStack(format!(
                "labeled volume has shape {rows}x{cols}x{frames}"
            )));
        }
        Ok(Self { data })
    }

    pub fn from_frames(frames: &[LabeledImage]) -> Result<Self, PipelineError> {
        let views: Vec<ArrayView2<u32>> = frames.iter().map(|f| f.view()).collect();
        Self::from_array(stack_frames(&views)?)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn n_frames(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn frame(&self, index: usize) -> ArrayView2<'_, u32> {
        self.data.index_axis(Axis(2), index)
    }

    /// Largest label present in a frame (`0` for an empty frame).
    pub fn max_label(&self, index: usize) -> u32 {
        self.frame(index).iter().copied().max().unwrap_or(0)
    }

    /// Foreground mask of a frame.
    pub fn mask(&self, index: usize) -> Mask {
        self.frame(index).mapv(|label| label > 0)
    }
}

/// Stack 2D frames along a trailing frame axis, checking they share a shape.
fn stack_frames<T: Clone>(frames: &[ArrayView2<T>]) -> Result<Array3<T>, PipelineError> {
    let Some(first) = frames.first() else {
        return Err(PipelineError::EmptyStack("no frames supplied".to_string()));
    };

    if let Some((index, bad)) = frames
        .iter()
        .enumerate()
        .find(|(_, f)| f.dim() != first.dim())
    {
        return Err(PipelineError::Dimension(format!(
            "frame {index} has shape {:?}, frame 0 has {:?}",
            bad.dim(),
            first.dim()
        )));
    }

    ndarray::stack(Axis(2), frames).map_err(|e| PipelineError::Dimension(e.to_string()))
}
