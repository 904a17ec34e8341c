//! Image-stack sources keyed by channel name and position index.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, Luma, Primitive};
use ndarray::Array2;

use crate::error::PipelineError;
use crate::stack::Stack;

/// Provides raw stacks for an experiment.
pub trait StackSource: Sync {
    /// Position indices available, ascending.
    fn positions(&self) -> Result<Vec<usize>, PipelineError>;

    /// Stack of one channel at one position.
    fn read_stack(&self, channel: &str, position: usize) -> Result<Stack, PipelineError>;
}

/// Stacks held in memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    stacks: HashMap<(String, usize), Stack>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: &str, position: usize, stack: Stack) {
        self.stacks.insert((channel.to_string(), position), stack);
    }

    pub fn with_stack(mut self, channel: &str, position: usize, stack: Stack) -> Self {
        self.insert(channel, position, stack);
        self
    }
}

impl StackSource for InMemorySource {
    fn positions(&self) -> Result<Vec<usize>, PipelineError> {
        let positions: BTreeSet<usize> = self.stacks.keys().map(|(_, p)| *p).collect();
        Ok(positions.into_iter().collect())
    }

    fn read_stack(&self, channel: &str, position: usize) -> Result<Stack, PipelineError> {
        self.stacks
            .get(&(channel.to_string(), position))
            .cloned()
            .ok_or_else(|| PipelineError::MissingChannel {
                channel: channel.to_string(),
                position,
            })
    }
}

/// Frames stored as image files under `<root>/pos<N>/<channel>/`.
///
/// Frames are ordered by file name, so zero-padded frame numbers sort
/// correctly. Any format the `image` crate decodes is accepted; samples are
/// read as 16-bit grey.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

const FRAME_EXTENSIONS: [&str; 4] = ["tif", "tiff", "png", "pgm"];

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn channel_dir(&self, channel: &str, position: usize) -> PathBuf {
        self.root.join(format!("pos{position}")).join(channel)
    }

    fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_frame {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Grey samples of a decoded image as a `(row, col)` array.
///
/// Samples keep their stored values: an 8-bit frame stays in `0..=255`, a
/// 16-bit frame in `0..=65535` and float frames are copied unscaled. Colour
/// frames are reduced to luma at their own bit depth.
pub fn image_to_frame(image: &DynamicImage) -> Array2<f64> {
    match image {
        DynamicImage::ImageLuma8(grey) => luma_to_frame(grey),
        DynamicImage::ImageLuma16(grey) => luma_to_frame(grey),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => luma_to_frame(&image.to_luma8()),
        DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => luma_to_frame(&image.to_luma16()),
        DynamicImage::ImageRgb32F(rgb) => {
            float_luma_to_frame(rgb.dimensions(), |x, y| rgb.get_pixel(x, y).0)
        }
        DynamicImage::ImageRgba32F(rgba) => float_luma_to_frame(rgba.dimensions(), |x, y| {
            let [r, g, b, _] = rgba.get_pixel(x, y).0;
            [r, g, b]
        }),
        _ => luma_to_frame(&image.to_luma16()),
    }
}

/// Rec. 709 luma weights, matching the `image` crate's integer conversions.
const LUMA_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];

/// Luma of float RGB samples without clamping to `[0, 1]`.
fn float_luma_to_frame(
    (width, height): (u32, u32),
    rgb_at: impl Fn(u32, u32) -> [f32; 3],
) -> Array2<f64> {
    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        let rgb = rgb_at(c as u32, r as u32);
        LUMA_WEIGHTS
            .iter()
            .zip(rgb)
            .map(|(w, v)| w * f64::from(v))
            .sum()
    })
}

fn luma_to_frame<T>(grey: &ImageBuffer<Luma<T>, Vec<T>>) -> Array2<f64>
where
    T: Primitive + Into<f64>,
{
    let (width, height) = grey.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        grey.get_pixel(c as u32, r as u32)[0].into()
    })
}

impl StackSource for DirectorySource {
    fn positions(&self) -> Result<Vec<usize>, PipelineError> {
        let mut positions = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix("pos"))
                .and_then(|n| n.parse::<usize>().ok())
            {
                positions.push(index);
            }
        }
        positions.sort_unstable();
        Ok(positions)
    }

    fn read_stack(&self, channel: &str, position: usize) -> Result<Stack, PipelineError> {
        let dir = self.channel_dir(channel, position);
        if !dir.is_dir() {
            return Err(PipelineError::MissingChannel {
                channel: channel.to_string(),
                position,
            });
        }

        let paths = Self::frame_paths(&dir)?;
        if paths.is_empty() {
            return Err(PipelineError::EmptyStack(format!(
                "no frames in {}",
                dir.display()
            )));
        }

        let frames = paths
            .iter()
            .map(|path| Ok::<_, PipelineError>(image_to_frame(&image::open(path)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        log::debug!(
            "Read {} frames of channel {} at position {}",
            frames.len(),
            channel,
            position
        );
        Stack::from_frames(&frames)
    }
}
