//! Persistence of trajectory and intensity tables.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::intensity::IntensityTable;
use crate::tracking::TrajectoryTable;

/// Receives the per-position outputs of a reporter channel.
pub trait ResultSink: Sync {
    /// Stub-filtered trajectories of `label` at `position`.
    fn write_trajectories(
        &self,
        label: &str,
        position: usize,
        trajectories: &TrajectoryTable,
    ) -> Result<(), PipelineError>;

    /// Long-trajectory intensity table of `label` at `position`.
    fn write_intensities(
        &self,
        label: &str,
        position: usize,
        intensities: &IntensityTable,
    ) -> Result<(), PipelineError>;
}

/// Writes one JSON file per table into a directory.
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    root: PathBuf,
}

impl JsonDirectorySink {
    /// Create the output directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trajectories_path(&self, label: &str, position: usize) -> PathBuf {
        self.root.join(format!("trajectories_{label}_{position}.json"))
    }

    pub fn intensities_path(&self, label: &str, position: usize) -> PathBuf {
        self.root.join(format!("intensities_{label}_{position}.json"))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

impl ResultSink for JsonDirectorySink {
    fn write_trajectories(
        &self,
        label: &str,
        position: usize,
        trajectories: &TrajectoryTable,
    ) -> Result<(), PipelineError> {
        write_json(&self.trajectories_path(label, position), trajectories)
    }

    fn write_intensities(
        &self,
        label: &str,
        position: usize,
        intensities: &IntensityTable,
    ) -> Result<(), PipelineError> {
        write_json(&self.intensities_path(label, position), intensities)
    }
}

/// Read back a stored intensity table. Cells that are not numbers become missing.
pub fn load_intensity_table(path: &Path) -> Result<IntensityTable, PipelineError> {
    read_json(path)
}

/// Read back a stored trajectory table.
pub fn load_trajectories(path: &Path) -> Result<TrajectoryTable, PipelineError> {
    read_json(path)
}
