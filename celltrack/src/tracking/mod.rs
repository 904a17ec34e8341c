//! Temporal identity: linking detections and filtering the trajectories.

pub mod linker;
pub mod table;

pub use linker::Linker;
pub use table::{TrackedObject, TrajectoryTable};

use crate::config::TrackingConfig;
use crate::features::DetectionTable;

/// Area filter, linker and stub filter applied in sequence, plus the
/// long-trajectory filter used for intensity tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tracker {
    pub min_area: usize,
    pub linker: Linker,
    pub stub_min_frames: usize,
    pub long_min_frames: usize,
}

impl Tracker {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            min_area: config.min_area,
            linker: Linker::from_config(config),
            stub_min_frames: config.stub_min_frames,
            long_min_frames: config.long_min_frames,
        }
    }

    /// Drop small fragments, link, and discard stubs.
    pub fn track(&self, detections: &DetectionTable) -> TrajectoryTable {
        let sized = detections.filter_min_area(self.min_area);
        log::debug!(
            "{} of {} detections have area >= {}",
            sized.len(),
            detections.len(),
            self.min_area
        );
        self.linker.link(&sized).filter_stubs(self.stub_min_frames)
    }

    /// Trajectories long enough for intensity analysis.
    pub fn long_trajectories(&self, trajectories: &TrajectoryTable) -> TrajectoryTable {
        trajectories.filter_longer_than(self.long_min_frames)
    }
}
