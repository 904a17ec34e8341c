//! Linked detections and the trajectory-length filters applied to them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::features::ObjectRecord;

/// A detection with the particle identity the linker gave it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    #[serde(flatten)]
    pub record: ObjectRecord,
    pub particle: usize,
}

impl TrackedObject {
    pub fn frame(&self) -> usize {
        self.record.frame
    }
}

/// Rows of linked detections, ordered by frame.
///
/// A particle id appears at most once per frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrajectoryTable {
    rows: Vec<TrackedObject>,
}

impl TrajectoryTable {
    pub fn new(rows: Vec<TrackedObject>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TrackedObject] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct particle ids, ascending.
    pub fn particles(&self) -> BTreeSet<usize> {
        self.rows.iter().map(|r| r.particle).collect()
    }

    /// Distinct frame indices, ascending.
    pub fn frames(&self) -> BTreeSet<usize> {
        self.rows.iter().map(|r| r.frame()).collect()
    }

    /// Number of rows (frames) per particle.
    pub fn lengths(&self) -> BTreeMap<usize, usize> {
        let mut lengths = BTreeMap::new();
        for row in &self.rows {
            *lengths.entry(row.particle).or_insert(0) += 1;
        }
        lengths
    }

    /// All rows of one particle in frame order.
    pub fn trajectory(&self, particle: usize) -> Vec<&TrackedObject> {
        self.rows.iter().filter(|r| r.particle == particle).collect()
    }

    /// Keep the particles for which `keep(length)` holds.
    pub fn retain_lengths(&self, keep: impl Fn(usize) -> bool) -> TrajectoryTable {
        let lengths = self.lengths();
        let rows = self
            .rows
            .iter()
            .filter(|r| lengths.get(&r.particle).is_some_and(|&n| keep(n)))
            .copied()
            .collect();
        TrajectoryTable { rows }
    }

    /// Drop particles seen in fewer than `min_frames` frames.
    pub fn filter_stubs(&self, min_frames: usize) -> TrajectoryTable {
        let filtered = self.retain_lengths(|n| n >= min_frames);
        log::debug!(
            "Stub filter (>= {} frames) kept {} of {} particles",
            min_frames,
            filtered.particles().len(),
            self.particles().len()
        );
        filtered
    }

    /// Keep only particles seen in more than `min_frames` frames.
    pub fn filter_longer_than(&self, min_frames: usize) -> TrajectoryTable {
        let filtered = self.retain_lengths(|n| n > min_frames);
        log::debug!(
            "Long-track filter (> {} frames) kept {} of {} particles",
            min_frames,
            filtered.particles().len(),
            self.particles().len()
        );
        filtered
    }
}
