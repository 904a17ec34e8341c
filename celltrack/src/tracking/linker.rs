//! Frame-to-frame particle linking.
//!
//! Each frame is matched against the particles still alive by greedy global
//! nearest neighbour: all detection/particle pairs within the search radius
//! are taken shortest first, and a pair is accepted when neither side has
//! been matched yet. Equal distances are broken by the lower detection label,
//! then the lower particle id, so results never depend on iteration order.

use std::cmp::Ordering;

use nalgebra::Vector2;

use crate::config::TrackingConfig;
use crate::features::{DetectionTable, ObjectRecord};
use crate::tracking::table::{TrackedObject, TrajectoryTable};

/// Last known state of a particle.
#[derive(Debug, Clone, Copy)]
struct ActiveParticle {
    id: usize,
    last_frame: usize,
    position: Vector2<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    label: u32,
    particle: usize,
    detection_idx: usize,
    active_idx: usize,
}

impl Candidate {
    fn priority(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.particle.cmp(&other.particle))
    }
}

fn position(record: &ObjectRecord) -> Vector2<f64> {
    Vector2::new(record.x, record.y)
}

/// Links detections into trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linker {
    /// Largest distance (pixels) between a particle's last position and a
    /// detection it may be linked to
    pub max_displacement: f64,
    /// Frames a particle may be missing and still be linked
    pub memory: usize,
}

impl Linker {
    pub fn new(max_displacement: f64, memory: usize) -> Self {
        Self {
            max_displacement,
            memory,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(config.max_displacement, config.memory)
    }

    /// Assign a particle id to every detection.
    ///
    /// Particle ids start at 0 and increase in order of first appearance.
    /// A particle last seen at frame `t` can be picked up again at frame `f`
    /// as long as `f - t - 1 <= memory`.
    pub fn link(&self, detections: &DetectionTable) -> TrajectoryTable {
        let mut frames: Vec<_> = detections.frames().iter().collect();
        frames.sort_by_key(|f| f.frame);

        let mut active: Vec<ActiveParticle> = Vec::new();
        let mut rows = Vec::with_capacity(detections.len());
        let mut next_id = 0;

        for frame in frames {
            let t = frame.frame;
            let before = active.len();
            active.retain(|p| t.saturating_sub(p.last_frame + 1) <= self.memory);
            if active.len() < before {
                log::debug!(
                    "Frame {}: {} particles not seen for more than {} frames retired",
                    t,
                    before - active.len(),
                    self.memory
                );
            }

            let mut records: Vec<&ObjectRecord> = frame.records.iter().collect();
            records.sort_by_key(|r| r.label);

            let mut candidates = Vec::new();
            for (detection_idx, record) in records.iter().enumerate() {
                let here = position(record);
                for (active_idx, particle) in active.iter().enumerate() {
                    let distance = (here - particle.position).norm();
                    if distance <= self.max_displacement {
                        candidates.push(Candidate {
                            distance,
                            label: record.label,
                            particle: particle.id,
                            detection_idx,
                            active_idx,
                        });
                    }
                }
            }
            candidates.sort_by(|a, b| a.priority(b));

            let mut assigned: Vec<Option<usize>> = vec![None; records.len()];
            let mut taken = vec![false; active.len()];
            for c in &candidates {
                if assigned[c.detection_idx].is_none() && !taken[c.active_idx] {
                    assigned[c.detection_idx] = Some(c.active_idx);
                    taken[c.active_idx] = true;
                }
            }

            let mut linked = 0;
            for (record, slot) in records.iter().zip(&assigned) {
                let particle = match *slot {
                    Some(active_idx) => {
                        let p = &mut active[active_idx];
                        p.last_frame = t;
                        p.position = position(record);
                        linked += 1;
                        p.id
                    }
                    None => {
                        let id = next_id;
                        next_id += 1;
                        active.push(ActiveParticle {
                            id,
                            last_frame: t,
                            position: position(record),
                        });
                        id
                    }
                };
                rows.push(TrackedObject {
                    record: **record,
                    particle,
                });
            }

            log::debug!(
                "Frame {}: {} detections, {} linked, {} new particles",
                t,
                records.len(),
                linked,
                records.len() - linked
            );
        }

        log::debug!("Linked {} detections into {} particles", rows.len(), next_id);
        TrajectoryTable::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FrameDetections;

    fn record(frame: usize, label: u32, y: f64, x: f64) -> ObjectRecord {
        ObjectRecord {
            frame,
            label,
            y,
            x,
            area: 150,
            intensity: 10.0 * frame as f64,
        }
    }

    fn table(frames: Vec<Vec<ObjectRecord>>) -> DetectionTable {
        DetectionTable::new(
            frames
                .into_iter()
                .enumerate()
                .map(|(frame, records)| FrameDetections { frame, records })
                .collect(),
        )
    }

    fn particle_of(table: &TrajectoryTable, frame: usize, label: u32) -> usize {
        table
            .rows()
            .iter()
            .find(|r| r.frame() == frame && r.record.label == label)
            .map(|r| r.particle)
            .unwrap()
    }

    #[test]
    fn test_neighbouring_particles_keep_their_ids() {
        let detections = table(vec![
            vec![record(0, 1, 10.0, 10.0), record(0, 2, 10.0, 40.0)],
            vec![record(1, 1, 12.0, 14.0), record(1, 2, 12.0, 36.0)],
            vec![record(2, 1, 14.0, 19.0), record(2, 2, 14.0, 31.0)],
        ]);
        let linked = Linker::new(10.0, 0).link(&detections);

        assert_eq!(linked.particles().len(), 2);
        for frame in 0..3 {
            assert_eq!(particle_of(&linked, frame, 1), 0);
            assert_eq!(particle_of(&linked, frame, 2), 1);
        }
    }

    #[test]
    fn test_out_of_range_detection_starts_new_particle() {
        let detections = table(vec![
            vec![record(0, 1, 0.0, 0.0)],
            vec![record(1, 1, 0.0, 60.0)],
        ]);
        let linked = Linker::new(50.0, 3).link(&detections);
        assert_eq!(particle_of(&linked, 0, 1), 0);
        assert_eq!(particle_of(&linked, 1, 1), 1);
    }

    #[test]
    fn test_displacement_bound_is_inclusive() {
        let detections = table(vec![
            vec![record(0, 1, 0.0, 0.0)],
            vec![record(1, 1, 30.0, 40.0)],
        ]);
        let linked = Linker::new(50.0, 0).link(&detections);
        assert_eq!(linked.particles().len(), 1);
    }

    #[test]
    fn test_closest_detection_wins_contest() {
        // Both detections are in range of particle 0; the nearer takes it
        let detections = table(vec![
            vec![record(0, 1, 0.0, 0.0)],
            vec![record(1, 1, 0.0, 9.0), record(1, 2, 0.0, 3.0)],
        ]);
        let linked = Linker::new(20.0, 0).link(&detections);
        assert_eq!(particle_of(&linked, 1, 2), 0);
        assert_eq!(particle_of(&linked, 1, 1), 1);
    }

    #[test]
    fn test_equal_distance_prefers_lower_label() {
        let detections = table(vec![
            vec![record(0, 1, 0.0, 10.0)],
            vec![record(1, 5, 0.0, 6.0), record(1, 2, 0.0, 14.0)],
        ]);
        let linked = Linker::new(20.0, 0).link(&detections);
        assert_eq!(particle_of(&linked, 1, 2), 0);
        assert_eq!(particle_of(&linked, 1, 5), 1);
    }

    #[test]
    fn test_memory_bridges_gaps() {
        let mut frames = vec![vec![record(0, 1, 5.0, 5.0)]];
        frames.extend((1..=2).map(|_| Vec::new()));
        frames.push(vec![record(3, 1, 7.0, 6.0)]);

        let detections = table(frames);
        assert_eq!(Linker::new(10.0, 2).link(&detections).particles().len(), 1);
        assert_eq!(Linker::new(10.0, 1).link(&detections).particles().len(), 2);
    }

    #[test]
    fn test_one_row_per_particle_per_frame() {
        let detections = table(vec![
            vec![record(0, 1, 0.0, 0.0), record(0, 2, 0.0, 2.0), record(0, 3, 2.0, 0.0)],
            vec![record(1, 1, 1.0, 1.0), record(1, 2, 1.0, 0.0)],
            vec![record(2, 1, 0.0, 1.0), record(2, 2, 1.0, 1.0), record(2, 3, 0.0, 0.0)],
        ]);
        let linked = Linker::new(5.0, 1).link(&detections);
        assert_eq!(linked.len(), 8);

        let mut seen = std::collections::HashSet::new();
        for row in linked.rows() {
            assert!(seen.insert((row.frame(), row.particle)));
        }
    }
}
