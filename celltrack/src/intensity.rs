//! Particle x frame intensity matrix with explicit missing cells.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::tracking::TrajectoryTable;

/// Intensity of every particle at every frame of a trajectory table.
///
/// Rows are particle ids ascending, columns are the distinct frames of the
/// source table ascending. `None` marks a frame where the particle was not
/// detected; it is never conflated with a zero intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "IntensityRecord", try_from = "IntensityRecord")]
pub struct IntensityTable {
    particles: Vec<usize>,
    frames: Vec<usize>,
    values: Array2<Option<f64>>,
}

impl IntensityTable {
    /// Pivot a trajectory table into a dense particle x frame matrix.
    pub fn build(trajectories: &TrajectoryTable) -> Self {
        let particles: Vec<usize> = trajectories.particles().into_iter().collect();
        let frames: Vec<usize> = trajectories.frames().into_iter().collect();

        let row_of: HashMap<usize, usize> =
            particles.iter().enumerate().map(|(i, &p)| (p, i)).collect();
        let col_of: HashMap<usize, usize> =
            frames.iter().enumerate().map(|(i, &f)| (f, i)).collect();

        let mut values = Array2::from_elem((particles.len(), frames.len()), None);
        for row in trajectories.rows() {
            let (Some(&r), Some(&c)) = (row_of.get(&row.particle), col_of.get(&row.frame())) else {
                continue;
            };
            values[[r, c]] = coerce_number(row.record.intensity);
        }

        let table = Self {
            particles,
            frames,
            values,
        };
        log::debug!(
            "Intensity table {}x{} with {} missing cells",
            table.particles.len(),
            table.frames.len(),
            table.missing_count()
        );
        table
    }

    pub fn particles(&self) -> &[usize] {
        &self.particles
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    /// `(particles, frames)`
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Intensity of `particle` at `frame`; `None` when missing or not in the table.
    pub fn get(&self, particle: usize, frame: usize) -> Option<f64> {
        let r = self.particles.binary_search(&particle).ok()?;
        let c = self.frames.binary_search(&frame).ok()?;
        self.values[[r, c]]
    }

    /// Whether `(particle, frame)` is a cell of this table with no detection.
    pub fn is_missing(&self, particle: usize, frame: usize) -> bool {
        match (
            self.particles.binary_search(&particle),
            self.frames.binary_search(&frame),
        ) {
            (Ok(r), Ok(c)) => self.values[[r, c]].is_none(),
            _ => false,
        }
    }

    /// Intensity series of one particle across the table's frames.
    pub fn series(&self, particle: usize) -> Option<ArrayView1<'_, Option<f64>>> {
        let r = self.particles.binary_search(&particle).ok()?;
        Some(self.values.index_axis(Axis(0), r))
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

fn coerce_number(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Numeric value of a stored cell. Anything that is not a finite number or a
/// string holding one becomes missing.
pub fn coerce_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(coerce_number),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(coerce_number),
        _ => None,
    }
}

/// On-disk layout of an [`IntensityTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntensityRecord {
    particles: Vec<usize>,
    frames: Vec<usize>,
    values: Vec<Vec<Value>>,
}

impl From<IntensityTable> for IntensityRecord {
    fn from(table: IntensityTable) -> Self {
        let values = table
            .values
            .outer_iter()
            .map(|row| {
                row.iter()
                    .map(|v| v.map(Value::from).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self {
            particles: table.particles,
            frames: table.frames,
            values,
        }
    }
}

impl TryFrom<IntensityRecord> for IntensityTable {
    type Error = PipelineError;

    fn try_from(record: IntensityRecord) -> Result<Self, Self::Error> {
        let (rows, cols) = (record.particles.len(), record.frames.len());
        if record.values.len() != rows || record.values.iter().any(|r| r.len() != cols) {
            return Err(PipelineError::Dimension(format!(
                "intensity table declares {rows} particles x {cols} frames but cell rows disagree"
            )));
        }

        // Lookups binary-search both axes
        let row_order = ascending_order(&record.particles, "particle")?;
        let col_order = ascending_order(&record.frames, "frame")?;

        let values = Array2::from_shape_fn((rows, cols), |(r, c)| {
            coerce_value(&record.values[row_order[r]][col_order[c]])
        });

        Ok(Self {
            particles: row_order.iter().map(|&i| record.particles[i]).collect(),
            frames: col_order.iter().map(|&i| record.frames[i]).collect(),
            values,
        })
    }
}

/// Indices that sort `ids` ascending. Repeated ids are a `Dimension` error.
fn ascending_order(ids: &[usize], axis: &str) -> Result<Vec<usize>, PipelineError> {
    let mut order: Vec<usize> = (0..ids.len()).collect();
    order.sort_by_key(|&i| ids[i]);
    if let Some(pair) = order.windows(2).find(|w| ids[w[0]] == ids[w[1]]) {
        return Err(PipelineError::Dimension(format!(
            "intensity table repeats {axis} {}",
            ids[pair[0]]
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ObjectRecord;
    use crate::tracking::TrackedObject;
    use serde_json::json;

    fn tracked(frame: usize, particle: usize, intensity: f64) -> TrackedObject {
        TrackedObject {
            record: ObjectRecord {
                frame,
                label: 1,
                y: 0.0,
                x: 0.0,
                area: 120,
                intensity,
            },
            particle,
        }
    }

    fn trajectories() -> TrajectoryTable {
        TrajectoryTable::new(vec![
            tracked(2, 4, 10.0),
            tracked(2, 1, 0.0),
            tracked(3, 1, 11.0),
            tracked(5, 4, 12.0),
            tracked(5, 1, f64::NAN),
        ])
    }

    #[test]
    fn test_build_orders_rows_and_columns() {
        let table = IntensityTable::build(&trajectories());
        assert_eq!(table.particles(), &[1, 4]);
        assert_eq!(table.frames(), &[2, 3, 5]);
        assert_eq!(table.dim(), (2, 3));
    }

    #[test]
    fn test_absent_cells_are_missing_not_zero() {
        let table = IntensityTable::build(&trajectories());

        // Particle 4 was not detected in frame 3
        assert!(table.is_missing(4, 3));
        assert_eq!(table.get(4, 3), None);

        // A real zero stays a zero
        assert_eq!(table.get(1, 2), Some(0.0));
        assert!(!table.is_missing(1, 2));

        // NaN coerces to missing
        assert!(table.is_missing(1, 5));
        assert_eq!(table.missing_count(), 2);

        // Outside the table is not a missing cell
        assert!(!table.is_missing(9, 2));
        assert_eq!(table.get(4, 7), None);
    }

    #[test]
    fn test_series() {
        let table = IntensityTable::build(&trajectories());
        let series = table.series(4).unwrap();
        assert_eq!(series.to_vec(), vec![Some(10.0), None, Some(12.0)]);
        assert!(table.series(2).is_none());
    }

    #[test]
    fn test_empty_trajectories_give_empty_table() {
        let table = IntensityTable::build(&TrajectoryTable::default());
        assert!(table.is_empty());
        assert_eq!(table.dim(), (0, 0));
    }

    #[test]
    fn test_json_uses_null_for_missing() {
        let table = IntensityTable::build(&trajectories());
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["values"][1][1], Value::Null);
        assert_eq!(json["values"][1][0], json!(10.0));

        let back: IntensityTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_unparseable_cells_coerce_to_missing() {
        let json = json!({
            "particles": [0, 1],
            "frames": [0, 1],
            "values": [[1.5, "2.5"], ["n/a", true]]
        });
        let table: IntensityTable = serde_json::from_value(json).unwrap();
        assert_eq!(table.get(0, 0), Some(1.5));
        assert_eq!(table.get(0, 1), Some(2.5));
        assert!(table.is_missing(1, 0));
        assert!(table.is_missing(1, 1));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let json = json!({
            "particles": [0, 1],
            "frames": [0, 1],
            "values": [[1.0, 2.0], [3.0]]
        });
        assert!(serde_json::from_value::<IntensityTable>(json).is_err());
    }

    #[test]
    fn test_unsorted_axes_are_reordered_on_load() {
        let json = json!({
            "particles": [7, 2, 5],
            "frames": [3, 1],
            "values": [[1.0, 2.0], [3.0, 4.0], [5.0, null]]
        });
        let table: IntensityTable = serde_json::from_value(json).unwrap();

        assert_eq!(table.particles(), &[2, 5, 7]);
        assert_eq!(table.frames(), &[1, 3]);
        assert_eq!(table.get(2, 3), Some(3.0));
        assert_eq!(table.get(7, 1), Some(2.0));
        assert_eq!(table.get(5, 1), None);
        assert!(table.is_missing(5, 1));
        assert!(!table.is_missing(2, 3));
        assert_eq!(table.series(7).unwrap().to_vec(), vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_repeated_ids_are_rejected() {
        let json = json!({
            "particles": [1, 1],
            "frames": [0],
            "values": [[1.0], [2.0]]
        });
        assert!(serde_json::from_value::<IntensityTable>(json).is_err());
    }
}
