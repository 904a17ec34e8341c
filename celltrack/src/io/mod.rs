//! Collaborators at the edges of the pipeline: where stacks come from and
//! where results go.

pub mod sink;
pub mod source;

pub use sink::{load_intensity_table, load_trajectories, JsonDirectorySink, ResultSink};
pub use source::{DirectorySource, InMemorySource, StackSource};
