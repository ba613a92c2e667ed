mod job;
mod state;

pub use job::{AutoSerialization, JobRecord, PlotType, TestJob};
pub use state::{JobState, StateMachine, Transition};
