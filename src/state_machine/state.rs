use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::TestJob;
use crate::error::{DriverError, Result};

/// Lifecycle of a test job inside one run.
///
/// Provisioned → Executing → Executed → (Comparing →) Complete, with a
/// shortcut from Provisioned to Complete for known failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobState {
    Provisioned,
    Executing,
    Executed,
    Comparing,
    Complete,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self == JobState::Complete
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Provisioned => write!(f, "PROVISIONED"),
            JobState::Executing => write!(f, "EXECUTING"),
            JobState::Executed => write!(f, "EXECUTED"),
            JobState::Comparing => write!(f, "COMPARING"),
            JobState::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// What the scheduler should do with a job in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Hand the job to an execute worker.
    Execute,
    /// Hand the job to a compare worker.
    Compare,
    /// Nothing left to do; mark it complete.
    Finish,
    /// A worker owns the job or it is already complete.
    Wait,
}

/// Validates and applies job state changes.
pub struct StateMachine;

impl StateMachine {
    /// Decide the next step for a job without mutating it.
    pub fn next(job: &TestJob) -> Transition {
        match job.state {
            JobState::Provisioned if job.known_failure => Transition::Finish,
            JobState::Provisioned => Transition::Execute,
            JobState::Executed if job.wants_comparison() => Transition::Compare,
            JobState::Executed => Transition::Finish,
            JobState::Executing | JobState::Comparing | JobState::Complete => Transition::Wait,
        }
    }

    /// Whether `from → to` is an edge of the lifecycle graph.
    pub fn allows(from: JobState, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (from, to),
            (Provisioned, Executing)
                | (Provisioned, Complete)
                | (Executing, Executed)
                | (Executed, Comparing)
                | (Executed, Complete)
                | (Comparing, Complete)
        )
    }

    /// Move `job` to `to`, recording the state it leaves.
    pub fn advance(job: &mut TestJob, to: JobState) -> Result<()> {
        if !Self::allows(job.state, to) {
            return Err(DriverError::InvalidTransition {
                job: job.name.clone(),
                from: job.state,
                to,
            });
        }
        job.state_history.push(job.state);
        job.state = to;
        Ok(())
    }
}
