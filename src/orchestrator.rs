//! Drives every job of a run to `Complete` with a bounded number of workers.
//!
//! Each worker takes ownership of the job it was handed and gives it back
//! when it finishes, so a job can never be touched by two workers at once.
//! The loop keeps a claim-time snapshot of every handed-out job; a worker
//! that dies brings its job back as a system failure.
//! The loop wakes on the first worker completion or after one tick,
//! whichever comes first.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::timeout;

use crate::compare::Comparator;
use crate::error::FailureKind;
use crate::plot::{PlotRequest, Plotter};
use crate::report::TestReport;
use crate::state_machine::{JobState, StateMachine, TestJob, Transition};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Resolves the requested thread count against the machine.
///
/// Values `<= 0` subtract from `available`. The result is clamped to
/// `1..=available`.
pub fn worker_budget(requested: i32, available: usize) -> usize {
    let available = available.max(1);
    let wanted = if requested <= 0 {
        available as i64 + i64::from(requested)
    } else {
        i64::from(requested)
    };
    let budget = wanted.clamp(1, available as i64) as usize;
    if budget as i64 != wanted {
        tracing::info!(requested, available, budget, "clamped worker budget");
    }
    budget
}

/// Notified on the scheduling loop whenever a job changes state.
pub trait JobObserver: Send + Sync {
    /// `active` counts jobs currently held by workers.
    fn job_changed(&self, job: &TestJob, active: usize);
}

/// Scheduler for one run.
pub struct JobOrchestrator {
    budget: usize,
    tick: Duration,
    comparator: Arc<dyn Comparator>,
    plotter: Arc<dyn Plotter>,
    observer: Option<Arc<dyn JobObserver>>,
}

type Workers = JoinSet<TestJob>;

/// A job handed to a worker: where it goes back, and what it looked like.
struct Claim {
    index: usize,
    snapshot: TestJob,
}

type Claims = HashMap<task::Id, Claim>;

impl JobOrchestrator {
    pub fn new(budget: usize, comparator: Arc<dyn Comparator>, plotter: Arc<dyn Plotter>) -> Self {
        Self {
            budget: budget.max(1),
            tick: DEFAULT_TICK,
            comparator,
            plotter,
            observer: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    fn notify(&self, job: &TestJob, active: usize) {
        if let Some(observer) = &self.observer {
            observer.job_changed(job, active);
        }
    }

    /// Runs every job to `Complete` and returns them in their original order.
    pub async fn run(&self, jobs: Vec<TestJob>) -> Vec<TestJob> {
        // `None` marks a job currently owned by a worker.
        let mut slots: Vec<Option<TestJob>> = jobs.into_iter().map(Some).collect();
        let mut workers = Workers::new();
        let mut claims = Claims::new();

        tracing::info!(jobs = slots.len(), budget = self.budget, "starting run");

        loop {
            for job in slots.iter_mut().flatten() {
                if StateMachine::next(job) == Transition::Finish {
                    self.finish(job, workers.len());
                }
            }

            self.schedule(&mut slots, &mut workers, &mut claims);

            if workers.is_empty() && slots.iter().flatten().all(|job| job.state.is_terminal()) {
                break;
            }

            match timeout(self.tick, workers.join_next_with_id()).await {
                Ok(Some(joined)) => {
                    if let Some((index, job)) = settle(&mut claims, joined) {
                        self.notify(&job, workers.len());
                        slots[index] = Some(job);
                    }
                }
                Ok(None) => tokio::time::sleep(self.tick).await,
                Err(_) => {}
            }
        }

        tracing::info!("all jobs complete");
        slots.into_iter().flatten().collect()
    }

    /// Starts the workers of one tick.
    ///
    /// An executed job waiting for comparison blocks new executions for the
    /// tick; at most one comparison starts per tick.
    fn schedule(&self, slots: &mut [Option<TestJob>], workers: &mut Workers, claims: &mut Claims) {
        let compare_ready = slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|job| StateMachine::next(job) == Transition::Compare)
        });

        if let Some(index) = compare_ready {
            if workers.len() < self.budget {
                self.claim(slots, index, JobState::Comparing, workers, claims);
            }
            return;
        }

        for index in 0..slots.len() {
            if workers.len() >= self.budget {
                break;
            }
            let ready = slots[index]
                .as_ref()
                .is_some_and(|job| StateMachine::next(job) == Transition::Execute);
            if ready {
                self.claim(slots, index, JobState::Executing, workers, claims);
            }
        }
    }

    /// Moves a job out of its slot and into a new worker.
    fn claim(
        &self,
        slots: &mut [Option<TestJob>],
        index: usize,
        to: JobState,
        workers: &mut Workers,
        claims: &mut Claims,
    ) {
        let Some(mut job) = slots[index].take() else {
            return;
        };
        if let Err(e) = StateMachine::advance(&mut job, to) {
            tracing::error!(error = %e, "unable to claim job");
            slots[index] = Some(job);
            return;
        }
        if to == JobState::Executing {
            job.started_at = Some(Utc::now());
        }
        self.notify(&job, workers.len() + 1);

        let snapshot = job.clone();
        let comparator = Arc::clone(&self.comparator);
        let plotter = Arc::clone(&self.plotter);
        let handle = workers.spawn_blocking(move || match to {
            JobState::Comparing => compare_job(job, comparator.as_ref(), plotter.as_ref()),
            _ => execute_job(job),
        });
        claims.insert(handle.id(), Claim { index, snapshot });
    }

    fn finish(&self, job: &mut TestJob, active: usize) {
        match StateMachine::advance(job, JobState::Complete) {
            Ok(()) => {
                job.finished_at = Some(Utc::now());
                if job.known_failure {
                    tracing::info!(job = %job.name, "known failure, not run");
                }
                self.notify(job, active);
            }
            Err(e) => tracing::error!(error = %e, "unable to complete job"),
        }
    }
}

/// Matches a finished worker to its claim. A worker that panicked or was
/// cancelled gives back its claim-time snapshot as a system failure.
fn settle(claims: &mut Claims, joined: Result<(task::Id, TestJob), JoinError>) -> Option<(usize, TestJob)> {
    match joined {
        Ok((id, job)) => match claims.remove(&id) {
            Some(claim) => Some((claim.index, job)),
            None => {
                tracing::error!(job = %job.name, "worker finished without a claim");
                None
            }
        },
        Err(e) => match claims.remove(&e.id()) {
            Some(claim) => {
                tracing::error!(job = %claim.snapshot.name, state = %claim.snapshot.state, error = %e, "worker died");
                Some((claim.index, recover(claim.snapshot)))
            }
            None => {
                tracing::error!(error = %e, "worker died without a claim");
                None
            }
        },
    }
}

/// Brings a job whose worker died to a state the loop can finish.
fn recover(mut job: TestJob) -> TestJob {
    job.failure = Some(FailureKind::System);
    job.skip_plot = true;
    let next = match job.state {
        JobState::Executing => JobState::Executed,
        _ => JobState::Complete,
    };
    if let Err(e) = StateMachine::advance(&mut job, next) {
        tracing::error!(error = %e, "unable to recover job");
    }
    job
}

/// Execute worker body. Executor failures of any kind are absorbed into the
/// job; it always comes back `Executed`.
pub fn execute_job(mut job: TestJob) -> TestJob {
    job.derive_report_files();

    if job.skip_execution {
        tracing::info!(job = %job.name, "skipping execution");
    } else {
        match job.executor.clone() {
            None => {
                tracing::error!(job = %job.name, "job has no executor");
                job.failure = Some(FailureKind::System);
                job.skip_plot = true;
            }
            Some(executor) => {
                tracing::info!(job = %job.name, executor = ?job.executor_name, "executing");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&job)));
                match outcome {
                    Ok(Ok(true)) => {}
                    Ok(Ok(false)) => {
                        tracing::warn!(job = %job.name, "executor reported failure");
                        job.failure = Some(FailureKind::Business);
                        job.skip_plot = true;
                    }
                    Ok(Err(e)) => {
                        tracing::error!(job = %job.name, error = %e, "executor failed");
                        job.failure = Some(FailureKind::System);
                        job.skip_plot = true;
                    }
                    Err(_) => {
                        tracing::error!(job = %job.name, "executor panicked");
                        job.failure = Some(FailureKind::System);
                        job.skip_plot = true;
                    }
                }
            }
        }
    }

    if let Err(e) = StateMachine::advance(&mut job, JobState::Executed) {
        tracing::error!(error = %e, "unable to mark job executed");
    }
    job
}

/// Compare worker body. Every baseline/computed pair is diffed and plotted
/// independently; a bad pair never stops the others.
pub fn compare_job(mut job: TestJob, comparator: &dyn Comparator, plotter: &dyn Plotter) -> TestJob {
    for (i, computed) in job.computed_files.iter().enumerate() {
        if !computed.exists() {
            tracing::error!(job = %job.name, file = %computed.display(), "computed file does not exist");
            continue;
        }
        let baseline = job.baseline_files.get(i).filter(|b| b.exists());
        let report_file = job.report_files.get(i);

        let mut failures = None;
        match baseline {
            Some(baseline) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    comparator.compare(baseline, computed, job.percent_difference)
                }));
                let comparison = match outcome {
                    Ok(Ok(comparison)) => comparison,
                    Ok(Err(e)) => {
                        tracing::error!(job = %job.name, error = %e, "comparison failed");
                        write_error_report(report_file, baseline, computed);
                        continue;
                    }
                    Err(_) => {
                        tracing::error!(job = %job.name, file = %computed.display(), "comparator panicked");
                        write_error_report(report_file, baseline, computed);
                        continue;
                    }
                };
                if let Some(report_file) = report_file {
                    let mut report = TestReport::new();
                    report.add_suite(comparison.suite);
                    if let Err(e) = report.write(report_file) {
                        tracing::error!(file = %report_file.display(), error = %e, "unable to write report");
                    }
                }
                if !comparison.failures.is_empty() {
                    tracing::warn!(job = %job.name, file = %computed.display(), failures = comparison.failures.len(), "baseline mismatch");
                }
                failures = Some(comparison.failures);
            }
            None => {
                tracing::warn!(job = %job.name, file = %computed.display(), "no baseline to compare against");
            }
        }

        let nothing_failed = failures.as_ref().is_none_or(|f| f.is_empty());
        if job.plot_type.only_on_errors() && nothing_failed {
            tracing::info!(file = %computed.display(), "no plots");
            continue;
        }
        let request = PlotRequest {
            baseline: baseline.map(|b| b.as_path()),
            computed,
            failures: failures.as_ref(),
            plot_type: job.plot_type,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| plotter.plot(&request))) {
            Ok(Ok(count)) => tracing::debug!(file = %computed.display(), count, "plotted"),
            Ok(Err(e)) => tracing::error!(file = %computed.display(), error = %e, "plotting failed"),
            Err(_) => tracing::error!(file = %computed.display(), "plotter panicked"),
        }
    }

    if let Err(e) = StateMachine::advance(&mut job, JobState::Complete) {
        tracing::error!(error = %e, "unable to complete job");
    }
    job.finished_at = Some(Utc::now());
    job
}

fn write_error_report(
    report_file: Option<&std::path::PathBuf>,
    baseline: &std::path::Path,
    computed: &std::path::Path,
) {
    let Some(report_file) = report_file else {
        return;
    };
    let mut report = TestReport::new();
    report.create_error_suite(format!(
        "Could not compare these files for some reason: {} and {}",
        baseline.display(),
        computed.display()
    ));
    if let Err(e) = report.write(report_file) {
        tracing::error!(file = %report_file.display(), error = %e, "unable to write report");
    }
}
