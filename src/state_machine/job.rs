use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobState;
use crate::error::FailureKind;
use crate::executor::Executor;

/// How comparison plots are produced for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotType {
    /// Every 5th sample of every column.
    #[default]
    FastPlot,
    /// Every sample of every column.
    FullPlot,
    /// Every 5th sample, failing columns only.
    FastPlotErrors,
    /// Every sample, failing columns only.
    FullPlotErrors,
    /// Like `FastPlot` but streamed row by row.
    MemoryFastPlot,
}

impl PlotType {
    /// Plots are only produced when the comparison found failures.
    pub fn only_on_errors(self) -> bool {
        matches!(self, PlotType::FastPlotErrors | PlotType::FullPlotErrors)
    }

    /// Sample stride used when writing plot series.
    pub fn stride(self) -> usize {
        match self {
            PlotType::FullPlot | PlotType::FullPlotErrors => 1,
            PlotType::FastPlot | PlotType::FastPlotErrors | PlotType::MemoryFastPlot => 5,
        }
    }
}

impl FromStr for PlotType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastplot" => Ok(PlotType::FastPlot),
            "fullplot" => Ok(PlotType::FullPlot),
            "fastploterrors" => Ok(PlotType::FastPlotErrors),
            "fullploterrors" => Ok(PlotType::FullPlotErrors),
            "memoryfastplot" => Ok(PlotType::MemoryFastPlot),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Periodic engine state dumps requested for scenario runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSerialization {
    pub directory: String,
    pub period_s: f64,
    pub period_timestamps: bool,
    pub after_actions: bool,
    pub reload_state: bool,
}

impl AutoSerialization {
    /// Parses `dir,period,On|Off,On|Off,On|Off`.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != 5 {
            return None;
        }
        Some(Self {
            directory: parts[0].to_string(),
            period_s: parts[1].parse().ok()?,
            period_timestamps: parse_on_off(parts[2])?,
            after_actions: parse_on_off(parts[3])?,
            reload_state: parse_on_off(parts[4])?,
        })
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// A single named test unit in a run.
#[derive(Clone)]
pub struct TestJob {
    pub name: String,
    pub group: String,
    pub executor_name: Option<String>,
    pub executor: Option<Arc<dyn Executor>>,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub known_failure: bool,
    pub skip_execution: bool,
    pub skip_plot: bool,
    pub plottable_results: bool,
    pub plot_type: PlotType,
    pub percent_difference: f64,
    pub baseline_directory: String,
    pub computed_directory: String,
    pub results: Vec<String>,
    pub baseline_files: Vec<PathBuf>,
    pub computed_files: Vec<PathBuf>,
    pub report_files: Vec<PathBuf>,
    pub patient_file: Option<String>,
    pub use_state: bool,
    pub auto_serialization: Option<AutoSerialization>,
    pub failure: Option<FailureKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for TestJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestJob")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("executor", &self.executor_name)
            .field("state", &self.state)
            .field("known_failure", &self.known_failure)
            .field("skip_execution", &self.skip_execution)
            .field("skip_plot", &self.skip_plot)
            .field("plottable_results", &self.plottable_results)
            .field("plot_type", &self.plot_type)
            .field("baseline_files", &self.baseline_files)
            .field("computed_files", &self.computed_files)
            .finish_non_exhaustive()
    }
}

impl TestJob {
    pub fn new(name: String, group: String, percent_difference: f64) -> Self {
        Self {
            name,
            group,
            executor_name: None,
            executor: None,
            state: JobState::Provisioned,
            state_history: Vec::new(),
            known_failure: false,
            skip_execution: false,
            skip_plot: false,
            plottable_results: false,
            plot_type: PlotType::default(),
            percent_difference,
            baseline_directory: ".".to_string(),
            computed_directory: ".".to_string(),
            results: Vec::new(),
            baseline_files: Vec::new(),
            computed_files: Vec::new(),
            report_files: Vec::new(),
            patient_file: None,
            use_state: false,
            auto_serialization: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether the assigned executor follows scenario naming conventions.
    pub fn runs_scenarios(&self) -> bool {
        self.executor.as_ref().is_some_and(|e| e.runs_scenarios())
    }

    /// An executed job moves on to comparison only when it has plottable
    /// results and nothing asked to skip the plot.
    pub fn wants_comparison(&self) -> bool {
        self.plottable_results && !self.skip_plot
    }

    /// Fill baseline/computed file lists from `Results=` or from the job name.
    pub fn derive_result_files(&mut self) {
        self.baseline_files.clear();
        self.computed_files.clear();
        if !self.results.is_empty() {
            for result in &self.results {
                self.baseline_files
                    .push(Path::new(&self.baseline_directory).join(format!("{result}.zip")));
                self.computed_files
                    .push(Path::new(&self.computed_directory).join(format!("{result}.txt")));
            }
        } else if self.runs_scenarios() {
            let base = self.name.clone();
            self.derive_scenario_result_files(&base);
        } else {
            self.baseline_files
                .push(Path::new(&self.baseline_directory).join(format!("{}.zip", self.name)));
            self.computed_files
                .push(Path::new(&self.computed_directory).join(format!("{}.txt", self.name)));
        }
    }

    /// Scenario naming: `Validation/Patient.xml` compares
    /// `<baseline>/Validation/Current Baseline/PatientResults.zip` against
    /// `<computed>/Validation/PatientResults.txt`.
    pub fn derive_scenario_result_files(&mut self, base_name: &str) {
        self.baseline_files.clear();
        self.computed_files.clear();

        let stem = base_name.find(".xml").map_or(base_name, |i| &base_name[..i]);
        let dirs: Vec<&str> = stem.split(['/', '\\']).filter(|d| !d.is_empty()).collect();
        let Some((file, parents)) = dirs.split_last() else {
            return;
        };

        let mut baseline = PathBuf::from(&self.baseline_directory);
        let mut computed = PathBuf::from(&self.computed_directory);
        for dir in parents {
            baseline.push(dir);
            computed.push(dir);
        }
        baseline.push("Current Baseline");
        baseline.push(format!("{file}Results.zip"));
        computed.push(format!("{file}Results.txt"));

        self.baseline_files.push(baseline);
        self.computed_files.push(computed);
    }

    /// One report file per computed file. Plottable results keep their
    /// report inside the plot directory named after the computed file.
    pub fn derive_report_files(&mut self) {
        self.report_files = self
            .computed_files
            .iter()
            .map(|computed| report_file_for(computed, self.plottable_results))
            .collect();
    }

    /// Hint passed to artifact cleanup for the job as a whole.
    pub fn cleanup_hint(&self) -> PathBuf {
        Path::new(&self.computed_directory).join(&self.name)
    }
}

fn report_file_for(computed: &Path, plottable: bool) -> PathBuf {
    let stem = computed.with_extension("");
    let base = stem
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if plottable {
        stem.join(format!("{base}Report.json"))
    } else {
        let mut name = stem.into_os_string();
        name.push("Report.json");
        PathBuf::from(name)
    }
}

/// Structured record of one job's passage through a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub group: String,
    pub known_failure: bool,
    pub failure: Option<FailureKind>,
    pub state_transitions: Vec<JobState>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl JobRecord {
    pub fn from_job(job: &TestJob) -> Self {
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);
        let duration_ms = match (job.started_at, job.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        Self {
            name: job.name.clone(),
            group: job.group.clone(),
            known_failure: job.known_failure,
            failure: job.failure,
            state_transitions: transitions,
            started_at: job.started_at,
            finished_at: job.finished_at,
            duration_ms,
        }
    }
}
