//! Parsing of the line-oriented test configuration into a [`TestPlan`].
//!
//! ```text
//! # comment
//! Subject=Nightly verification
//! Executor=ScenarioTestDriver,engine --scenario {job} --out {computed}
//! Macro ScenarioTest=ScenarioTestDriver FastPlot Baseline=verification/Scenarios Computed=Scenarios
//! @group Validation
//! Validation/Patient-Validation.xml=ScenarioTest
//! *Known/Broken.xml=ScenarioTest
//! -Skipped.xml=ScenarioTest
//! ```
//!
//! Parsing runs in two passes: the first collects macros and executor
//! declarations wherever they appear, the second builds jobs with macros
//! already known. All other directives apply to the job lines after them.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{DriverError, Result};
use crate::executor::ExecutorRegistry;
use crate::state_machine::{AutoSerialization, TestJob};

const DEFAULT_PERCENT_DIFFERENCE: f64 = 2.0;

/// Email fields from the config file; all four are needed to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailSettings {
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub smtp: Option<String>,
    pub recipients: Vec<String>,
}

impl EmailSettings {
    pub fn is_complete(&self) -> bool {
        self.subject.is_some()
            && self.sender.is_some()
            && self.smtp.is_some()
            && !self.recipients.is_empty()
    }
}

/// Everything a run needs from the config file.
#[derive(Debug, Clone)]
pub struct TestPlan {
    /// Config path without extension; prefixes the log and report files.
    pub name: String,
    pub jobs: Vec<TestJob>,
    pub threads: Option<i32>,
    pub execute_jobs: bool,
    pub plot_results: bool,
    pub send_email: bool,
    pub email: EmailSettings,
    pub patients: Option<String>,
    pub macros: Vec<(String, String)>,
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    line.split_once('=').map(|(k, v)| (k.trim(), v.trim()))
}

/// Lines that carry directives or jobs, trimmed.
fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn macro_name(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("Macro")?;
    let name = rest.trim_start_matches(|c: char| !c.is_alphanumeric()).trim();
    (!name.is_empty()).then_some(name)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::error!(key, value, "ignoring malformed numeric setting");
            None
        }
    }
}

/// A comparison tolerance must be a finite, non-negative percentage.
fn parse_tolerance(key: &str, value: &str) -> Option<f64> {
    let v: f64 = parse_number(key, value)?;
    if v.is_finite() && v >= 0.0 {
        Some(v)
    } else {
        tracing::error!(key, value, "ignoring malformed numeric setting");
        None
    }
}

impl TestPlan {
    /// Reads and parses a config file.
    pub fn load(path: &Path, registry: &ExecutorRegistry, patients_dir: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DriverError::ConfigNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let name = path.with_extension("").display().to_string();
        Ok(Self::parse(&name, &text, registry, patients_dir))
    }

    /// Parses config text. Malformed lines are logged and skipped.
    pub fn parse(
        name: &str,
        text: &str,
        registry: &ExecutorRegistry,
        patients_dir: &Path,
    ) -> Self {
        let mut registry = registry.clone();
        let mut plan = Self {
            name: name.to_string(),
            jobs: Vec::new(),
            threads: None,
            execute_jobs: true,
            plot_results: true,
            send_email: true,
            email: EmailSettings::default(),
            patients: None,
            macros: Vec::new(),
        };

        // First pass: macros and executors.
        for line in content_lines(text) {
            let Some((key, value)) = split_key_value(line) else {
                continue;
            };
            if let Some(macro_key) = macro_name(key) {
                plan.macros.retain(|(k, _)| k != macro_key);
                plan.macros.push((macro_key.to_string(), value.to_string()));
            } else if key.eq_ignore_ascii_case("Executor") {
                if let Err(e) = registry.declare(value) {
                    tracing::error!(error = %e, "could not declare executor");
                }
            }
        }
        // Longest first so a macro never clobbers a longer one sharing its prefix.
        plan.macros.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        // Second pass: directives and jobs, in order.
        let mut percent_difference = DEFAULT_PERCENT_DIFFERENCE;
        let mut use_states = false;
        let mut auto_serialization = None;
        let mut current_group = name.to_string();

        for line in content_lines(text) {
            if let Some(group) = line.strip_prefix("@group") {
                let group = group.trim();
                current_group = if group.is_empty() {
                    name.to_string()
                } else {
                    group.to_string()
                };
                continue;
            }
            let Some((key, value)) = split_key_value(line) else {
                continue;
            };
            if macro_name(key).is_some() || key.eq_ignore_ascii_case("Executor") {
                continue;
            }

            match key.to_ascii_lowercase().as_str() {
                "subject" => plan.email.subject = Some(value.to_string()),
                "sender" => plan.email.sender = Some(value.to_string()),
                "smtp" => plan.email.smtp = Some(value.to_string()),
                "recipients" => {
                    plan.email.recipients = value
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "percentdifference" => {
                    if let Some(v) = parse_tolerance(key, value) {
                        percent_difference = v;
                    }
                }
                "threads" => {
                    if let Some(v) = parse_number(key, value) {
                        plan.threads = Some(v);
                    }
                }
                "patients" => plan.patients = Some(value.to_string()),
                "usestates" => use_states = value.eq_ignore_ascii_case("true"),
                "autoserialization" => {
                    auto_serialization = AutoSerialization::parse(value);
                    if auto_serialization.is_none() {
                        tracing::error!(value, "ignoring malformed AutoSerialization");
                    }
                }
                "executetests" => plan.execute_jobs = !value.eq_ignore_ascii_case("false"),
                "plotresults" => plan.plot_results = !value.eq_ignore_ascii_case("false"),
                "sendemail" => plan.send_email = !value.eq_ignore_ascii_case("false"),
                _ => {
                    let value = plan.expand_macros(value);
                    let mut job = plan.build_job(key, &value, &current_group, &registry);
                    job.percent_difference = percent_difference;
                    job.use_state = use_states;
                    job.auto_serialization = auto_serialization.clone();
                    if !plan.execute_jobs {
                        job.skip_execution = true;
                    }
                    if !plan.plot_results {
                        job.skip_plot = true;
                    }
                    plan.jobs.push(job);
                }
            }
        }

        if let Some(patients) = plan.patients.clone() {
            plan.expand_patients(&patients, patients_dir);
        }
        plan
    }

    /// Single left-to-right scan, trying longer names first at each position,
    /// so replacement text is never expanded again.
    fn expand_macros(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        'scan: while let Some(c) = rest.chars().next() {
            for (name, replacement) in &self.macros {
                if let Some(after) = rest.strip_prefix(name.as_str()) {
                    out.push_str(replacement);
                    rest = after;
                    continue 'scan;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
        out
    }

    fn build_job(
        &self,
        key: &str,
        value: &str,
        group: &str,
        registry: &ExecutorRegistry,
    ) -> TestJob {
        let mut key = key;
        let mut known_failure = false;
        let mut skip = false;
        if let Some(rest) = key.strip_prefix('*') {
            known_failure = true;
            key = rest;
        }
        if let Some(rest) = key.strip_prefix('-') {
            skip = true;
            key = rest;
        }

        let mut job = TestJob::new(key.trim().to_string(), group.to_string(), DEFAULT_PERCENT_DIFFERENCE);
        job.known_failure = known_failure;
        job.skip_execution = skip;
        job.skip_plot = skip;

        for directive in value.split_whitespace() {
            match directive.split_once('=') {
                None => {
                    if let Some(executor) = registry.get(directive) {
                        job.executor = Some(executor);
                        job.executor_name = Some(directive.to_string());
                        continue;
                    }
                    if directive.eq_ignore_ascii_case("NoCompare") {
                        job.plottable_results = false;
                    } else if let Ok(plot_type) = directive.parse() {
                        job.plottable_results = true;
                        job.plot_type = plot_type;
                    } else {
                        tracing::warn!(job = %job.name, directive, "ignoring unrecognized directive");
                    }
                }
                Some((k, v)) => match k.to_ascii_lowercase().as_str() {
                    "baseline" => job.baseline_directory = v.to_string(),
                    "computed" => job.computed_directory = v.to_string(),
                    "results" => {
                        job.results = v
                            .split(',')
                            .map(str::trim)
                            .filter(|r| !r.is_empty())
                            .map(str::to_string)
                            .collect();
                    }
                    _ => tracing::warn!(job = %job.name, directive, "ignoring unrecognized directive"),
                },
            }
        }

        job.derive_result_files();
        job
    }

    fn patient_files(selection: &str, patients_dir: &Path) -> Vec<String> {
        if selection.eq_ignore_ascii_case("all") {
            let mut files: Vec<String> = WalkDir::new(patients_dir)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
                })
                .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
                .collect();
            files.sort();
            return files;
        }
        selection
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                let file = p.rsplit(['/', '\\']).next().unwrap_or(p);
                if file.ends_with(".xml") {
                    file.to_string()
                } else {
                    format!("{file}.xml")
                }
            })
            .collect()
    }

    /// Clones every scenario job once per patient file.
    fn expand_patients(&mut self, selection: &str, patients_dir: &Path) {
        let patients = Self::patient_files(selection, patients_dir);
        if patients.is_empty() {
            tracing::warn!(patients = selection, dir = %patients_dir.display(), "no patient files found; running jobs as configured");
            return;
        }

        let configured = std::mem::take(&mut self.jobs);
        let mut kept_once = vec![false; configured.len()];
        for patient in &patients {
            for (i, job) in configured.iter().enumerate() {
                if !job.runs_scenarios() {
                    if !kept_once[i] {
                        kept_once[i] = true;
                        self.jobs.push(job.clone());
                    }
                    continue;
                }
                let mut copy = job.clone();
                copy.patient_file = Some(patient.clone());
                let base = copy.name.replace(".xml", &format!("-{patient}"));
                copy.derive_scenario_result_files(&base);
                self.jobs.push(copy);
            }
        }
    }

    /// Removes what a previous run of these jobs left behind.
    pub fn clean(&self) {
        for job in &self.jobs {
            crate::cleanup::clean_job(job, self.execute_jobs, self.plot_results);
        }
    }
}
