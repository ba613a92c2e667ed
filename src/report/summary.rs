use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TestReport, render};
use crate::error::Result;
use crate::state_machine::TestJob;

/// Group name → suite names, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMap(Vec<(String, Vec<String>)>);

impl GroupMap {
    pub fn entry(&mut self, group: &str) -> &mut Vec<String> {
        let idx = match self.0.iter().position(|(name, _)| name == group) {
            Some(idx) => idx,
            None => {
                self.0.push((group.to_string(), Vec::new()));
                self.0.len() - 1
            }
        };
        &mut self.0[idx].1
    }

    pub fn get(&self, group: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, suites)| suites.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(name, suites)| (name.as_str(), suites.as_slice()))
    }
}

/// Where and from what a run was produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInfo {
    /// Config file path without its extension.
    pub name: String,
    pub commit_hash: String,
    pub environment: String,
    pub architecture: String,
    pub hostname: String,
}

/// Folds every job's report files into one report.
///
/// Known failures contribute a known-failure suite; missing or unreadable
/// report files contribute error suites. Nothing here fails the run.
pub fn summarize_jobs(jobs: &[TestJob]) -> (TestReport, GroupMap) {
    let mut report = TestReport::new();
    let mut groups = GroupMap::default();

    for job in jobs {
        let current = groups.entry(&job.group);

        if job.known_failure {
            report.add_known_suite_failure(job.name.clone());
            continue;
        }
        if job.report_files.is_empty() {
            report.create_error_suite(format!("No reports found for {} to summarize", job.name));
            continue;
        }
        for report_file in &job.report_files {
            if !report_file.exists() {
                report.create_error_suite(format!(
                    "Unable to find file {} to summarize",
                    report_file.display()
                ));
                continue;
            }
            match TestReport::read(report_file) {
                Ok(summarize) => {
                    for suite in summarize.suites {
                        current.push(suite.name.clone());
                        report.add_suite(suite);
                    }
                }
                Err(e) => {
                    tracing::error!(job = %job.name, file = %report_file.display(), error = %e, "need a file holding a test report");
                    report.create_error_suite(report_file.display().to_string());
                }
            }
        }
    }

    (report, groups)
}

/// The aggregated outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub info: RunInfo,
    pub report: TestReport,
    pub groups: GroupMap,
}

impl RunSummary {
    pub fn new(info: RunInfo, report: TestReport, groups: GroupMap) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            info,
            report,
            groups,
        }
    }

    pub fn json_path(&self) -> PathBuf {
        PathBuf::from(format!("{}Report.json", self.info.name))
    }

    pub fn xml_path(&self) -> PathBuf {
        PathBuf::from(format!("{}Report.xml", self.info.name))
    }

    /// Writes `<name>Report.json` and `<name>Report.xml`.
    pub fn write(&self) -> Result<()> {
        fs::write(self.json_path(), serde_json::to_string_pretty(self)?)?;
        fs::write(self.xml_path(), render::to_xml(&self.report)?)?;
        tracing::info!(
            report = %self.xml_path().display(),
            passed = self.report.passed_count(),
            failed = self.report.failed_count(),
            known = self.report.known_failure_count(),
            "report written"
        );
        Ok(())
    }

    pub fn to_html(&self) -> Result<String> {
        render::to_html(&self.report, &self.groups)
    }
}
