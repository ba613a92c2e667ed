//! Test report model shared by comparison output and the run summary.
//!
//! A [`TestReport`] is an ordered list of [`TestSuite`]s. Each comparison
//! writes one report per result file; the summary step reads them back and
//! folds them into a single report grouped by config `@group`.

mod render;
mod summary;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

pub use render::{to_html, to_xml};
pub use summary::{GroupMap, RunInfo, RunSummary, summarize_jobs};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl TestCase {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub performed: bool,
    #[serde(default)]
    pub known_failure: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            performed: true,
            known_failure: false,
            errors: Vec::new(),
            test_cases: Vec::new(),
        }
    }

    /// A suite that could not be run; named after the problem it reports.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: message.clone(),
            performed: false,
            known_failure: false,
            errors: vec![message],
            test_cases: Vec::new(),
        }
    }

    pub fn known_failure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            performed: false,
            known_failure: true,
            errors: Vec::new(),
            test_cases: Vec::new(),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.test_cases.iter().filter(|c| !c.passed()).count() + self.errors.len()
    }

    pub fn passed(&self) -> bool {
        self.performed && self.failure_count() == 0
    }
}

/// Ordered collection of suites, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub suites: Vec<TestSuite>,
}

impl TestReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_suite(&mut self, suite: TestSuite) {
        self.suites.push(suite);
    }

    pub fn create_error_suite(&mut self, message: impl Into<String>) {
        self.suites.push(TestSuite::error(message));
    }

    pub fn add_known_suite_failure(&mut self, name: impl Into<String>) {
        self.suites.push(TestSuite::known_failure(name));
    }

    pub fn passed_count(&self) -> usize {
        self.suites.iter().filter(|s| s.passed()).count()
    }

    pub fn known_failure_count(&self) -> usize {
        self.suites.iter().filter(|s| s.known_failure).count()
    }

    pub fn failed_count(&self) -> usize {
        self.suites.len() - self.passed_count() - self.known_failure_count()
    }

    /// Writes the report, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reads a report written by [`TestReport::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            DriverError::Report(format!("{} is not a test report: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failing_suite() -> TestSuite {
        let mut suite = TestSuite::new("HeartRate");
        suite.test_cases.push(TestCase {
            name: "HeartRate(1/min)".into(),
            failures: vec!["max difference 4.1% exceeds 2%".into()],
        });
        suite.test_cases.push(TestCase {
            name: "MeanArterialPressure(mmHg)".into(),
            failures: vec![],
        });
        suite
    }

    #[test]
    fn suite_pass_rules() {
        assert!(TestSuite::new("Empty").passed());
        assert!(!failing_suite().passed());
        assert_eq!(failing_suite().failure_count(), 1);
        assert!(!TestSuite::error("boom").passed());
        assert!(!TestSuite::known_failure("Known").passed());
    }

    #[test]
    fn report_counts() {
        let mut report = TestReport::new();
        report.add_suite(TestSuite::new("Good"));
        report.add_suite(failing_suite());
        report.add_known_suite_failure("Known");
        report.create_error_suite("Unable to find file x to summarize");
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.known_failure_count(), 1);
        assert_eq!(report.failed_count(), 2);
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/PatientReport.json");
        let mut report = TestReport::new();
        report.add_suite(failing_suite());
        report.write(&path).unwrap();
        assert_eq!(TestReport::read(&path).unwrap(), report);
    }

    #[test]
    fn read_rejects_other_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.json");
        fs::write(&path, r#"{"patient":"StandardMale"}"#).unwrap();
        let err = TestReport::read(&path).unwrap_err();
        assert!(err.to_string().contains("is not a test report"));
    }
}
