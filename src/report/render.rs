use askama::Template;

use super::{GroupMap, TestReport, TestSuite};
use crate::error::Result;

#[derive(Template)]
#[template(path = "report.xml")]
struct ReportXml<'a> {
    report: &'a TestReport,
}

#[derive(Template)]
#[template(path = "summary.html")]
struct SummaryHtml<'a> {
    report: &'a TestReport,
    sections: Vec<Section<'a>>,
}

/// One titled table of the email body.
struct Section<'a> {
    title: &'a str,
    rows: Vec<SuiteRow<'a>>,
}

struct SuiteRow<'a> {
    name: &'a str,
    status: Status,
    failures: usize,
}

impl<'a> SuiteRow<'a> {
    fn new(suite: &'a TestSuite) -> Self {
        Self {
            name: &suite.name,
            status: Status::of(suite),
            failures: suite.failure_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Passed,
    Failed,
    KnownFailure,
}

impl Status {
    fn of(suite: &TestSuite) -> Self {
        if suite.known_failure {
            Status::KnownFailure
        } else if suite.passed() {
            Status::Passed
        } else {
            Status::Failed
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Status::Passed => "Passed",
            Status::Failed => "Failed",
            Status::KnownFailure => "Known Failure",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Status::Passed => "#00FF00",
            Status::Failed => "#FF0000",
            Status::KnownFailure => "#FFFF00",
        }
    }
}

/// Renders the report as a `TestReport` XML document.
pub fn to_xml(report: &TestReport) -> Result<String> {
    Ok(ReportXml { report }.render()?)
}

/// Splits the suites into one section per group, then an `Other` section
/// for anything (error and known-failure suites) no group claimed.
fn sections<'a>(report: &'a TestReport, groups: &'a GroupMap) -> Vec<Section<'a>> {
    let mut claimed = vec![false; report.suites.len()];
    let mut sections = Vec::new();
    for (group, names) in groups.iter() {
        if names.is_empty() {
            continue;
        }
        let mut rows = Vec::new();
        for name in names {
            let found = report
                .suites
                .iter()
                .enumerate()
                .find(|(i, s)| !claimed[*i] && &s.name == name);
            if let Some((i, suite)) = found {
                claimed[i] = true;
                rows.push(SuiteRow::new(suite));
            }
        }
        sections.push(Section { title: group, rows });
    }

    let rest: Vec<SuiteRow<'a>> = report
        .suites
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(suite, _)| SuiteRow::new(suite))
        .collect();
    if !rest.is_empty() {
        sections.push(Section {
            title: "Other",
            rows: rest,
        });
    }
    sections
}

/// HTML body for the summary email.
pub fn to_html(report: &TestReport, groups: &GroupMap) -> Result<String> {
    let sections = sections(report, groups);
    Ok(SummaryHtml { report, sections }.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TestCase;

    fn sample() -> (TestReport, GroupMap) {
        let mut report = TestReport::new();
        let mut failing = TestSuite::new("Cardio<1>");
        failing.test_cases.push(TestCase {
            name: "HeartRate".into(),
            failures: vec!["4.1% > 2%".into()],
        });
        report.add_suite(TestSuite::new("Renal"));
        report.add_suite(failing);
        report.add_known_suite_failure("Sepsis");

        let mut groups = GroupMap::default();
        groups.entry("Scenarios").push("Renal".into());
        groups.entry("Scenarios").push("Cardio<1>".into());
        (report, groups)
    }

    #[test]
    fn xml_lists_suites_and_failures() {
        let (report, _) = sample();
        let xml = to_xml(&report).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<TestReport suites=\"3\" passed=\"1\" failed=\"1\" knownFailures=\"1\">"));
        assert!(xml.contains("<TestSuite name=\"Cardio&lt;1&gt;\""));
        assert!(xml.contains("<Failure>4.1% &gt; 2%</Failure>"));
        assert!(xml.contains("<TestCase name=\"HeartRate\">"));
        assert!(xml.trim_end().ends_with("</TestReport>"));
    }

    #[test]
    fn html_groups_and_leftovers() {
        let (report, groups) = sample();
        let html = to_html(&report, &groups).unwrap();
        assert!(html.contains("<h2>Scenarios</h2>"));
        assert!(html.contains("<h2>Other</h2>"));
        assert!(html.contains("<td bgcolor=\"#FFFF00\">Known Failure</td>"));
        assert!(html.contains("<td>Cardio&lt;1&gt;</td><td bgcolor=\"#FF0000\">Failed</td><td>1</td>"));
        assert!(html.contains("<p>3 suites: 1 passed, 1 failed, 1 known failures</p>"));
    }

    #[test]
    fn group_without_suites_is_skipped() {
        let (report, _) = sample();
        let mut groups = GroupMap::default();
        groups.entry("Empty");
        let html = to_html(&report, &groups).unwrap();
        assert!(!html.contains("<h2>Empty</h2>"));
        assert_eq!(html.matches("<tr><td>").count(), 3);
    }
}
