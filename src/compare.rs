//! Baseline comparison of CSV result files.
//!
//! [`CsvComparison`] diffs every baseline column against the same column of
//! the computed file under a percent-difference tolerance. Baselines may be
//! stored plain or zipped (the first `.csv`/`.txt` entry is used).

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::CompareError;
use crate::report::{TestCase, TestSuite};

/// Outcome of diffing one baseline/computed pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Names of the columns that exceeded the tolerance.
    pub failures: BTreeSet<String>,
    /// Per-column detail for the pair's report file.
    pub suite: TestSuite,
}

/// Compares a computed result file against its baseline.
pub trait Comparator: Send + Sync {
    fn compare(&self, baseline: &Path, computed: &Path, limit: f64)
    -> Result<Comparison, CompareError>;
}

/// Symmetric percent difference. Equal values (including two zeros and two
/// same-signed infinities) differ by 0%; a NaN or an infinity against
/// anything else differs infinitely.
pub fn percent_difference(expected: f64, computed: f64) -> f64 {
    if expected.is_nan() || computed.is_nan() {
        return if expected.is_nan() && computed.is_nan() {
            0.0
        } else {
            f64::INFINITY
        };
    }
    if expected == computed {
        return 0.0;
    }
    if expected.is_infinite() || computed.is_infinite() {
        return f64::INFINITY;
    }
    let average = (expected.abs() + computed.abs()) / 2.0;
    (expected - computed).abs() / average * 100.0
}

/// Column-oriented view of a result file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub headers: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl ResultTable {
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Loads a plain or zipped result file.
    pub fn load(path: &Path) -> Result<Self, CompareError> {
        let text = read_result_text(path)?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, CompareError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| CompareError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(CompareError::MissingHeader(path.to_path_buf()));
        }

        let mut columns = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(|source| CompareError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            for (i, column) in columns.iter_mut().enumerate() {
                let value = record
                    .get(i)
                    .and_then(|field| field.parse::<f64>().ok())
                    .unwrap_or(f64::NAN);
                column.push(value);
            }
        }
        Ok(Self { headers, columns })
    }
}

fn read_result_text(path: &Path) -> Result<String, CompareError> {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return fs::read_to_string(path).map_err(|source| CompareError::Read {
            path: path.to_path_buf(),
            source,
        });
    }

    let file = File::open(path).map_err(|source| CompareError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let archive_err = |source: zip::result::ZipError| CompareError::Archive {
        path: path.to_path_buf(),
        source,
    };
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        let name = entry.name().to_ascii_lowercase();
        if !entry.is_dir() && (name.ends_with(".csv") || name.ends_with(".txt")) {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|source| CompareError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            return Ok(text);
        }
    }
    Err(CompareError::EmptyArchive(path.to_path_buf()))
}

/// Built-in CSV comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvComparison;

/// Failure label used when the two files disagree on row count.
pub const ROW_COUNT: &str = "RowCount";

impl Comparator for CsvComparison {
    fn compare(
        &self,
        baseline: &Path,
        computed: &Path,
        limit: f64,
    ) -> Result<Comparison, CompareError> {
        let expected = ResultTable::load(baseline)?;
        let actual = ResultTable::load(computed)?;

        let suite_name = computed
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| computed.display().to_string());
        let mut suite = TestSuite::new(suite_name);
        let mut failures = BTreeSet::new();

        let rows = expected.rows().min(actual.rows());
        if expected.rows() != actual.rows() {
            failures.insert(ROW_COUNT.to_string());
            suite.test_cases.push(TestCase {
                name: ROW_COUNT.to_string(),
                failures: vec![format!(
                    "baseline has {} rows, computed has {}",
                    expected.rows(),
                    actual.rows()
                )],
            });
        }

        for (header, baseline_values) in expected.headers.iter().zip(&expected.columns) {
            let mut case = TestCase {
                name: header.clone(),
                failures: Vec::new(),
            };
            match actual.column(header) {
                None => case.failures.push("missing from computed results".to_string()),
                Some(computed_values) => {
                    let worst = (0..rows)
                        .map(|row| {
                            let diff = percent_difference(baseline_values[row], computed_values[row]);
                            (row, if diff.is_nan() { f64::INFINITY } else { diff })
                        })
                        .fold(None, |worst: Option<(usize, f64)>, (row, diff)| match worst {
                            Some((_, max)) if max.total_cmp(&diff).is_ge() => worst,
                            _ => Some((row, diff)),
                        });
                    if let Some((row, diff)) = worst.filter(|(_, diff)| *diff > limit) {
                        case.failures.push(format!(
                            "max difference {diff:.3}% at row {row} exceeds {limit}%"
                        ));
                    }
                }
            }
            if !case.failures.is_empty() {
                failures.insert(header.clone());
            }
            suite.test_cases.push(case);
        }

        Ok(Comparison { failures, suite })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const BASELINE: &str = "Time(s),HeartRate(1/min),MeanArterialPressure(mmHg)\n\
                            0.0,72.0,90.0\n\
                            0.02,72.5,90.5\n\
                            0.04,73.0,91.0\n";

    #[test]
    fn percent_difference_rules() {
        assert_eq!(percent_difference(0.0, 0.0), 0.0);
        assert_eq!(percent_difference(10.0, 10.0), 0.0);
        assert!((percent_difference(100.0, 102.0) - 1.980198).abs() < 1e-5);
        assert_eq!(percent_difference(f64::NAN, 1.0), f64::INFINITY);
        assert_eq!(percent_difference(f64::NAN, f64::NAN), 0.0);
        assert_eq!(percent_difference(0.0, 1e-9), 200.0);
        assert_eq!(percent_difference(f64::INFINITY, 1.0), f64::INFINITY);
        assert_eq!(percent_difference(1.0, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(percent_difference(f64::INFINITY, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(percent_difference(f64::INFINITY, f64::INFINITY), 0.0);
    }

    #[test]
    fn infinite_cells_do_not_mask_failures() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.csv");
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&baseline, "Time(s),A,B\n0,100,5\n1,inf,5\n").unwrap();
        fs::write(&computed, "Time(s),A,B\n0,110,5\n1,1,-inf\n").unwrap();

        let result = CsvComparison.compare(&baseline, &computed, 2.0).unwrap();
        let failures: Vec<&str> = result.failures.iter().map(String::as_str).collect();
        assert_eq!(failures, vec!["A", "B"]);
        let case = result.suite.test_cases.iter().find(|c| c.name == "A").unwrap();
        assert!(case.failures[0].contains("row 1"));
    }

    #[test]
    fn identical_files_pass() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.csv");
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&baseline, BASELINE).unwrap();
        fs::write(&computed, BASELINE).unwrap();

        let result = CsvComparison.compare(&baseline, &computed, 2.0).unwrap();
        assert!(result.failures.is_empty());
        assert_eq!(result.suite.name, "BasicResults");
        assert_eq!(result.suite.test_cases.len(), 3);
        assert!(result.suite.passed());
    }

    #[test]
    fn drifting_and_missing_columns_fail() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.csv");
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&baseline, BASELINE).unwrap();
        fs::write(
            &computed,
            "Time(s),HeartRate(1/min)\n0.0,72.0\n0.02,80.0\n0.04,73.0\n",
        )
        .unwrap();

        let result = CsvComparison.compare(&baseline, &computed, 2.0).unwrap();
        let failures: Vec<&str> = result.failures.iter().map(String::as_str).collect();
        assert_eq!(failures, vec!["HeartRate(1/min)", "MeanArterialPressure(mmHg)"]);
        assert!(!result.suite.passed());
    }

    #[test]
    fn row_count_mismatch_is_reported() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.csv");
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&baseline, BASELINE).unwrap();
        fs::write(&computed, "Time(s),HeartRate(1/min),MeanArterialPressure(mmHg)\n0.0,72.0,90.0\n").unwrap();

        let result = CsvComparison.compare(&baseline, &computed, 2.0).unwrap();
        assert!(result.failures.contains(ROW_COUNT));
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn zipped_baseline_is_read() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.zip");
        let computed = dir.path().join("BasicResults.txt");
        {
            let file = File::create(&baseline).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("BasicResults.txt", options).unwrap();
            zip.write_all(BASELINE.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        fs::write(&computed, BASELINE).unwrap();

        let result = CsvComparison.compare(&baseline, &computed, 2.0).unwrap();
        assert!(result.failures.is_empty());
    }

    #[test]
    fn unreadable_inputs_are_errors() {
        let dir = tempdir().unwrap();
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&computed, BASELINE).unwrap();

        let missing = CsvComparison.compare(&dir.path().join("nope.csv"), &computed, 2.0);
        assert!(matches!(missing, Err(CompareError::Read { .. })));

        let bad_zip = dir.path().join("bad.zip");
        fs::write(&bad_zip, "not a zip").unwrap();
        let archive = CsvComparison.compare(&bad_zip, &computed, 2.0);
        assert!(matches!(archive, Err(CompareError::Archive { .. })));
    }

    #[test]
    fn non_numeric_cells_become_nan() {
        let table = ResultTable::parse(Path::new("t.csv"), "A,B\n1,x\n2,3\n").unwrap();
        assert_eq!(table.rows(), 2);
        assert!(table.column("B").unwrap()[0].is_nan());
        assert_eq!(table.column("A").unwrap(), &[1.0, 2.0]);
    }
}
