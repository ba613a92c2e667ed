//! Comparison plot data.
//!
//! Rendering charts is left to external tooling; [`CsvPlotter`] writes the
//! series such a tool needs, one file per column, into the directory named
//! after the computed file (`Scenarios/BasicResults.txt` →
//! `Scenarios/BasicResults/`).

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim, Writer};

use crate::compare::ResultTable;
use crate::state_machine::PlotType;

/// Inputs of one comparison plot.
#[derive(Debug, Clone, Copy)]
pub struct PlotRequest<'a> {
    /// `None` when no baseline exists for the computed file.
    pub baseline: Option<&'a Path>,
    pub computed: &'a Path,
    /// Failing columns, when a comparison ran.
    pub failures: Option<&'a BTreeSet<String>>,
    pub plot_type: PlotType,
}

impl PlotRequest<'_> {
    pub fn output_dir(&self) -> PathBuf {
        self.computed.with_extension("")
    }

    fn wants(&self, column: &str) -> bool {
        if !self.plot_type.only_on_errors() {
            return true;
        }
        self.failures.is_some_and(|f| f.contains(column))
    }
}

pub trait Plotter: Send + Sync {
    /// Produces plots for one pair, returning how many were written.
    fn plot(&self, request: &PlotRequest<'_>) -> Result<usize>;
}

/// Writes `<column>.csv` series with `x,Baseline,Computed` columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvPlotter;

fn file_name_for(column: &str) -> String {
    let cleaned: String = column
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{cleaned}.csv")
}

fn fmt_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => String::new(),
    }
}

impl CsvPlotter {
    fn plot_loaded(&self, request: &PlotRequest<'_>, dir: &Path) -> Result<usize> {
        let computed = ResultTable::load(request.computed)
            .with_context(|| format!("unable to load {}", request.computed.display()))?;
        let baseline = match request.baseline {
            Some(path) => Some(
                ResultTable::load(path)
                    .with_context(|| format!("unable to load {}", path.display()))?,
            ),
            None => None,
        };
        let Some(x_name) = computed.headers.first() else {
            return Ok(0);
        };
        let x = &computed.columns[0];
        let stride = request.plot_type.stride();

        let mut written = 0;
        for (name, values) in computed.headers.iter().zip(&computed.columns).skip(1) {
            if !request.wants(name) {
                continue;
            }
            let expected = baseline.as_ref().and_then(|b| b.column(name));
            let mut writer = Writer::from_path(dir.join(file_name_for(name)))?;
            writer.write_record([x_name.as_str(), "Baseline", "Computed"])?;
            for row in (0..values.len()).step_by(stride) {
                writer.write_record([
                    fmt_value(x.get(row).copied()),
                    fmt_value(expected.and_then(|e| e.get(row).copied())),
                    fmt_value(Some(values[row])),
                ])?;
            }
            writer.flush()?;
            written += 1;
        }
        Ok(written)
    }

    /// Walks both files in lockstep so neither is held in memory.
    fn plot_streamed(&self, request: &PlotRequest<'_>, dir: &Path) -> Result<usize> {
        let open = |path: &Path| -> Result<csv::Reader<File>> {
            ReaderBuilder::new()
                .trim(Trim::All)
                .flexible(true)
                .from_path(path)
                .with_context(|| format!("unable to open {}", path.display()))
        };
        let mut computed = open(request.computed)?;
        let computed_headers = computed.headers()?.clone();
        let mut baseline = request.baseline.map(open).transpose()?;
        let baseline_headers = match baseline.as_mut() {
            Some(reader) => Some(reader.headers()?.clone()),
            None => None,
        };
        let Some(x_name) = computed_headers.get(0) else {
            return Ok(0);
        };

        // (computed index, baseline index, writer)
        let mut series = Vec::new();
        for (i, name) in computed_headers.iter().enumerate().skip(1) {
            if !request.wants(name) {
                continue;
            }
            let baseline_idx = baseline_headers
                .as_ref()
                .and_then(|h| h.iter().position(|b| b == name));
            let mut writer = Writer::from_path(dir.join(file_name_for(name)))?;
            writer.write_record([x_name, "Baseline", "Computed"])?;
            series.push((i, baseline_idx, writer));
        }

        let stride = request.plot_type.stride();
        let mut computed_row = StringRecord::new();
        let mut baseline_row = StringRecord::new();
        let mut row = 0usize;
        while computed.read_record(&mut computed_row)? {
            let have_baseline = match baseline.as_mut() {
                Some(reader) => reader.read_record(&mut baseline_row)?,
                None => false,
            };
            if row % stride == 0 {
                for (i, baseline_idx, writer) in &mut series {
                    let expected = (*baseline_idx)
                        .filter(|_| have_baseline)
                        .and_then(|b| baseline_row.get(b))
                        .unwrap_or("");
                    writer.write_record([
                        computed_row.get(0).unwrap_or(""),
                        expected,
                        computed_row.get(*i).unwrap_or(""),
                    ])?;
                }
            }
            row += 1;
        }

        let written = series.len();
        for (_, _, mut writer) in series {
            writer.flush()?;
        }
        Ok(written)
    }
}

impl Plotter for CsvPlotter {
    fn plot(&self, request: &PlotRequest<'_>) -> Result<usize> {
        let dir = request.output_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create plot directory {}", dir.display()))?;
        // Zipped baselines have to be unpacked, so they never stream.
        let zipped = request
            .baseline
            .and_then(Path::extension)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        match request.plot_type {
            PlotType::MemoryFastPlot if !zipped => self.plot_streamed(request, &dir),
            _ => self.plot_loaded(request, &dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BASELINE: &str = "Time(s),HeartRate(1/min),Pressure(mmHg)\n\
                            0,70,90\n1,71,91\n2,72,92\n3,73,93\n4,74,94\n5,75,95\n6,76,96\n";
    const COMPUTED: &str = "Time(s),HeartRate(1/min),Pressure(mmHg)\n\
                            0,70,90\n1,71,91\n2,72,92\n3,83,93\n4,74,94\n5,75,95\n6,76,96\n";

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("Basic.csv");
        let computed = dir.path().join("BasicResults.txt");
        fs::write(&baseline, BASELINE).unwrap();
        fs::write(&computed, COMPUTED).unwrap();
        (dir, baseline, computed)
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn full_plot_writes_every_row() {
        let (dir, baseline, computed) = fixture();
        let request = PlotRequest {
            baseline: Some(&baseline),
            computed: &computed,
            failures: None,
            plot_type: PlotType::FullPlot,
        };
        assert_eq!(CsvPlotter.plot(&request).unwrap(), 2);
        let series = lines(&dir.path().join("BasicResults/HeartRate(1_min).csv"));
        assert_eq!(series[0], "Time(s),Baseline,Computed");
        assert_eq!(series.len(), 8);
        assert_eq!(series[4], "3,73,83");
    }

    #[test]
    fn fast_plot_subsamples() {
        let (dir, baseline, computed) = fixture();
        let request = PlotRequest {
            baseline: Some(&baseline),
            computed: &computed,
            failures: None,
            plot_type: PlotType::FastPlot,
        };
        CsvPlotter.plot(&request).unwrap();
        let series = lines(&dir.path().join("BasicResults/Pressure(mmHg).csv"));
        assert_eq!(series, vec!["Time(s),Baseline,Computed", "0,90,90", "5,95,95"]);
    }

    #[test]
    fn error_modes_plot_failures_only() {
        let (dir, baseline, computed) = fixture();
        let failures: BTreeSet<String> = ["HeartRate(1/min)".to_string()].into();
        let request = PlotRequest {
            baseline: Some(&baseline),
            computed: &computed,
            failures: Some(&failures),
            plot_type: PlotType::FullPlotErrors,
        };
        assert_eq!(CsvPlotter.plot(&request).unwrap(), 1);
        assert!(!dir.path().join("BasicResults/Pressure(mmHg).csv").exists());
    }

    #[test]
    fn streamed_plot_matches_fast_plot() {
        let (dir, baseline, computed) = fixture();
        let request = PlotRequest {
            baseline: Some(&baseline),
            computed: &computed,
            failures: None,
            plot_type: PlotType::MemoryFastPlot,
        };
        assert_eq!(CsvPlotter.plot(&request).unwrap(), 2);
        let series = lines(&dir.path().join("BasicResults/Pressure(mmHg).csv"));
        assert_eq!(series, vec!["Time(s),Baseline,Computed", "0,90,90", "5,95,95"]);
    }

    #[test]
    fn missing_baseline_plots_computed_only() {
        let (dir, _, computed) = fixture();
        let request = PlotRequest {
            baseline: None,
            computed: &computed,
            failures: None,
            plot_type: PlotType::FastPlot,
        };
        CsvPlotter.plot(&request).unwrap();
        let series = lines(&dir.path().join("BasicResults/Pressure(mmHg).csv"));
        assert_eq!(series[1], "0,,90");
    }
}
