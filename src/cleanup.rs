//! Removal of artifacts left behind by a previous run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::state_machine::TestJob;

/// Suffixes produced when a test executes.
const EXECUTION_ARTIFACTS: &[&str] = &[
    ".log",
    "Test.log",
    ".txt",
    ".xml",
    "Test.xml",
    "Report.xml",
    "Report.json",
    "Results.txt",
];

fn with_suffix(hint: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{hint}{suffix}"))
}

fn remove(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "unable to remove stale artifact"),
    }
}

/// Deletes every file a test named by `hint` may have produced.
///
/// `.xml`/`.txt` are stripped from the hint first so that scenario names
/// and computed file names both work. Execution artifacts go when `execute`
/// is set; plot directories when `plot` is set.
pub fn delete_test_results(hint: &Path, execute: bool, plot: bool) {
    let hint = hint
        .to_string_lossy()
        .replace(".xml", "")
        .replace(".txt", "");
    let bare = hint.trim_end_matches(['/', '\\']);
    if bare.is_empty() || bare == "." || bare == ".." || bare != hint {
        tracing::warn!(hint = %hint, "refusing to clean a directory hint");
        return;
    }

    if execute {
        for suffix in EXECUTION_ARTIFACTS {
            remove(&with_suffix(&hint, suffix));
        }
    }
    if plot {
        remove(Path::new(&hint));
        remove(&with_suffix(&hint, "Results"));
    }
}

/// Cleans a job's own hint and each of its computed files.
pub fn clean_job(job: &TestJob, execute: bool, plot: bool) {
    delete_test_results(&job.cleanup_hint(), execute, plot);
    for computed in &job.computed_files {
        delete_test_results(computed, execute, plot);
    }
}
