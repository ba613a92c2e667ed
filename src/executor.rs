//! Executor capability: whatever actually runs a test and writes its
//! computed result files.
//!
//! Executors are looked up by name from an [`ExecutorRegistry`]. Library users
//! register their own implementations; config files may also declare a
//! [`CommandExecutor`] with `Executor=Name,program args...`.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::state_machine::TestJob;

/// Runs one test job and produces its computed result files.
pub trait Executor: Send + Sync {
    /// Returns `Ok(true)` when the test ran and passed its own checks,
    /// `Ok(false)` when it ran but reported failure.
    fn execute(&self, job: &TestJob) -> Result<bool>;

    /// Scenario executors name their result files after the scenario path.
    fn runs_scenarios(&self) -> bool {
        false
    }
}

/// Name-keyed executors available to a config file.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Handles the value of an `Executor=` config line.
    ///
    /// `Name` must already be registered; `Name,program args...` registers a
    /// [`CommandExecutor`] under `Name`. Returns the registered name.
    pub fn declare(&mut self, value: &str) -> Result<String> {
        let (name, command) = match value.split_once(',') {
            Some((name, command)) => (name.trim(), Some(command.trim())),
            None => (value.trim(), None),
        };
        if name.is_empty() {
            bail!("executor declaration has no name");
        }
        // Fully qualified names resolve by their last segment.
        let short = name.rsplit(['.', ':']).next().unwrap_or(name).to_string();

        match command {
            Some(command) => {
                let executor = CommandExecutor::parse(&short, command)?;
                self.register(short.clone(), Arc::new(executor));
                Ok(short)
            }
            None if self.contains(&short) => Ok(short),
            None => bail!("could not find executor {name}"),
        }
    }
}

/// Launches an external program per job.
///
/// Arguments may reference `{job}`, `{computed}`, `{computed_dir}`,
/// `{baseline_dir}` and `{patient}`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    scenarios: bool,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>, scenarios: bool) -> Self {
        Self {
            program: program.into(),
            args,
            scenarios,
        }
    }

    /// Names containing `Scenario` run scenario files.
    pub fn parse(name: &str, command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .with_context(|| format!("executor {name} has an empty command"))?;
        Ok(Self::new(
            program,
            parts.map(str::to_string).collect(),
            name.contains("Scenario"),
        ))
    }

    fn expand(&self, arg: &str, job: &TestJob) -> String {
        let computed = job
            .computed_files
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        arg.replace("{job}", &job.name)
            .replace("{computed_dir}", &job.computed_directory)
            .replace("{baseline_dir}", &job.baseline_directory)
            .replace("{computed}", &computed)
            .replace("{patient}", job.patient_file.as_deref().unwrap_or(""))
    }
}

impl Executor for CommandExecutor {
    fn execute(&self, job: &TestJob) -> Result<bool> {
        let args: Vec<String> = self.args.iter().map(|a| self.expand(a, job)).collect();
        tracing::debug!(job = %job.name, program = %self.program, ?args, "launching executor");
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .with_context(|| format!("failed to launch {}", self.program))?;
        if !status.success() {
            tracing::warn!(job = %job.name, code = ?status.code(), "executor exited unsuccessfully");
        }
        Ok(status.success())
    }

    fn runs_scenarios(&self) -> bool {
        self.scenarios
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    impl Executor for Fixed {
        fn execute(&self, _job: &TestJob) -> Result<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn declare_known_name() {
        let mut registry = ExecutorRegistry::new();
        registry.register("UnitTestDriver", Arc::new(Fixed(true)));
        assert_eq!(
            registry.declare("mil.tatrc.physiology.testing.UnitTestDriver").unwrap(),
            "UnitTestDriver"
        );
    }

    #[test]
    fn declare_unknown_name_fails() {
        let mut registry = ExecutorRegistry::new();
        let err = registry.declare("Missing").unwrap_err();
        assert!(err.to_string().contains("could not find executor Missing"));
    }

    #[test]
    fn declare_command_registers() {
        let mut registry = ExecutorRegistry::new();
        let name = registry
            .declare("ScenarioTestDriver, engine --scenario {job} --out {computed}")
            .unwrap();
        assert_eq!(name, "ScenarioTestDriver");
        let executor = registry.get("ScenarioTestDriver").unwrap();
        assert!(executor.runs_scenarios());
    }

    #[test]
    fn declare_empty_command_fails() {
        let mut registry = ExecutorRegistry::new();
        assert!(registry.declare("Engine, ").is_err());
        assert!(registry.declare(",engine").is_err());
    }

    #[test]
    fn placeholders_expand() {
        let executor = CommandExecutor::parse("Engine", "engine {job} {computed_dir} {patient}").unwrap();
        let mut job = TestJob::new("Basic.xml".into(), "suite".into(), 2.0);
        job.computed_directory = "./out".into();
        job.patient_file = Some("StandardMale.xml".into());
        let expanded: Vec<String> = executor.args.iter().map(|a| executor.expand(a, &job)).collect();
        assert_eq!(expanded, vec!["Basic.xml", "./out", "StandardMale.xml"]);
        assert!(!executor.runs_scenarios());
    }

    #[cfg(unix)]
    #[test]
    fn command_exit_status_maps_to_outcome() {
        let job = TestJob::new("Unit".into(), "suite".into(), 2.0);
        assert!(CommandExecutor::new("true", vec![], false).execute(&job).unwrap());
        assert!(!CommandExecutor::new("false", vec![], false).execute(&job).unwrap());
        assert!(
            CommandExecutor::new("/nonexistent/engine", vec![], false)
                .execute(&job)
                .is_err()
        );
    }
}
