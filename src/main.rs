use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use test_driver::cli::{Cli, Command, RunArgs};
use test_driver::compare::CsvComparison;
use test_driver::config::DriverSettings;
use test_driver::email::{self, Mailer};
use test_driver::executor::ExecutorRegistry;
use test_driver::orchestrator::{JobOrchestrator, worker_budget};
use test_driver::plan::TestPlan;
use test_driver::plot::CsvPlotter;
use test_driver::report::{RunInfo, RunSummary, summarize_jobs};
use test_driver::state_machine::JobRecord;
use test_driver::ui::{self, RunProgress};
use test_driver::{git, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => DriverSettings::load_from(path)?,
        None => DriverSettings::load()?,
    };
    let registry = ExecutorRegistry::new();

    match cli.command {
        Command::Plan { config } => {
            logging::init(&settings, cli.verbose, None)?;
            let plan = TestPlan::load(&config, &registry, &settings.patients_dir)?;
            ui::print_plan(&plan);
        }
        Command::Clean { config } => {
            logging::init(&settings, cli.verbose, None)?;
            let plan = TestPlan::load(&config, &registry, &settings.patients_dir)?;
            plan.clean();
            tracing::info!(jobs = plan.jobs.len(), "cleaned previous results");
        }
        Command::Run { config, args } => {
            run(&config, args, &settings, &registry, cli.verbose)?;
        }
    }
    Ok(())
}

fn run(
    config: &Path,
    args: RunArgs,
    settings: &DriverSettings,
    registry: &ExecutorRegistry,
    verbose: bool,
) -> Result<()> {
    let run_name = config.with_extension("").display().to_string();
    logging::init(settings, verbose, Some(&logging::log_file_for(&run_name)))?;

    let plan = TestPlan::load(config, registry, &settings.patients_dir)
        .with_context(|| format!("unable to load {}", config.display()))?;
    if !args.keep_results {
        plan.clean();
    }

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let requested = args.threads.or(plan.threads).or(settings.threads).unwrap_or(0);
    let budget = worker_budget(requested, available);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(budget)
        .build()
        .context("failed to start the async runtime")?;

    let progress = Arc::new(if console::Term::stderr().is_term() && !verbose {
        RunProgress::start(plan.jobs.len())
    } else {
        RunProgress::hidden()
    });
    let orchestrator = JobOrchestrator::new(budget, Arc::new(CsvComparison), Arc::new(CsvPlotter))
        .with_tick(Duration::from_millis(settings.tick_interval_ms))
        .with_observer(progress.clone());

    runtime.block_on(async {
        let jobs = orchestrator.run(plan.jobs.clone()).await;
        for job in &jobs {
            let record = serde_json::to_string(&JobRecord::from_job(job))?;
            tracing::debug!(job = %job.name, %record, "job record");
        }

        let (report, groups) = summarize_jobs(&jobs);
        let commit_hash = args
            .commit
            .clone()
            .unwrap_or_else(|| git::commit_hash_or_empty(Path::new(".")));
        let info = RunInfo {
            name: plan.name.clone(),
            commit_hash,
            environment: args.environment.clone(),
            architecture: args.architecture.clone(),
            hostname: email::hostname(),
        };
        let summary = RunSummary::new(info, report, groups);
        summary.write()?;
        progress.finish(&summary);

        if plan.send_email && !args.no_email {
            if let Some(mailer) = Mailer::new(&plan.email, settings) {
                if let Err(e) = mailer.send(&summary).await {
                    tracing::error!(error = %e, "unable to send summary email");
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
