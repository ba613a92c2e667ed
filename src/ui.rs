//! Interface de terminal do test-driver: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente a
//! bateria de testes enquanto o scheduler avança os jobs.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::JobObserver;
use crate::plan::TestPlan;
use crate::report::RunSummary;
use crate::state_machine::{JobState, TestJob};

/// Indicador visual de progresso da bateria de testes no terminal.
///
/// A barra conta jobs concluídos; a mensagem mostra o último job que
/// mudou de estado e quantos workers estão ocupados.
pub struct RunProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para falha.
    red: Style,
    // Estilo amarelo para falhas conhecidas.
    yellow: Style,
}

impl RunProgress {
    /// Cria a barra com o total de jobs da bateria.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Barra sem saída, para quando o terminal não é interativo.
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
            green: Style::new(),
            red: Style::new(),
            yellow: Style::new(),
        }
    }

    /// Finaliza a barra e imprime o resumo colorido da execução.
    pub fn finish(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        let report = &summary.report;
        println!(
            "  {} passed, {} failed, {} known failures ({} suites)",
            self.green.apply_to(report.passed_count()),
            self.red.apply_to(report.failed_count()),
            self.yellow.apply_to(report.known_failure_count()),
            report.suites.len()
        );
        for suite in report.suites.iter().filter(|s| !s.passed() && !s.known_failure) {
            println!("  {} {}", self.red.apply_to("✗"), suite.name);
        }
        println!("  Report: {}", summary.xml_path().display());
    }
}

impl JobObserver for RunProgress {
    fn job_changed(&self, job: &TestJob, active: usize) {
        self.pb.set_message(format!("{} {} ({active} active)", job.state, job.name));
        if job.state == JobState::Complete {
            self.pb.inc(1);
            if job.failure.is_some() {
                self.pb.println(format!(
                    "  {} {} failed to execute",
                    self.red.apply_to("✗"),
                    job.name
                ));
            }
        }
    }
}

/// Imprime os jobs de um plano sem executá-los.
pub fn print_plan(plan: &TestPlan) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    println!("{} ({} jobs)", bold.apply_to(&plan.name), plan.jobs.len());
    let mut group = None;
    for job in &plan.jobs {
        if group != Some(job.group.as_str()) {
            group = Some(job.group.as_str());
            println!("  @group {}", bold.apply_to(&job.group));
        }
        let mut flags = Vec::new();
        if job.known_failure {
            flags.push("known-failure");
        }
        if job.skip_execution {
            flags.push("skip-execution");
        }
        if job.plottable_results {
            flags.push("compare");
        }
        println!(
            "    {} {} {}",
            job.name,
            dim.apply_to(job.executor_name.as_deref().unwrap_or("<no executor>")),
            dim.apply_to(flags.join(","))
        );
        for (baseline, computed) in job.baseline_files.iter().zip(&job.computed_files) {
            println!(
                "      {} ↔ {}",
                dim.apply_to(baseline.display()),
                computed.display()
            );
        }
    }
}
