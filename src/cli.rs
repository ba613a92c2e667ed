//! Interface de linha de comando do test-driver baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, clean, plan)
//! e flags globais (--settings, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// test-driver: executa baterias de regressão e compara resultados com baselines.
#[derive(Debug, Parser)]
#[command(name = "test-driver", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração da máquina (padrão: ./test-driver.toml).
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Identificação do build testado, usada no relatório e no email.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Hash do commit testado; se omitido, usa o HEAD do repositório atual.
    #[arg(long)]
    pub commit: Option<String>,

    /// Ambiente de build (ex.: Linux, Windows).
    #[arg(long, default_value = "")]
    pub environment: String,

    /// Arquitetura de build (ex.: x64).
    #[arg(long, default_value = "")]
    pub architecture: String,

    /// Número de workers; valores <= 0 subtraem do total de CPUs.
    #[arg(long, allow_negative_numbers = true)]
    pub threads: Option<i32>,

    /// Não envia o email de resumo, mesmo se configurado.
    #[arg(long, default_value_t = false)]
    pub no_email: bool,

    /// Não apaga artefatos de execuções anteriores antes de rodar.
    #[arg(long, default_value_t = false)]
    pub keep_results: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa todos os jobs do arquivo de configuração e gera o relatório.
    Run {
        /// Arquivo de configuração de testes.
        config: PathBuf,

        #[command(flatten)]
        args: RunArgs,
    },

    /// Apaga os artefatos que os jobs do arquivo produziriam.
    Clean {
        /// Arquivo de configuração de testes.
        config: PathBuf,
    },

    /// Mostra os jobs do arquivo sem executá-los.
    Plan {
        /// Arquivo de configuração de testes.
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["test-driver", "run", "VerificationScenarios.config"]);
        match cli.command {
            Command::Run { config, args } => {
                assert_eq!(config, PathBuf::from("VerificationScenarios.config"));
                assert!(args.commit.is_none());
                assert!(args.threads.is_none());
                assert!(!args.no_email);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_build_identity() {
        let cli = Cli::parse_from([
            "test-driver",
            "run",
            "Unit.config",
            "--commit",
            "0123456789abcdef",
            "--environment",
            "Linux",
            "--architecture",
            "x64",
            "--threads",
            "-2",
            "--no-email",
        ]);
        let Command::Run { args, .. } = cli.command else {
            panic!("expected Run command");
        };
        assert_eq!(args.commit.as_deref(), Some("0123456789abcdef"));
        assert_eq!(args.environment, "Linux");
        assert_eq!(args.architecture, "x64");
        assert_eq!(args.threads, Some(-2));
        assert!(args.no_email);
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "test-driver",
            "--settings",
            "ci/test-driver.toml",
            "--verbose",
            "plan",
            "Unit.config",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.settings, Some(PathBuf::from("ci/test-driver.toml")));
        assert!(matches!(cli.command, Command::Plan { .. }));
    }

    #[test]
    fn cli_parses_clean_subcommand() {
        let cli = Cli::parse_from(["test-driver", "clean", "Unit.config"]);
        assert!(matches!(cli.command, Command::Clean { config } if config == PathBuf::from("Unit.config")));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
