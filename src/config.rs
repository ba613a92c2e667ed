//! Configuração do test-driver carregada a partir de `test-driver.toml`.
//!
//! A struct [`DriverSettings`] contém os parâmetros da máquina onde a bateria
//! roda (threads, intervalo do scheduler, logging, SMTP). O arquivo de jobs
//! continua sendo o arquivo de configuração de testes; estes valores apenas
//! complementam o que ele não define.
//! A variável de ambiente `TEST_DRIVER_SMTP_PASSWORD` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "test-driver.toml";
const SMTP_PASSWORD_ENV: &str = "TEST_DRIVER_SMTP_PASSWORD";

/// Configuração de nível superior carregada de `test-driver.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverSettings {
    /// Threads pedidas quando o arquivo de testes não define `Threads`.
    #[serde(default)]
    pub threads: Option<i32>,

    /// Intervalo máximo entre duas passadas do scheduler, em milissegundos.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Filtro de log padrão (sintaxe do `EnvFilter`).
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emite logs do terminal em JSON.
    #[serde(default)]
    pub log_json: bool,

    /// Diretório varrido quando `Patients=all`.
    #[serde(default = "default_patients_dir")]
    pub patients_dir: PathBuf,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Usa STARTTLS; relays internos costumam aceitar apenas texto puro.
    #[serde(default)]
    pub smtp_starttls: bool,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,
}

// Valor padrão do intervalo do scheduler: 100ms.
fn default_tick_interval_ms() -> u64 {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_patients_dir() -> PathBuf {
    PathBuf::from("./patients")
}

// Porta SMTP sem TLS.
fn default_smtp_port() -> u16 {
    25
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            threads: None,
            tick_interval_ms: default_tick_interval_ms(),
            log_filter: default_log_filter(),
            log_json: false,
            patients_dir: default_patients_dir(),
            smtp_port: default_smtp_port(),
            smtp_starttls: false,
            smtp_user: None,
            smtp_password: None,
        }
    }
}

impl DriverSettings {
    /// Carrega `test-driver.toml` do diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    /// Carrega a configuração do caminho dado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<DriverSettings>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para a senha SMTP.
        if let Ok(password) = std::env::var(SMTP_PASSWORD_ENV) {
            if !password.is_empty() {
                settings.smtp_password = Some(password);
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let settings = DriverSettings::default();
        assert_eq!(settings.threads, None);
        assert_eq!(settings.tick_interval_ms, 100);
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.patients_dir, PathBuf::from("./patients"));
        assert_eq!(settings.smtp_port, 25);
        assert!(!settings.smtp_starttls);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            threads = -2
            smtp_port = 587
            smtp_starttls = true
        "#;
        let settings: DriverSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.threads, Some(-2));
        assert_eq!(settings.smtp_port, 587);
        assert!(settings.smtp_starttls);
        assert_eq!(settings.tick_interval_ms, 100);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DriverSettings::load_from(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.tick_interval_ms, 100);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "tick_interval_ms = 20\nlog_filter = \"debug\"\n").unwrap();
        let settings = DriverSettings::load_from(&path).unwrap();
        assert_eq!(settings.tick_interval_ms, 20);
        assert_eq!(settings.log_filter, "debug");
    }
}
