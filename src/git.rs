//! Integração com Git via libgit2 para identificar o commit testado.
//!
//! O [`GitInfo`] abre o repositório que contém o diretório de trabalho e
//! informa o hash do HEAD, usado no assunto do email e no relatório quando
//! `--commit` não é passado na linha de comando.

use anyhow::{Context, Result};
use git2::Repository;
use std::path::Path;

/// Informações do repositório onde a bateria roda.
pub struct GitInfo {
    repo: Repository,
}

impl GitInfo {
    /// Procura um repositório git a partir do caminho dado, subindo diretórios.
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).context("failed to find a git repository")?;
        Ok(Self { repo })
    }

    /// Hash completo do commit apontado pelo HEAD.
    pub fn head_commit(&self) -> Result<String> {
        let commit = self
            .repo
            .head()
            .context("repository has no HEAD")?
            .peel_to_commit()?;
        Ok(commit.id().to_string())
    }
}

/// Hash do HEAD do diretório atual, ou vazio se não houver repositório.
pub fn commit_hash_or_empty(path: &Path) -> String {
    match GitInfo::discover(path).and_then(|info| info.head_commit()) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::debug!(error = %e, "no commit hash available");
            String::new()
        }
    }
}
