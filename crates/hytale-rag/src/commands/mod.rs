//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use hytale_rag_config::{
    BaseDirs, ClientConfigurator, CommandBuilder, LoadedSettings, PathResolver, Platform,
    SetupSettings,
};

use crate::prompt::TerminalDecisions;

pub mod clients;
pub mod configure;
pub mod setup;
pub mod status;
pub mod verify;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Absolute path of the service checkout.
    pub install_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Accept default answers without asking.
    pub assume_yes: bool,
}

impl Context {
    pub fn new(
        install_dir: Option<PathBuf>,
        json_output: bool,
        verbose: bool,
        assume_yes: bool,
    ) -> Result<Self> {
        let dir = match install_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("cannot determine the current directory")?,
        };
        let install_dir = std::path::absolute(&dir)
            .with_context(|| format!("invalid install directory {}", dir.display()))?;
        Ok(Self {
            install_dir,
            json_output,
            verbose,
            assume_yes,
        })
    }

    /// Settings from `hytale-rag.toml` plus environment overrides.
    ///
    /// Problems with the file are logged and defaults are used.
    pub fn settings(&self) -> SetupSettings {
        let loaded: LoadedSettings = SetupSettings::load(&self.install_dir);
        for warning in &loaded.warnings {
            tracing::warn!(path = %loaded.path.display(), "{}", warning);
        }
        if loaded.loaded {
            tracing::debug!(path = %loaded.path.display(), "loaded settings");
        }
        loaded.settings
    }

    /// Configurator rooted at the user's home, with the workspace being the
    /// install directory's parent.
    pub fn configurator(
        &self,
        platform: &Platform,
        settings: &SetupSettings,
    ) -> Result<ClientConfigurator> {
        let mut resolver = PathResolver::new(BaseDirs::detect()?);
        if let Some(root) = self.install_dir.parent() {
            resolver = resolver.with_workspace_root(root);
        }
        Ok(ClientConfigurator::new(
            resolver,
            CommandBuilder::new(&self.install_dir, platform.os),
            platform.os,
            settings.service.entry_name.clone(),
        ))
    }

    pub fn decisions(&self) -> TerminalDecisions {
        TerminalDecisions::new(self.assume_yes)
    }
}
