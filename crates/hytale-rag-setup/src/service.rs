//! The downstream search service's checkout: dependencies and self-test.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hytale_rag_config::{ENV_FILE_NAME, EnvFile, Platform};

use crate::dataset::SelfTest;
use crate::decision::{DecisionSource, NoticeLevel};
use crate::error::{Result, SetupError};
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};

/// Manifest that marks a service checkout.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// Tools the service needs on `PATH`.
pub const REQUIRED_TOOLS: &[&str] = &["node", "npm", "npx"];

const NODE_DOWNLOAD_URL: &str = "https://nodejs.org/";

/// Execution policies under which the generated PowerShell scripts run.
const SCRIPT_POLICIES: &[&str] = &["Unrestricted", "RemoteSigned", "Bypass", "AllSigned"];

const BYPASS_TEST_SCRIPT: &str = ".hytale-rag-bypass-test.ps1";

/// The install directory as a Node.js project.
pub struct ServiceWorkspace<'a> {
    install_dir: PathBuf,
    platform: &'a Platform,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ServiceWorkspace<'a> {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        platform: &'a Platform,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            platform,
            runner,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Fail unless the install directory is a service checkout.
    pub fn check_layout(&self) -> Result<()> {
        if self.install_dir.join(PACKAGE_MANIFEST).is_file() {
            return Ok(());
        }
        Err(SetupError::precondition(format!(
            "no {} found in {}. Run setup from the hytale-rag directory or pass --install-dir",
            PACKAGE_MANIFEST,
            self.install_dir.display()
        )))
    }

    /// Fail unless Node.js tooling is on `PATH`.
    pub fn check_tooling(&self) -> Result<()> {
        let missing = self.platform.missing(REQUIRED_TOOLS);
        if missing.is_empty() {
            return Ok(());
        }
        Err(SetupError::precondition(format!(
            "Node.js 18 or newer is required (missing: {}). Install it from {} and re-run setup",
            missing.join(", "),
            NODE_DOWNLOAD_URL
        )))
    }

    /// Run `npm install` with its output shown to the user.
    pub async fn install_dependencies(&self, decisions: &mut dyn DecisionSource) -> Result<()> {
        decisions.notify(NoticeLevel::Step, "Installing service dependencies");
        let spec = CommandSpec::new("npm").arg("install").cwd(&self.install_dir);
        match self.runner.run_attached(&spec).await? {
            Some(0) => {
                decisions.notify(NoticeLevel::Success, "Dependencies installed");
                Ok(())
            }
            Some(code) => Err(SetupError::DependencyInstall(format!("npm exited with code {}", code))),
            None => Err(SetupError::DependencyInstall(
                "npm was terminated by a signal".to_string(),
            )),
        }
    }

    /// Current PowerShell execution policy; `None` off Windows or if unknown.
    pub async fn execution_policy(&self) -> Option<String> {
        if !self.platform.os.is_windows() {
            return None;
        }
        let spec = CommandSpec::new("powershell").args(["-NoProfile", "-Command", "Get-ExecutionPolicy"]);
        match self.runner.run(&spec).await {
            Ok(out) if out.success() => Some(out.stdout.trim().to_string()),
            Ok(out) => {
                tracing::debug!(code = ?out.code, "Get-ExecutionPolicy failed");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "could not query execution policy");
                None
            }
        }
    }

    /// Warn when the execution policy would block the helper script.
    pub async fn check_execution_policy(&self, decisions: &mut dyn DecisionSource) {
        let Some(policy) = self.execution_policy().await else {
            return;
        };
        if policy_allows_scripts(&policy) {
            return;
        }
        decisions.notify(
            NoticeLevel::Warning,
            &format!(
                "PowerShell execution policy is '{}'. The generated configuration passes \
                 -ExecutionPolicy Bypass, but to run the helper script yourself use: \
                 Set-ExecutionPolicy -Scope CurrentUser RemoteSigned",
                policy
            ),
        );
        if !self.bypass_works().await {
            decisions.notify(
                NoticeLevel::Warning,
                "-ExecutionPolicy Bypass appears to be blocked, likely by an enterprise policy. \
                 Contact your IT administrator if the service fails to start.",
            );
        }
    }

    /// Run a throwaway script with `-ExecutionPolicy Bypass` and check it printed.
    pub async fn bypass_works(&self) -> bool {
        let script = self.install_dir.join(BYPASS_TEST_SCRIPT);
        if let Err(e) = tokio::fs::write(&script, "Write-Output 'OK'\r\n").await {
            tracing::debug!(error = %e, "could not write bypass test script");
            return false;
        }
        let script_arg = script.display().to_string();
        let spec = CommandSpec::new("powershell").args([
            "-NoProfile",
            "-ExecutionPolicy",
            "Bypass",
            "-File",
            script_arg.as_str(),
        ]);
        let works = match self.runner.run(&spec).await {
            Ok(out) => out.stdout.contains("OK"),
            Err(e) => {
                tracing::debug!(error = %e, "bypass test script did not run");
                false
            }
        };
        let _ = tokio::fs::remove_file(&script).await;
        works
    }

    fn stats_command(&self) -> Result<CommandSpec> {
        let env = EnvFile::load(&self.install_dir.join(ENV_FILE_NAME))?;
        let mut spec = CommandSpec::new("npx")
            .args(["tsx", "src/search.ts", "--stats"])
            .cwd(&self.install_dir);
        for (key, value) in env.entries() {
            spec = spec.env(key, value);
        }
        Ok(spec)
    }
}

/// Whether `policy` lets local scripts run.
pub fn policy_allows_scripts(policy: &str) -> bool {
    SCRIPT_POLICIES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(policy.trim()))
}

#[async_trait]
impl SelfTest for ServiceWorkspace<'_> {
    async fn run_stats(&self) -> Result<ProcessOutput> {
        let spec = self.stats_command()?;
        self.runner
            .run(&spec)
            .await
            .map_err(|e| SetupError::VerificationFailed(e.to_string()))
    }
}
