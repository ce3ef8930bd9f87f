//! Local embedding runtime (Ollama) provisioning.
//!
//! The runtime moves through `Absent → Installed → Running → ModelReady`.
//! State is never stored: every run probes the command lookup, the HTTP
//! catalog and the model list again, then performs only the missing
//! transitions. Installing requires consent; starting and pulling do not.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hytale_rag_config::Platform;
use hytale_rag_config::platform::OsFamily;
use hytale_rag_config::settings::RuntimeSettings;
use serde::Deserialize;

use crate::decision::{DecisionSource, NoticeLevel};
use crate::error::{Result, SetupError};
use crate::process::{CommandSpec, ProcessRunner};

/// Manual download page shown when automated installation fails.
pub const OLLAMA_DOWNLOAD_URL: &str = "https://ollama.com/download";

const LINUX_INSTALL_SCRIPT: &str = "curl -fsSL https://ollama.com/install.sh | sh";

const HOMEBREW_INSTALL_SCRIPT: &str =
    "/bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The runtime's HTTP API did not answer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("runtime API at {base_url} is unreachable: {reason}")]
pub struct ApiUnreachable {
    pub base_url: String,
    pub reason: String,
}

/// Catalog/health surface of the runtime.
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// Names of installed models. An error means the runtime isn't serving.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ApiUnreachable>;
}

/// [`RuntimeApi`] over Ollama's `GET /api/tags`.
#[derive(Debug, Clone)]
pub struct OllamaApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn unreachable(&self, reason: impl fmt::Display) -> ApiUnreachable {
        ApiUnreachable {
            base_url: self.base_url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RuntimeApi for OllamaApi {
    async fn list_models(&self) -> std::result::Result<Vec<String>, ApiUnreachable> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unreachable(e))?;
        let tags: TagsResponse = response.json().await.map_err(|e| self.unreachable(e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Whether a catalog entry satisfies `model` (exact, or `model:<tag>`).
pub fn model_matches(entry: &str, model: &str) -> bool {
    entry == model
        || entry
            .strip_prefix(model)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Derived runtime snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RuntimeState {
    pub installed: bool,
    pub running: bool,
    pub model_pulled: bool,
}

/// Position in the runtime dependency chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuntimeStage {
    Absent,
    Installed,
    Running,
    ModelReady,
}

impl RuntimeState {
    pub fn stage(&self) -> RuntimeStage {
        if self.running && self.model_pulled {
            RuntimeStage::ModelReady
        } else if self.running {
            RuntimeStage::Running
        } else if self.installed {
            RuntimeStage::Installed
        } else {
            RuntimeStage::Absent
        }
    }
}

impl fmt::Display for RuntimeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeStage::Absent => "not installed",
            RuntimeStage::Installed => "installed, not running",
            RuntimeStage::Running => "running, model missing",
            RuntimeStage::ModelReady => "ready",
        })
    }
}

/// How the runtime gets installed on each OS family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    /// Vendor install script piped to `sh` (Linux).
    VendorScript,
    /// `brew install --cask ollama` (macOS).
    Homebrew,
    /// `winget install` from an elevated session (Windows).
    Winget,
}

impl InstallMethod {
    pub fn for_os(os: OsFamily) -> Self {
        match os {
            OsFamily::Linux => InstallMethod::VendorScript,
            OsFamily::MacOS => InstallMethod::Homebrew,
            OsFamily::Windows => InstallMethod::Winget,
        }
    }

    pub fn command(&self) -> CommandSpec {
        match self {
            InstallMethod::VendorScript => CommandSpec::shell(LINUX_INSTALL_SCRIPT),
            InstallMethod::Homebrew => {
                CommandSpec::new("brew").args(["install", "--cask", "ollama"])
            }
            InstallMethod::Winget => CommandSpec::new("winget").args([
                "install",
                "--id",
                "Ollama.Ollama",
                "-e",
                "--accept-source-agreements",
                "--accept-package-agreements",
            ]),
        }
    }
}

/// Drives the runtime to `ModelReady`.
pub struct RuntimeProvisioner<'a> {
    platform: &'a Platform,
    runner: &'a dyn ProcessRunner,
    api: &'a dyn RuntimeApi,
    settings: RuntimeSettings,
}

impl<'a> RuntimeProvisioner<'a> {
    pub fn new(
        platform: &'a Platform,
        runner: &'a dyn ProcessRunner,
        api: &'a dyn RuntimeApi,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            platform,
            runner,
            api,
            settings,
        }
    }

    /// Required model name.
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Probe the runtime without changing anything.
    pub async fn probe(&self) -> RuntimeState {
        let models = self.api.list_models().await;
        let running = models.is_ok();
        let installed = running || self.runner.is_available("ollama");
        let model_pulled = models
            .as_ref()
            .is_ok_and(|names| names.iter().any(|n| model_matches(n, &self.settings.model)));

        let state = RuntimeState {
            installed,
            running,
            model_pulled,
        };
        tracing::debug!(?state, stage = %state.stage(), "probed runtime");
        state
    }

    /// Perform the missing transitions up to `ModelReady`.
    pub async fn ensure(&self, decisions: &mut dyn DecisionSource) -> Result<RuntimeState> {
        let mut state = self.probe().await;

        if state.stage() == RuntimeStage::ModelReady {
            decisions.notify(
                NoticeLevel::Success,
                &format!("Ollama is running with {}", self.settings.model),
            );
            return Ok(state);
        }

        if state.stage() == RuntimeStage::Absent {
            let prompt = format!(
                "Ollama is not installed. Install it now ({})?",
                self.install_summary()
            );
            if !decisions.confirm(&prompt, true)? {
                return Err(SetupError::declined(
                    "Installing Ollama",
                    format!("Install it from {} and re-run setup.", OLLAMA_DOWNLOAD_URL),
                ));
            }
            self.install(decisions).await?;
            state.installed = true;
            decisions.notify(NoticeLevel::Success, "Ollama installed");
        }

        if !state.running {
            decisions.notify(NoticeLevel::Info, "Starting Ollama...");
            let models = self.start().await?;
            state.running = true;
            state.model_pulled = models
                .iter()
                .any(|n| model_matches(n, &self.settings.model));
            decisions.notify(NoticeLevel::Success, "Ollama is running");
        }

        if !state.model_pulled {
            decisions.notify(
                NoticeLevel::Info,
                &format!("Pulling embedding model {} (this may take a while)...", self.settings.model),
            );
            self.pull().await?;
            state.model_pulled = true;
            decisions.notify(
                NoticeLevel::Success,
                &format!("Model {} is ready", self.settings.model),
            );
        }

        Ok(state)
    }

    fn install_summary(&self) -> &'static str {
        match InstallMethod::for_os(self.platform.os) {
            InstallMethod::VendorScript => "official install script",
            InstallMethod::Homebrew => "Homebrew",
            InstallMethod::Winget => "winget, requires Administrator",
        }
    }

    async fn install(&self, decisions: &mut dyn DecisionSource) -> Result<()> {
        let method = InstallMethod::for_os(self.platform.os);
        tracing::info!(?method, "installing runtime");

        match method {
            InstallMethod::VendorScript => {
                if !self.runner.is_available("curl") {
                    return Err(install_error("curl is required to run the installer"));
                }
            }
            InstallMethod::Homebrew => {
                if !self.runner.is_available("brew") {
                    let bootstrap = decisions.confirm(
                        "Homebrew is required to install Ollama but was not found. Install Homebrew first?",
                        true,
                    )?;
                    if !bootstrap {
                        return Err(SetupError::declined(
                            "Installing Homebrew",
                            format!(
                                "Install Homebrew from https://brew.sh or Ollama from {}, then re-run setup.",
                                OLLAMA_DOWNLOAD_URL
                            ),
                        ));
                    }
                    decisions.notify(NoticeLevel::Info, "Installing Homebrew...");
                    let code = self
                        .runner
                        .run_attached(&CommandSpec::shell(HOMEBREW_INSTALL_SCRIPT))
                        .await?;
                    if code != Some(0) {
                        return Err(install_error(format!(
                            "Homebrew installer {}",
                            describe_exit(code)
                        )));
                    }
                }
            }
            InstallMethod::Winget => {
                if !self.platform.elevated {
                    return Err(SetupError::ElevationRequired {
                        action: "Installing Ollama with winget".to_string(),
                        manual_url: OLLAMA_DOWNLOAD_URL.to_string(),
                    });
                }
                if !self.runner.is_available("winget") {
                    return Err(install_error("winget is not available on this system"));
                }
            }
        }

        decisions.notify(NoticeLevel::Info, "Installing Ollama...");
        let code = self.runner.run_attached(&method.command()).await?;
        if code != Some(0) {
            return Err(install_error(format!("installer {}", describe_exit(code))));
        }
        if !self.runner.is_available("ollama") {
            tracing::warn!("ollama is not on PATH yet; a new terminal may be needed");
        }
        Ok(())
    }

    /// Start `ollama serve` detached and wait for the catalog to answer.
    async fn start(&self) -> Result<Vec<String>> {
        self.runner
            .spawn_detached(&CommandSpec::new("ollama").arg("serve"))?;

        let attempts = self.settings.poll_attempts();
        for attempt in 1..=attempts {
            tokio::time::sleep(self.settings.health_interval()).await;
            match self.api.list_models().await {
                Ok(models) => {
                    tracing::info!(attempt, "runtime is healthy");
                    return Ok(models);
                }
                Err(e) => tracing::debug!(attempt, error = %e, "runtime not ready"),
            }
        }

        Err(SetupError::RuntimeStart {
            attempts,
            base_url: self.settings.base_url.clone(),
        })
    }

    async fn pull(&self) -> Result<()> {
        let model = &self.settings.model;
        let code = self
            .runner
            .run_attached(&CommandSpec::new("ollama").args(["pull", model.as_str()]))
            .await?;
        if code == Some(0) {
            Ok(())
        } else {
            Err(SetupError::ModelPull {
                model: model.clone(),
                detail: describe_exit(code),
            })
        }
    }
}

fn install_error(detail: impl Into<String>) -> SetupError {
    SetupError::RuntimeInstall {
        detail: detail.into(),
        manual_url: OLLAMA_DOWNLOAD_URL.to_string(),
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exited with code {}", c),
        None => "was terminated by a signal".to_string(),
    }
}

/// Catalog responses replayed in order; the last one repeats.
///
/// `None` answers as unreachable.
#[cfg(test)]
pub struct MockRuntimeApi {
    responses: std::sync::Mutex<std::collections::VecDeque<Option<Vec<String>>>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockRuntimeApi {
    pub fn new(responses: impl IntoIterator<Item = Option<Vec<&'static str>>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(|names| names.into_iter().map(String::from).collect()))
                    .collect(),
            ),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl RuntimeApi for MockRuntimeApi {
    async fn list_models(&self) -> std::result::Result<Vec<String>, ApiUnreachable> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front().flatten()
        } else {
            responses.front().cloned().flatten()
        };
        next.ok_or_else(|| ApiUnreachable {
            base_url: "mock".into(),
            reason: "connection refused".into(),
        })
    }
}
