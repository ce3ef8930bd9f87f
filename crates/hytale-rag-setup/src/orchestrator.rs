//! End-to-end setup sequence.
//!
//! Steps run strictly in order:
//!
//! 1. Check the install directory and Node.js tooling
//! 2. Select the embedding provider and data type
//! 3. Capture the API key, or bring the local runtime to `ModelReady`
//! 4. Ensure the dataset, install service dependencies, verify (one retry)
//! 5. Register the service with the clients the user picks
//!
//! Failures in steps 1-4 abort the run, except a declined re-download of a
//! corrupted dataset, which is carried in the report. Client registrations are
//! independent: a failure is recorded in the [`SetupReport`] and the next
//! client is attempted.

use std::path::{Path, PathBuf};

use hytale_rag_config::envfile::VOYAGE_KEY;
use hytale_rag_config::{
    ClientConfigurator, ClientId, ENV_FILE_NAME, EmbeddingSettings, EnvFile, MergeOutcome,
    Platform, Provider, Registration, Scope, SetupSettings,
};

use crate::dataset::{DataType, DatasetLayout, DatasetProvisioner, EnsureOutcome, Verdict};
use crate::decision::{DecisionSource, NoticeLevel};
use crate::error::{Result, SetupError};
use crate::process::ProcessRunner;
use crate::release::ReleaseSource;
use crate::runtime::{RuntimeApi, RuntimeProvisioner, RuntimeState};
use crate::service::ServiceWorkspace;

/// Result of one client registration attempt.
#[derive(Debug, Clone)]
pub enum ClientOutcome {
    Registered(Registration),
    Skipped(ClientId),
    Failed { client: ClientId, error: String },
}

impl ClientOutcome {
    pub fn client(&self) -> ClientId {
        match self {
            ClientOutcome::Registered(reg) => reg.client,
            ClientOutcome::Skipped(client) => *client,
            ClientOutcome::Failed { client, .. } => *client,
        }
    }
}

/// Summary of a completed setup run.
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub provider: Provider,
    pub data_type: DataType,
    pub dataset: EnsureOutcome,
    pub verdict: Verdict,
    /// Runtime state after provisioning; `None` for the cloud provider.
    pub runtime: Option<RuntimeState>,
    pub clients: Vec<ClientOutcome>,
}

impl SetupReport {
    pub fn registered(&self) -> impl Iterator<Item = &Registration> {
        self.clients.iter().filter_map(|c| match c {
            ClientOutcome::Registered(reg) => Some(reg),
            _ => None,
        })
    }

    /// Clients whose registration failed, with the error message.
    pub fn failed_clients(&self) -> Vec<(ClientId, &str)> {
        failed_clients(&self.clients)
    }
}

/// Clients whose registration failed, with the error message.
pub fn failed_clients(outcomes: &[ClientOutcome]) -> Vec<(ClientId, &str)> {
    outcomes
        .iter()
        .filter_map(|c| match c {
            ClientOutcome::Failed { client, error } => Some((*client, error.as_str())),
            _ => None,
        })
        .collect()
}

/// Which clients to register and where.
#[derive(Debug, Clone, Default)]
pub struct RegistrationPlan {
    /// Explicit clients; `None` asks about every catalog entry.
    pub clients: Option<Vec<ClientId>>,
    /// Fixed scope; `None` asks for clients with workspace support.
    pub scope: Option<Scope>,
}

/// Register the service with the clients selected by `plan`.
///
/// A failing client is reported and does not stop the others.
pub fn register_clients(
    configurator: &ClientConfigurator,
    plan: &RegistrationPlan,
    decisions: &mut dyn DecisionSource,
) -> Result<Vec<ClientOutcome>> {
    let candidates: Vec<ClientId> = match &plan.clients {
        Some(list) => list.clone(),
        None => ClientId::ALL.to_vec(),
    };

    let mut outcomes = Vec::with_capacity(candidates.len());
    for client in candidates {
        let descriptor = client.descriptor();

        if plan.clients.is_none() {
            let prompt = format!(
                "Configure {}? ({})",
                descriptor.display_name, descriptor.description
            );
            if !decisions.confirm(&prompt, client == ClientId::ClaudeCode)? {
                outcomes.push(ClientOutcome::Skipped(client));
                continue;
            }
        }

        let scope = match plan.scope {
            Some(Scope::Workspace) if !descriptor.supports_workspace() => {
                decisions.notify(
                    NoticeLevel::Warning,
                    &format!(
                        "{} has no workspace configuration; configuring it globally",
                        descriptor.display_name
                    ),
                );
                Scope::Global
            }
            Some(scope) => scope,
            None if descriptor.supports_workspace() => {
                choose_scope(configurator, descriptor.display_name, decisions)?
            }
            None => Scope::Global,
        };

        match configurator.apply(client, scope) {
            Ok(reg) => {
                if let Some(backup) = &reg.backup {
                    decisions.notify(
                        NoticeLevel::Warning,
                        &format!(
                            "{} could not be parsed; the old file was saved as {}",
                            reg.path.display(),
                            backup.display()
                        ),
                    );
                }
                let verb = match reg.outcome {
                    MergeOutcome::Added => "added to",
                    MergeOutcome::Updated => "updated in",
                    MergeOutcome::AlreadyPresent => "already present in",
                };
                decisions.notify(
                    NoticeLevel::Success,
                    &format!(
                        "{}: '{}' {} {}",
                        descriptor.display_name,
                        configurator.entry_name(),
                        verb,
                        reg.path.display()
                    ),
                );
                outcomes.push(ClientOutcome::Registered(reg));
            }
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "client registration failed");
                decisions.notify(
                    NoticeLevel::Error,
                    &format!("{}: {}", descriptor.display_name, e),
                );
                outcomes.push(ClientOutcome::Failed {
                    client,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(outcomes)
}

fn choose_scope(
    configurator: &ClientConfigurator,
    display_name: &str,
    decisions: &mut dyn DecisionSource,
) -> Result<Scope> {
    let Some(root) = configurator.resolver().workspace_root() else {
        return Ok(Scope::Global);
    };
    let options = vec![
        "Globally (all projects)".to_string(),
        format!("This workspace only ({})", root.display()),
    ];
    let idx = decisions.choose(
        &format!("Where should {} be configured?", display_name),
        &options,
        0,
    )?;
    Ok(if idx == 1 { Scope::Workspace } else { Scope::Global })
}

/// Drives the full setup sequence.
pub struct SetupOrchestrator<'a> {
    platform: &'a Platform,
    settings: &'a SetupSettings,
    install_dir: PathBuf,
    runner: &'a dyn ProcessRunner,
    releases: &'a dyn ReleaseSource,
    runtime_api: &'a dyn RuntimeApi,
    configurator: &'a ClientConfigurator,
}

impl<'a> SetupOrchestrator<'a> {
    pub fn new(
        platform: &'a Platform,
        settings: &'a SetupSettings,
        install_dir: impl Into<PathBuf>,
        runner: &'a dyn ProcessRunner,
        releases: &'a dyn ReleaseSource,
        runtime_api: &'a dyn RuntimeApi,
        configurator: &'a ClientConfigurator,
    ) -> Self {
        Self {
            platform,
            settings,
            install_dir: install_dir.into(),
            runner,
            releases,
            runtime_api,
            configurator,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Run every step; see the module docs for ordering and failure policy.
    pub async fn run(&self, decisions: &mut dyn DecisionSource) -> Result<SetupReport> {
        let workspace = ServiceWorkspace::new(&self.install_dir, self.platform, self.runner);

        decisions.notify(NoticeLevel::Step, "Checking prerequisites");
        workspace.check_layout()?;
        workspace.check_tooling()?;

        let env_path = self.install_dir.join(ENV_FILE_NAME);
        let mut env = EnvFile::load(&env_path)?;

        decisions.notify(NoticeLevel::Step, "Embedding provider");
        let (provider, existing) = self.select_provider(&env, decisions)?;
        let data_type = self.select_data_type(decisions)?;
        tracing::info!(%provider, %data_type, "selected provisioning target");

        let (embedding, runtime) = match provider {
            Provider::Cloud => (self.capture_api_key(&env, existing, decisions)?, None),
            Provider::Local => {
                decisions.notify(NoticeLevel::Step, "Local runtime");
                let (embedding, state) = self.provision_runtime(existing, decisions).await?;
                (embedding, Some(state))
            }
        };
        env.set_embedding(&embedding);
        env.save(&env_path)?;
        decisions.notify(
            NoticeLevel::Success,
            &format!("Saved configuration to {}", env_path.display()),
        );

        decisions.notify(NoticeLevel::Step, "Dataset");
        let datasets = DatasetProvisioner::new(
            DatasetLayout::new(&self.install_dir),
            self.releases,
            self.settings.releases.asset_prefix.clone(),
        );
        let dataset = datasets.ensure(provider, data_type, decisions).await?;

        workspace.install_dependencies(decisions).await?;

        let verdict = datasets
            .verify_with_retry(provider, data_type, &workspace, decisions)
            .await?;

        decisions.notify(NoticeLevel::Step, "Client configuration");
        workspace.check_execution_policy(decisions).await;
        let clients = register_clients(self.configurator, &RegistrationPlan::default(), decisions)?;

        let report = SetupReport {
            provider,
            data_type,
            dataset,
            verdict,
            runtime,
            clients,
        };
        tracing::info!(
            registered = report.registered().count(),
            failed = report.failed_clients().len(),
            "setup complete"
        );
        Ok(report)
    }

    fn select_provider(
        &self,
        env: &EnvFile,
        decisions: &mut dyn DecisionSource,
    ) -> Result<(Provider, Option<EmbeddingSettings>)> {
        if let Some(existing) = env.embedding() {
            let keep = decisions.confirm(
                &format!(
                    "Existing configuration found ({}). Keep it?",
                    existing.provider().label()
                ),
                true,
            )?;
            if keep {
                return Ok((existing.provider(), Some(existing)));
            }
        }

        let options: Vec<String> = Provider::ALL.iter().map(|p| p.label().to_string()).collect();
        let idx = decisions.choose("Choose an embedding provider", &options, 0)?;
        Ok((Provider::ALL[idx], None))
    }

    fn select_data_type(&self, decisions: &mut dyn DecisionSource) -> Result<DataType> {
        let options: Vec<String> = DataType::ALL.iter().map(|d| d.label().to_string()).collect();
        let idx = decisions.choose("Which data should be downloaded?", &options, 0)?;
        Ok(DataType::ALL[idx])
    }

    fn capture_api_key(
        &self,
        env: &EnvFile,
        existing: Option<EmbeddingSettings>,
        decisions: &mut dyn DecisionSource,
    ) -> Result<EmbeddingSettings> {
        if let Some(settings @ EmbeddingSettings::Cloud { .. }) = existing {
            return Ok(settings);
        }
        // a declined cloud configuration means the saved key is being replaced
        let declined_cloud = matches!(env.embedding(), Some(EmbeddingSettings::Cloud { .. }));
        if !declined_cloud
            && let Some(saved) = env.get(VOYAGE_KEY).filter(|k| !k.trim().is_empty())
            && decisions.confirm("Use the Voyage AI API key saved in .env?", true)?
        {
            return Ok(EmbeddingSettings::Cloud {
                api_key: saved.to_string(),
            });
        }

        decisions.notify(
            NoticeLevel::Info,
            "Get a Voyage AI API key at https://dash.voyageai.com/",
        );
        let api_key = decisions.input("Voyage AI API key", true)?.trim().to_string();
        if api_key.is_empty() {
            return Err(SetupError::MissingApiKey);
        }
        Ok(EmbeddingSettings::Cloud { api_key })
    }

    async fn provision_runtime(
        &self,
        existing: Option<EmbeddingSettings>,
        decisions: &mut dyn DecisionSource,
    ) -> Result<(EmbeddingSettings, RuntimeState)> {
        let mut runtime_settings = self.settings.runtime.clone();
        if let Some(EmbeddingSettings::Local { model }) = existing {
            runtime_settings.model = model;
        }
        let provisioner =
            RuntimeProvisioner::new(self.platform, self.runner, self.runtime_api, runtime_settings);
        let state = provisioner.ensure(decisions).await?;
        Ok((
            EmbeddingSettings::Local {
                model: provisioner.model().to_string(),
            },
            state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, ScriptedDecisions};
    use crate::process::{CommandSpec, MockRunner, ProcessOutput};
    use crate::release::{MockReleaseSource, build_archive};
    use crate::runtime::MockRuntimeApi;
    use hytale_rag_config::{BaseDirs, CommandBuilder, OsFamily, PathResolver, SERVICE_NAME};
    use tempfile::TempDir;

    const ALL_TABLE_DIRS: &[&str] = &[
        "lancedb/hytale_methods.lance",
        "lancedb/hytale_client_ui.lance",
        "lancedb/hytale_gamedata.lance",
    ];

    struct Fixture {
        _dir: TempDir,
        home: PathBuf,
        install: PathBuf,
        platform: Platform,
        settings: SetupSettings,
        configurator: ClientConfigurator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let install = dir.path().join("projects").join("hytale-rag");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&install).unwrap();
        std::fs::write(install.join("package.json"), "{}").unwrap();

        let os = OsFamily::Linux;
        let mut settings = SetupSettings::default();
        settings.runtime.health_interval_ms = 0;
        let configurator = ClientConfigurator::new(
            PathResolver::new(BaseDirs::rooted(&home))
                .with_workspace_root(install.parent().unwrap()),
            CommandBuilder::new(&install, os),
            os,
            SERVICE_NAME,
        );
        Fixture {
            _dir: dir,
            home,
            platform: Platform::new(os, false).with_commands(["node", "npm", "npx"]),
            install,
            settings,
            configurator,
        }
    }

    fn releases() -> MockReleaseSource {
        MockReleaseSource::new()
            .with_asset("lancedb-voyage-all.tar.gz", build_archive(ALL_TABLE_DIRS))
            .with_asset("lancedb-ollama-all.tar.gz", build_archive(ALL_TABLE_DIRS))
    }

    fn orchestrator<'a>(
        f: &'a Fixture,
        runner: &'a MockRunner,
        releases: &'a MockReleaseSource,
        api: &'a MockRuntimeApi,
    ) -> SetupOrchestrator<'a> {
        SetupOrchestrator::new(
            &f.platform,
            &f.settings,
            &f.install,
            runner,
            releases,
            api,
            &f.configurator,
        )
    }

    #[tokio::test]
    async fn test_cloud_setup_end_to_end() {
        let f = fixture();
        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Input(" pa-test-key ".into()),
        ]);

        let report = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert_eq!(report.provider, Provider::Cloud);
        assert_eq!(report.data_type, DataType::All);
        assert!(matches!(report.dataset, EnsureOutcome::Downloaded { .. }));
        assert_eq!(report.verdict, Verdict::Healthy);
        assert!(report.runtime.is_none());

        let env = EnvFile::load(&f.install.join(ENV_FILE_NAME)).unwrap();
        assert_eq!(
            env.embedding(),
            Some(EmbeddingSettings::Cloud {
                api_key: "pa-test-key".into()
            })
        );

        assert_eq!(
            runner.calls(),
            vec!["npm install", "npx tsx src/search.ts --stats"]
        );
        assert_eq!(api.calls(), 0);

        // defaults: only Claude Code is configured
        let registered: Vec<_> = report.registered().map(|r| r.client).collect();
        assert_eq!(registered, vec![ClientId::ClaudeCode]);
        assert_eq!(report.clients.len(), ClientId::ALL.len());
        assert!(f.home.join(".claude.json").is_file());
        assert!(report.failed_clients().is_empty());
    }

    #[tokio::test]
    async fn test_existing_selection_and_dataset_skip_network() {
        let f = fixture();
        std::fs::write(
            f.install.join(ENV_FILE_NAME),
            "EMBEDDING_PROVIDER=voyage\nVOYAGE_API_KEY=pa-saved\n",
        )
        .unwrap();
        let layout = DatasetLayout::new(&f.install);
        for table in DataType::All.tables() {
            std::fs::create_dir_all(layout.table_path(Provider::Cloud, table)).unwrap();
        }

        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::default();

        let report = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert_eq!(report.dataset, EnsureOutcome::AlreadyPresent);
        assert_eq!(releases.network_calls(), 0);
        assert!(!decisions.prompts.iter().any(|p| p.contains("Voyage AI API key")));
    }

    #[tokio::test]
    async fn test_declined_cloud_config_replaces_key() {
        let f = fixture();
        std::fs::write(
            f.install.join(ENV_FILE_NAME),
            "EMBEDDING_PROVIDER=voyage\nVOYAGE_API_KEY=pa-old\n",
        )
        .unwrap();
        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Confirm(false),
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Input("pa-new".into()),
        ]);

        orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert_eq!(decisions.prompts[3], "Voyage AI API key");
        let env = EnvFile::load(&f.install.join(ENV_FILE_NAME)).unwrap();
        assert_eq!(env.get(VOYAGE_KEY), Some("pa-new"));
    }

    #[tokio::test]
    async fn test_leftover_key_reused_after_consent() {
        let f = fixture();
        std::fs::write(
            f.install.join(ENV_FILE_NAME),
            "EMBEDDING_PROVIDER=ollama\nOLLAMA_MODEL=nomic-embed-text\nVOYAGE_API_KEY=pa-kept\n",
        )
        .unwrap();
        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Confirm(false),
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Confirm(true),
        ]);

        orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert!(decisions.prompts[3].contains("saved in .env"));
        assert!(!decisions.prompts.iter().any(|p| p == "Voyage AI API key"));
        let env = EnvFile::load(&f.install.join(ENV_FILE_NAME)).unwrap();
        assert_eq!(env.get("EMBEDDING_PROVIDER"), Some("voyage"));
        assert_eq!(env.get(VOYAGE_KEY), Some("pa-kept"));
    }

    #[tokio::test]
    async fn test_local_setup_uses_runtime() {
        let f = fixture();
        let runner = MockRunner::new().with_available(["ollama"]);
        let releases = releases();
        let api = MockRuntimeApi::new([Some(vec!["nomic-embed-text:latest"])]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Choose(1),
            Answer::Choose(0),
            Answer::Confirm(false),
        ]);

        let report = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert_eq!(report.provider, Provider::Local);
        assert!(report.runtime.unwrap().model_pulled);
        let env = EnvFile::load(&f.install.join(ENV_FILE_NAME)).unwrap();
        assert_eq!(env.get("EMBEDDING_PROVIDER"), Some("ollama"));
        assert_eq!(env.get("OLLAMA_MODEL"), Some("nomic-embed-text"));
        assert!(DatasetLayout::new(&f.install).is_complete(Provider::Local, DataType::All));
        assert_eq!(report.registered().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_fatal() {
        let f = fixture();
        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Input("   ".into()),
        ]);

        let err = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::MissingApiKey));
        assert_eq!(releases.network_calls(), 0);
        assert!(!f.install.join(ENV_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_missing_package_json_fails_first() {
        let f = fixture();
        std::fs::remove_file(f.install.join("package.json")).unwrap();
        let runner = MockRunner::new();
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::default();

        let err = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Precondition(_)));
        assert!(decisions.prompts.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_corruption_stops_before_clients() {
        let f = fixture();
        let runner = MockRunner::new().with_responder(|spec: &CommandSpec| {
            if spec.program == "npx" {
                ProcessOutput::failed(101, "thread 'main' panicked at src/table.rs:10")
            } else {
                ProcessOutput::ok("")
            }
        });
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Input("pa-key".into()),
        ]);

        let err = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap_err();

        assert!(matches!(err, SetupError::DatasetCorrupted { .. }));
        assert_eq!(releases.downloads(), 2);
        assert!(!f.home.join(".claude.json").exists());
    }

    #[tokio::test]
    async fn test_declined_redownload_continues_to_clients() {
        let f = fixture();
        let runner = MockRunner::new().with_responder(|spec: &CommandSpec| {
            if spec.program == "npx" {
                ProcessOutput::failed(101, "thread 'main' panicked at src/table.rs:10")
            } else {
                ProcessOutput::ok("")
            }
        });
        let releases = releases();
        let api = MockRuntimeApi::new([None]);
        let mut decisions = ScriptedDecisions::new([
            Answer::Choose(0),
            Answer::Choose(0),
            Answer::Input("pa-key".into()),
            Answer::Confirm(false),
        ]);

        let report = orchestrator(&f, &runner, &releases, &api)
            .run(&mut decisions)
            .await
            .unwrap();

        assert!(matches!(report.verdict, Verdict::Corrupted(_)));
        assert_eq!(releases.downloads(), 1);
        assert!(decisions.noticed(NoticeLevel::Warning, "Skipping the re-download"));
        assert_eq!(report.registered().count(), 1);
        assert!(f.home.join(".claude.json").is_file());
    }

    #[test]
    fn test_client_failure_is_isolated() {
        let f = fixture();
        // a directory where the file should be makes the read fail
        std::fs::create_dir_all(f.home.join(".claude.json")).unwrap();

        let plan = RegistrationPlan {
            clients: Some(vec![ClientId::ClaudeCode, ClientId::Windsurf]),
            scope: None,
        };
        let mut decisions = ScriptedDecisions::default();
        let outcomes = register_clients(&f.configurator, &plan, &mut decisions).unwrap();

        let failed = failed_clients(&outcomes);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, ClientId::ClaudeCode);
        assert!(matches!(outcomes[1], ClientOutcome::Registered(_)));
        assert!(f.home.join(".codeium/windsurf/mcp_config.json").is_file());
        // explicit clients are not confirmed
        assert!(decisions.prompts.is_empty());
    }

    #[test]
    fn test_scope_choice_for_workspace_clients() {
        let f = fixture();
        let plan = RegistrationPlan {
            clients: Some(vec![ClientId::Vscode]),
            scope: None,
        };
        let mut decisions = ScriptedDecisions::new([Answer::Choose(1)]);
        let outcomes = register_clients(&f.configurator, &plan, &mut decisions).unwrap();

        match &outcomes[0] {
            ClientOutcome::Registered(reg) => {
                assert_eq!(reg.scope, Scope::Workspace);
                assert_eq!(
                    reg.path,
                    f.install.parent().unwrap().join(".vscode").join("mcp.json")
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_forced_workspace_falls_back_for_global_only_clients() {
        let f = fixture();
        let plan = RegistrationPlan {
            clients: Some(vec![ClientId::Codex]),
            scope: Some(Scope::Workspace),
        };
        let mut decisions = ScriptedDecisions::default();
        let outcomes = register_clients(&f.configurator, &plan, &mut decisions).unwrap();

        assert!(matches!(&outcomes[0], ClientOutcome::Registered(reg) if reg.scope == Scope::Global));
        assert!(decisions.noticed(NoticeLevel::Warning, "no workspace configuration"));
    }
}
