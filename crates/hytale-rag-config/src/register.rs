//! Registers the service with client configuration documents.
//!
//! Dispatch is on the client's [`SchemaVariant`]: JSON containers are
//! located (or created) and the entry is upserted, TOML sections are
//! appended once. Every write replaces the whole document atomically.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::clients::{ClientId, LaunchFlavor, SchemaVariant, Scope};
use crate::document::{JsonDocument, MergeOutcome, TomlAppendDocument, write_atomic};
use crate::launch::{CommandBuilder, ServiceLaunchDescriptor};
use crate::paths::PathResolver;
use crate::platform::OsFamily;
use crate::{ConfigError, Result};

/// Outcome of one successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub client: ClientId,
    pub scope: Scope,
    /// Document that was written (or inspected, for `AlreadyPresent`).
    pub path: PathBuf,
    pub outcome: MergeOutcome,
    /// Copy of an unreadable document that was replaced.
    pub backup: Option<PathBuf>,
}

/// Whether the service entry currently exists in a client document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum RegistrationStatus {
    Registered,
    NotRegistered,
    /// The document does not exist yet.
    NoConfigFile,
    /// The document exists but could not be parsed.
    Unreadable(String),
}

impl RegistrationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::NotRegistered => "not registered",
            RegistrationStatus::NoConfigFile => "no config file",
            RegistrationStatus::Unreadable(_) => "unreadable",
        }
    }
}

/// Merges the service launch entry into client configuration documents.
#[derive(Debug, Clone)]
pub struct ClientConfigurator {
    resolver: PathResolver,
    commands: CommandBuilder,
    os: OsFamily,
    entry_name: String,
}

impl ClientConfigurator {
    pub fn new(
        resolver: PathResolver,
        commands: CommandBuilder,
        os: OsFamily,
        entry_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            commands,
            os,
            entry_name: entry_name.into(),
        }
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn commands(&self) -> &CommandBuilder {
        &self.commands
    }

    /// Document `client` uses for `scope`.
    pub fn target_path(&self, client: ClientId, scope: Scope) -> Result<PathBuf> {
        self.resolver.resolve_scoped(client, self.os, scope)
    }

    /// Register the service with `client`, building the descriptor flavor
    /// the client expects.
    ///
    /// Simple descriptors need the helper script; it is written if missing.
    pub fn apply(&self, client: ClientId, scope: Scope) -> Result<Registration> {
        let descriptor = client.descriptor();
        if descriptor.launch == LaunchFlavor::Simple
            && !self.commands.helper_script_path().is_file()
        {
            self.commands.write_helper_script()?;
        }
        let launch = self.commands.build(descriptor.launch);
        self.apply_descriptor(client, &launch, scope)
    }

    /// Merge `launch` into `client`'s document for `scope`.
    pub fn apply_descriptor(
        &self,
        client: ClientId,
        launch: &ServiceLaunchDescriptor,
        scope: Scope,
    ) -> Result<Registration> {
        let schema = self.schema(client, scope)?;
        let path = self.target_path(client, scope)?;

        let (outcome, backup) = match schema {
            SchemaVariant::JsonContainer { path: keys, include_type } => {
                let mut doc = JsonDocument::load(&path)?;
                let backup = back_up_unreadable(client, &path, doc.recovered_from())?;
                let outcome = doc.upsert(keys, &self.entry_name, launch.to_json(include_type));
                write_atomic(&path, &doc.to_pretty_string()?)?;
                (outcome, backup)
            }
            SchemaVariant::TomlSection { table } => {
                let mut doc = TomlAppendDocument::load(&path)?;
                let backup = back_up_unreadable(client, &path, doc.recovered_from())?;
                let outcome =
                    doc.append_section(table, &self.entry_name, &launch.to_toml_table())?;
                if outcome == MergeOutcome::Added {
                    write_atomic(&path, doc.text())?;
                }
                (outcome, backup)
            }
        };

        tracing::info!(
            client = %client,
            scope = %scope,
            path = %path.display(),
            outcome = ?outcome,
            "registered service"
        );

        Ok(Registration {
            client,
            scope,
            path,
            outcome,
            backup,
        })
    }

    /// Report whether the entry is present, without writing anything.
    pub fn inspect(&self, client: ClientId, scope: Scope) -> Result<RegistrationStatus> {
        let schema = self.schema(client, scope)?;
        let path = self.target_path(client, scope)?;
        if !path.exists() {
            return Ok(RegistrationStatus::NoConfigFile);
        }

        let registered = match schema {
            SchemaVariant::JsonContainer { path: keys, .. } => {
                let doc = JsonDocument::load(&path)?;
                if let Some(reason) = doc.recovered_from() {
                    return Ok(RegistrationStatus::Unreadable(reason.to_string()));
                }
                doc.entry(keys, &self.entry_name).is_some()
            }
            SchemaVariant::TomlSection { table } => {
                let doc = TomlAppendDocument::load(&path)?;
                if let Some(reason) = doc.recovered_from() {
                    return Ok(RegistrationStatus::Unreadable(reason.to_string()));
                }
                doc.contains_section(&TomlAppendDocument::header(table, &self.entry_name))
            }
        };

        Ok(if registered {
            RegistrationStatus::Registered
        } else {
            RegistrationStatus::NotRegistered
        })
    }

    fn schema(&self, client: ClientId, scope: Scope) -> Result<SchemaVariant> {
        let descriptor = client.descriptor();
        descriptor
            .schema_for(scope)
            .ok_or_else(|| ConfigError::UnsupportedScope {
                client: descriptor.display_name.to_string(),
                scope: scope.to_string(),
            })
    }
}

fn back_up_unreadable(client: ClientId, path: &Path, reason: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(reason) = reason else {
        return Ok(None);
    };
    tracing::warn!(
        client = %client,
        path = %path.display(),
        reason,
        "existing config is unreadable; starting from an empty document"
    );
    backup_file(path).map(Some)
}

/// Copy `path` to `<path>.bak`.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    let backup = path.with_file_name(name);
    std::fs::copy(path, &backup).map_err(|e| ConfigError::WriteFile {
        path: backup.display().to_string(),
        source: e,
    })?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::SERVICE_NAME;
    use crate::launch::MODE_VAR;
    use crate::paths::BaseDirs;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        home: PathBuf,
        install: PathBuf,
        configurator: ClientConfigurator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let work = dir.path().join("work");
        let install = work.join("hytale-rag");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&install).unwrap();

        let os = OsFamily::Linux;
        let resolver = PathResolver::new(BaseDirs::rooted(&home)).with_workspace_root(&work);
        let configurator = ClientConfigurator::new(
            resolver,
            CommandBuilder::new(&install, os),
            os,
            SERVICE_NAME,
        );
        Fixture {
            _dir: dir,
            home,
            install,
            configurator,
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_idempotent_for_every_client() {
        let f = fixture();
        for client in ClientId::ALL {
            let first = f.configurator.apply(client, Scope::Global).unwrap();
            let after_first = std::fs::read_to_string(&first.path).unwrap();
            let second = f.configurator.apply(client, Scope::Global).unwrap();
            let after_second = std::fs::read_to_string(&second.path).unwrap();

            assert_eq!(first.outcome, MergeOutcome::Added, "{client}");
            assert_ne!(second.outcome, MergeOutcome::Added, "{client}");
            assert_eq!(after_first, after_second, "{client}");
            assert_eq!(
                f.configurator.inspect(client, Scope::Global).unwrap(),
                RegistrationStatus::Registered,
                "{client}"
            );
        }
    }

    #[test]
    fn test_json_merge_preserves_unrelated_keys() {
        let f = fixture();
        let path = f.home.join(".claude.json");
        std::fs::write(
            &path,
            r#"{"numStartups": 4, "mcpServers": {"other": {"command": "node"}}}"#,
        )
        .unwrap();

        f.configurator.apply(ClientId::ClaudeCode, Scope::Global).unwrap();
        f.configurator.apply(ClientId::ClaudeCode, Scope::Global).unwrap();

        let doc = read_json(&path);
        assert_eq!(doc["numStartups"], json!(4));
        assert_eq!(doc["mcpServers"]["other"], json!({"command": "node"}));
        let servers = doc["mcpServers"].as_object().unwrap();
        assert_eq!(servers.len(), 2);
        let entry = &servers[SERVICE_NAME];
        assert_eq!(entry["type"], json!("stdio"));
        assert_eq!(entry["command"], json!("bash"));
        assert_eq!(entry["env"][MODE_VAR], json!("mcp"));
    }

    #[test]
    fn test_nested_vscode_settings() {
        let f = fixture();
        let path = f.home.join(".config/Code/User/settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"editor.tabSize": 2, "mcp": {"inputs": []}}"#).unwrap();

        let reg = f.configurator.apply(ClientId::Vscode, Scope::Global).unwrap();
        assert_eq!(reg.path, path);

        let doc = read_json(&path);
        assert_eq!(doc["editor.tabSize"], json!(2));
        assert_eq!(doc["mcp"]["inputs"], json!([]));
        let entry = &doc["mcp"]["servers"][SERVICE_NAME];
        assert!(entry.get("type").is_none());
        assert_eq!(
            entry["args"],
            json!([f.install.join("start-mcp.sh").display().to_string()])
        );
        assert!(f.install.join("start-mcp.sh").is_file());
    }

    #[test]
    fn test_schema_isolation() {
        let f = fixture();
        let cursor = f.configurator.target_path(ClientId::Cursor, Scope::Global).unwrap();
        std::fs::create_dir_all(cursor.parent().unwrap()).unwrap();
        std::fs::write(&cursor, "{\"keep\": true}\n").unwrap();

        f.configurator.apply(ClientId::ClaudeCode, Scope::Global).unwrap();
        f.configurator.apply(ClientId::Windsurf, Scope::Global).unwrap();

        assert_eq!(std::fs::read_to_string(&cursor).unwrap(), "{\"keep\": true}\n");
        for other in [ClientId::Codex, ClientId::Jetbrains, ClientId::GeminiCli] {
            let p = f.configurator.target_path(other, Scope::Global).unwrap();
            assert!(!p.exists(), "{other} should be untouched");
        }
    }

    #[test]
    fn test_unparseable_file_is_backed_up() {
        let f = fixture();
        let path = f.home.join(".codeium/windsurf/mcp_config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ broken").unwrap();

        assert_eq!(
            f.configurator.inspect(ClientId::Windsurf, Scope::Global).unwrap().label(),
            "unreadable"
        );

        let reg = f.configurator.apply(ClientId::Windsurf, Scope::Global).unwrap();
        let backup = reg.backup.unwrap();
        assert_eq!(backup, path.with_file_name("mcp_config.json.bak"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "{ broken");
        assert!(read_json(&path)["mcpServers"][SERVICE_NAME].is_object());
    }

    #[test]
    fn test_non_utf8_file_is_backed_up() {
        let f = fixture();
        let path = f.home.join(".claude.json");
        std::fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

        let reg = f.configurator.apply(ClientId::ClaudeCode, Scope::Global).unwrap();
        let backup = reg.backup.unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), vec![0xff, 0xfe, b'{', b'}']);
        assert!(read_json(&path)["mcpServers"][SERVICE_NAME].is_object());

        let codex = f.home.join(".codex/config.toml");
        std::fs::create_dir_all(codex.parent().unwrap()).unwrap();
        std::fs::write(&codex, [0xc3, 0x28]).unwrap();
        assert_eq!(
            f.configurator.inspect(ClientId::Codex, Scope::Global).unwrap().label(),
            "unreadable"
        );
        let reg = f.configurator.apply(ClientId::Codex, Scope::Global).unwrap();
        assert_eq!(reg.backup, Some(codex.with_file_name("config.toml.bak")));
        let parsed: toml::Table = std::fs::read_to_string(&codex).unwrap().parse().unwrap();
        assert!(parsed["mcp_servers"][SERVICE_NAME].is_table());
    }

    #[test]
    fn test_codex_full_descriptor_keeps_env_in_section() {
        let f = fixture();
        let launch = f.configurator.commands().full();
        f.configurator
            .apply_descriptor(ClientId::Codex, &launch, Scope::Global)
            .unwrap();

        let text = std::fs::read_to_string(f.home.join(".codex/config.toml")).unwrap();
        let parsed: toml::Table = text.parse().unwrap();
        assert!(parsed.get("env").is_none());
        assert!(parsed["mcp_servers"][SERVICE_NAME]["env"][MODE_VAR].is_str());
    }

    #[test]
    fn test_codex_append_once() {
        let f = fixture();
        let path = f.home.join(".codex/config.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "model = \"o4-mini\"\n").unwrap();

        let first = f.configurator.apply(ClientId::Codex, Scope::Global).unwrap();
        let second = f.configurator.apply(ClientId::Codex, Scope::Global).unwrap();
        assert_eq!(first.outcome, MergeOutcome::Added);
        assert_eq!(second.outcome, MergeOutcome::AlreadyPresent);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("[mcp_servers.hytale-rag]").count(), 1);
        let parsed: toml::Table = text.parse().unwrap();
        assert_eq!(parsed["model"].as_str(), Some("o4-mini"));
        assert_eq!(
            parsed["mcp_servers"]["hytale-rag"]["command"].as_str(),
            Some("bash")
        );
    }

    #[test]
    fn test_workspace_scope() {
        let f = fixture();
        let reg = f.configurator.apply(ClientId::Vscode, Scope::Workspace).unwrap();
        assert_eq!(reg.path, f.install.parent().unwrap().join(".vscode/mcp.json"));
        assert!(read_json(&reg.path)["servers"][SERVICE_NAME].is_object());

        // global settings untouched
        let global = f.configurator.target_path(ClientId::Vscode, Scope::Global).unwrap();
        assert!(!global.exists());
    }

    #[test]
    fn test_workspace_scope_unsupported() {
        let f = fixture();
        let err = f
            .configurator
            .apply(ClientId::ClaudeCode, Scope::Workspace)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScope { .. }));
    }

    #[test]
    fn test_inspect_states() {
        let f = fixture();
        assert_eq!(
            f.configurator.inspect(ClientId::GeminiCli, Scope::Global).unwrap(),
            RegistrationStatus::NoConfigFile
        );
        let path = f.home.join(".gemini/settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();
        assert_eq!(
            f.configurator.inspect(ClientId::GeminiCli, Scope::Global).unwrap(),
            RegistrationStatus::NotRegistered
        );
    }

    #[test]
    fn test_apply_descriptor_overwrites_entry() {
        let f = fixture();
        let path = f.home.join(".claude.json");
        std::fs::write(
            &path,
            r#"{"mcpServers": {"hytale-rag": {"command": "stale"}}}"#,
        )
        .unwrap();

        let launch = f.configurator.commands().full();
        let reg = f
            .configurator
            .apply_descriptor(ClientId::ClaudeCode, &launch, Scope::Global)
            .unwrap();
        assert_eq!(reg.outcome, MergeOutcome::Updated);
        assert_eq!(read_json(&path)["mcpServers"][SERVICE_NAME], launch.to_json(true));
    }
}
