//! Service launch descriptors.
//!
//! Clients start the service as a subprocess. Some clients cannot declare
//! environment variables themselves, so every descriptor loads the install
//! directory's `.env` before starting the service: the *full* flavor inlines
//! that logic in a shell fragment, the *simple* flavor points at a helper
//! script written by [`CommandBuilder::write_helper_script`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clients::LaunchFlavor;
use crate::envfile::ENV_FILE_NAME;
use crate::platform::OsFamily;
use crate::{ConfigError, Result};

/// Command that starts the service from the install directory.
pub const SERVICE_COMMAND: &str = "npx tsx src/index.ts";

/// Environment variable selecting the service's stdio mode.
pub const MODE_VAR: &str = "HYTALE_RAG_MODE";

/// Value of [`MODE_VAR`] for client-launched processes.
pub const MODE_VALUE: &str = "mcp";

/// Helper script name on POSIX systems.
pub const POSIX_SCRIPT: &str = "start-mcp.sh";

/// Helper script name on Windows.
pub const WINDOWS_SCRIPT: &str = "start-mcp.ps1";

/// Transport a client uses to talk to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
        }
    }
}

/// Executable, arguments and environment a client uses to start the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLaunchDescriptor {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub transport: TransportKind,
}

impl ServiceLaunchDescriptor {
    /// JSON entry as written into client documents.
    ///
    /// `env` is omitted when empty.
    pub fn to_json(&self, include_type: bool) -> Value {
        let mut entry = Map::new();
        if include_type {
            entry.insert("type".into(), Value::from(self.transport.as_str()));
        }
        entry.insert("command".into(), Value::from(self.command.clone()));
        entry.insert("args".into(), Value::from(self.args.clone()));
        if !self.env.is_empty() {
            let env: Map<String, Value> = self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect();
            entry.insert("env".into(), Value::Object(env));
        }
        Value::Object(entry)
    }

    /// TOML body (without header) for append-only documents.
    pub fn to_toml_table(&self) -> toml::Table {
        let mut table = toml::Table::new();
        table.insert("command".into(), toml::Value::String(self.command.clone()));
        table.insert(
            "args".into(),
            toml::Value::Array(
                self.args
                    .iter()
                    .cloned()
                    .map(toml::Value::String)
                    .collect(),
            ),
        );
        if !self.env.is_empty() {
            let env: toml::Table = self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), toml::Value::String(v.clone())))
                .collect();
            table.insert("env".into(), toml::Value::Table(env));
        }
        table
    }
}

/// Builds launch descriptors for one install directory and OS family.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    install_dir: PathBuf,
    os: OsFamily,
}

impl CommandBuilder {
    pub fn new(install_dir: impl Into<PathBuf>, os: OsFamily) -> Self {
        Self {
            install_dir: install_dir.into(),
            os,
        }
    }

    /// The install directory descriptors point at.
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Build the descriptor of the requested flavor.
    pub fn build(&self, flavor: LaunchFlavor) -> ServiceLaunchDescriptor {
        match flavor {
            LaunchFlavor::Full => self.full(),
            LaunchFlavor::Simple => self.simple(),
        }
    }

    /// Inline descriptor that loads `.env` and starts the service.
    pub fn full(&self) -> ServiceLaunchDescriptor {
        let dir = self.install_dir.display().to_string();
        let (command, args) = match self.os {
            OsFamily::Windows => {
                let script = format!(
                    "Set-Location {}; \
                     Get-Content {} | ForEach-Object {{ \
                     if ($_ -match '^([^=]+)=(.*)$') {{ \
                     [Environment]::SetEnvironmentVariable($matches[1], $matches[2]) \
                     }} }}; \
                     {}",
                    ps_quote(&dir),
                    ENV_FILE_NAME,
                    SERVICE_COMMAND
                );
                ("powershell", powershell_args(["-Command", script.as_str()]))
            }
            OsFamily::Linux | OsFamily::MacOS => {
                let script = format!(
                    "cd {} && set -a && source {} && set +a && {}",
                    sh_quote(&dir),
                    ENV_FILE_NAME,
                    SERVICE_COMMAND
                );
                ("bash", vec!["-c".to_string(), script])
            }
        };

        let mut env = BTreeMap::new();
        env.insert(MODE_VAR.to_string(), MODE_VALUE.to_string());

        ServiceLaunchDescriptor {
            command: command.to_string(),
            args,
            env,
            transport: TransportKind::Stdio,
        }
    }

    /// Descriptor that runs the helper script.
    pub fn simple(&self) -> ServiceLaunchDescriptor {
        let script = self.helper_script_path().display().to_string();
        let (command, args) = match self.os {
            OsFamily::Windows => ("powershell", powershell_args(["-File", script.as_str()])),
            OsFamily::Linux | OsFamily::MacOS => ("bash", vec![script]),
        };

        ServiceLaunchDescriptor {
            command: command.to_string(),
            args,
            env: BTreeMap::new(),
            transport: TransportKind::Stdio,
        }
    }

    /// Location of the helper script for this OS.
    pub fn helper_script_path(&self) -> PathBuf {
        let name = if self.os.is_windows() {
            WINDOWS_SCRIPT
        } else {
            POSIX_SCRIPT
        };
        self.install_dir.join(name)
    }

    /// Text of the helper script for this OS.
    pub fn helper_script_contents(&self) -> String {
        let dir = self.install_dir.display().to_string();
        match self.os {
            OsFamily::Windows => format!(
                "# Hytale RAG MCP server startup script\n\
                 Set-Location {dir}\n\
                 Get-Content {env} | ForEach-Object {{\n\
                 \x20   if ($_ -match '^([^=]+)=(.*)$') {{\n\
                 \x20       [Environment]::SetEnvironmentVariable($matches[1], $matches[2])\n\
                 \x20   }}\n\
                 }}\n\
                 $env:{var} = \"{val}\"\n\
                 {cmd}\n",
                dir = ps_quote(&dir),
                env = ENV_FILE_NAME,
                var = MODE_VAR,
                val = MODE_VALUE,
                cmd = SERVICE_COMMAND,
            ),
            OsFamily::Linux | OsFamily::MacOS => format!(
                "#!/bin/bash\n\
                 # Hytale RAG MCP server startup script\n\
                 cd {dir}\n\
                 set -a\n\
                 source {env}\n\
                 set +a\n\
                 export {var}={val}\n\
                 {cmd}\n",
                dir = sh_quote(&dir),
                env = ENV_FILE_NAME,
                var = MODE_VAR,
                val = MODE_VALUE,
                cmd = SERVICE_COMMAND,
            ),
        }
    }

    /// Write the helper script, marking it executable on POSIX systems.
    pub fn write_helper_script(&self) -> Result<PathBuf> {
        let path = self.helper_script_path();
        std::fs::write(&path, self.helper_script_contents()).map_err(|e| {
            ConfigError::WriteFile {
                path: path.display().to_string(),
                source: e,
            }
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if !self.os.is_windows() {
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                    .map_err(|e| ConfigError::WriteFile {
                        path: path.display().to_string(),
                        source: e,
                    })?;
            }
        }

        tracing::info!(path = %path.display(), "wrote helper script");
        Ok(path)
    }
}

fn powershell_args<const N: usize>(tail: [&str; N]) -> Vec<String> {
    ["-NoProfile", "-ExecutionPolicy", "Bypass"]
        .into_iter()
        .chain(tail)
        .map(str::to_string)
        .collect()
}

/// Single-quote for POSIX shells.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Single-quote for PowerShell.
fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
