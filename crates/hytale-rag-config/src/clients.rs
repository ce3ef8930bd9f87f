//! Static catalog of developer-tool clients that can launch the service.
//!
//! Each client keeps one configuration document at a well-known location and
//! expects the server entry at a client-specific key path. That variability
//! is captured by [`SchemaVariant`], a closed set the configurator dispatches
//! on, instead of per-client branches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Name of the entry written into every client document.
pub const SERVICE_NAME: &str = "hytale-rag";

/// Stable client identifiers.
///
/// Discriminants index into the catalog table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientId {
    ClaudeCode = 0,
    Vscode = 1,
    Cursor = 2,
    Windsurf = 3,
    Codex = 4,
    Jetbrains = 5,
    GeminiCli = 6,
}

impl ClientId {
    /// All clients in catalog order.
    pub const ALL: [ClientId; 7] = [
        ClientId::ClaudeCode,
        ClientId::Vscode,
        ClientId::Cursor,
        ClientId::Windsurf,
        ClientId::Codex,
        ClientId::Jetbrains,
        ClientId::GeminiCli,
    ];

    /// Stable key used on the command line and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientId::ClaudeCode => "claude_code",
            ClientId::Vscode => "vscode",
            ClientId::Cursor => "cursor",
            ClientId::Windsurf => "windsurf",
            ClientId::Codex => "codex",
            ClientId::Jetbrains => "jetbrains",
            ClientId::GeminiCli => "gemini_cli",
        }
    }

    /// Static descriptor for this client.
    pub fn descriptor(&self) -> &'static ClientDescriptor {
        &CATALOG[*self as usize]
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ClientId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownClient(s.to_string()))
    }
}

/// Comma-separated list of catalog ids, for error messages.
pub(crate) fn known_ids() -> String {
    ClientId::ALL
        .iter()
        .map(ClientId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the configuration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Per-user configuration.
    Global,
    /// Project-local configuration in the workspace root.
    Workspace,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Workspace => f.write_str("workspace"),
        }
    }
}

/// On-disk format of a client's configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigFormat {
    /// JSON with the server map nested under a namespace.
    JsonNested,
    /// JSON with the server map at the top level.
    JsonFlat,
    /// TOML edited by appending a named section.
    TomlAppend,
}

/// Which launch descriptor flavor a client receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFlavor {
    /// Inline shell fragment that loads the environment file itself.
    Full,
    /// Invocation of the pre-generated helper script.
    Simple,
}

/// Location of the per-client container that holds server entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// A JSON object reached by `path` from the document root.
    JsonContainer {
        path: &'static [&'static str],
        /// Whether entries carry a `"type"` transport key.
        include_type: bool,
    },
    /// An append-only TOML section `[<table>.<entry>]`.
    TomlSection { table: &'static str },
}

impl SchemaVariant {
    /// Human-readable key path, for messages.
    pub fn describe(&self) -> String {
        match self {
            SchemaVariant::JsonContainer { path, .. } => path.join("."),
            SchemaVariant::TomlSection { table } => format!("[{}.*]", table),
        }
    }
}

/// Global configuration file location convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// The same path below the home directory on every OS.
    Home(&'static [&'static str]),
    /// `<app support>/<app>/User/settings.json` for VS Code-derived editors.
    EditorUserSettings(&'static str),
    /// Below `~/.config` on POSIX systems and `%LOCALAPPDATA%` on Windows.
    XdgOrLocalAppData(&'static [&'static str]),
}

/// Project-local configuration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceTarget {
    /// Directory below the workspace root.
    pub dir: &'static str,
    /// File name inside `dir`.
    pub file: &'static str,
    /// Container layout of the workspace file.
    pub schema: SchemaVariant,
}

/// Catalog entry describing one client.
#[derive(Debug, Clone, Copy)]
pub struct ClientDescriptor {
    pub id: ClientId,
    pub display_name: &'static str,
    pub description: &'static str,
    pub format: ConfigFormat,
    pub location: ConfigLocation,
    pub schema: SchemaVariant,
    pub launch: LaunchFlavor,
    pub workspace: Option<WorkspaceTarget>,
}

impl ClientDescriptor {
    /// Container layout for `scope`, if the client supports it.
    pub fn schema_for(&self, scope: Scope) -> Option<SchemaVariant> {
        match scope {
            Scope::Global => Some(self.schema),
            Scope::Workspace => self.workspace.map(|w| w.schema),
        }
    }

    /// Whether the client reads a project-local configuration file.
    pub fn supports_workspace(&self) -> bool {
        self.workspace.is_some()
    }
}

const MCP_SERVERS: &[&str] = &["mcpServers"];
const SERVERS: &[&str] = &["servers"];

static CATALOG: [ClientDescriptor; 7] = [
    ClientDescriptor {
        id: ClientId::ClaudeCode,
        display_name: "Claude Code",
        description: "Anthropic's CLI tool for Claude",
        format: ConfigFormat::JsonFlat,
        location: ConfigLocation::Home(&[".claude.json"]),
        schema: SchemaVariant::JsonContainer {
            path: MCP_SERVERS,
            include_type: true,
        },
        launch: LaunchFlavor::Full,
        workspace: None,
    },
    ClientDescriptor {
        id: ClientId::Vscode,
        display_name: "VS Code / GitHub Copilot",
        description: "Works with Copilot in Agent mode (VS Code 1.102+)",
        format: ConfigFormat::JsonNested,
        location: ConfigLocation::EditorUserSettings("Code"),
        schema: SchemaVariant::JsonContainer {
            path: &["mcp", "servers"],
            include_type: false,
        },
        launch: LaunchFlavor::Simple,
        workspace: Some(WorkspaceTarget {
            dir: ".vscode",
            file: "mcp.json",
            schema: SchemaVariant::JsonContainer {
                path: SERVERS,
                include_type: false,
            },
        }),
    },
    ClientDescriptor {
        id: ClientId::Cursor,
        display_name: "Cursor",
        description: "AI-first code editor",
        format: ConfigFormat::JsonFlat,
        location: ConfigLocation::EditorUserSettings("Cursor"),
        schema: SchemaVariant::JsonContainer {
            path: MCP_SERVERS,
            include_type: true,
        },
        launch: LaunchFlavor::Simple,
        workspace: Some(WorkspaceTarget {
            dir: ".cursor",
            file: "mcp.json",
            schema: SchemaVariant::JsonContainer {
                path: MCP_SERVERS,
                include_type: true,
            },
        }),
    },
    ClientDescriptor {
        id: ClientId::Windsurf,
        display_name: "Windsurf",
        description: "Codeium's AI code editor",
        format: ConfigFormat::JsonFlat,
        location: ConfigLocation::Home(&[".codeium", "windsurf", "mcp_config.json"]),
        schema: SchemaVariant::JsonContainer {
            path: MCP_SERVERS,
            include_type: true,
        },
        launch: LaunchFlavor::Simple,
        workspace: None,
    },
    ClientDescriptor {
        id: ClientId::Codex,
        display_name: "Codex CLI",
        description: "OpenAI's command-line coding tool",
        format: ConfigFormat::TomlAppend,
        location: ConfigLocation::Home(&[".codex", "config.toml"]),
        schema: SchemaVariant::TomlSection {
            table: "mcp_servers",
        },
        launch: LaunchFlavor::Simple,
        workspace: None,
    },
    ClientDescriptor {
        id: ClientId::Jetbrains,
        display_name: "JetBrains IDEs (IntelliJ, Rider, etc.)",
        description: "GitHub Copilot in JetBrains IDEs",
        format: ConfigFormat::JsonFlat,
        location: ConfigLocation::XdgOrLocalAppData(&["github-copilot", "intellij", "mcp.json"]),
        schema: SchemaVariant::JsonContainer {
            path: SERVERS,
            include_type: false,
        },
        launch: LaunchFlavor::Simple,
        workspace: None,
    },
    ClientDescriptor {
        id: ClientId::GeminiCli,
        display_name: "Gemini CLI",
        description: "Google's command-line AI coding tool",
        format: ConfigFormat::JsonFlat,
        location: ConfigLocation::Home(&[".gemini", "settings.json"]),
        schema: SchemaVariant::JsonContainer {
            path: MCP_SERVERS,
            include_type: false,
        },
        launch: LaunchFlavor::Simple,
        workspace: None,
    },
];

/// The full catalog in display order.
pub fn catalog() -> &'static [ClientDescriptor] {
    &CATALOG
}
