//! Client configuration path resolution.
//!
//! Resolution is a pure function of the catalog table, the OS family and a
//! set of base directories. The base directories are captured once via
//! [`BaseDirs::detect`] so that every (client, OS) pair can be resolved and
//! tested on any host.
//!
//! | Convention | Linux | macOS | Windows |
//! |---|---|---|---|
//! | `Home` | `~/<rel>` | `~/<rel>` | `%USERPROFILE%\<rel>` |
//! | `EditorUserSettings` | `~/.config/<App>/User` | `~/Library/Application Support/<App>/User` | `%APPDATA%\<App>\User` |
//! | `XdgOrLocalAppData` | `~/.config/<rel>` | `~/.config/<rel>` | `%LOCALAPPDATA%\<rel>` |

use std::path::{Path, PathBuf};

use crate::clients::{ClientId, ConfigLocation, Scope};
use crate::platform::OsFamily;
use crate::{ConfigError, Result};

/// Base directories used by the client conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDirs {
    /// User home directory.
    pub home: PathBuf,
    /// Roaming application data (`%APPDATA%`), Windows only.
    pub roaming_app_data: PathBuf,
    /// Local application data (`%LOCALAPPDATA%`), Windows only.
    pub local_app_data: PathBuf,
}

impl BaseDirs {
    /// Derive every base directory from a home directory, using the
    /// default Windows profile layout for the app-data folders.
    pub fn rooted(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            roaming_app_data: home.join("AppData").join("Roaming"),
            local_app_data: home.join("AppData").join("Local"),
            home,
        }
    }

    /// Detect the base directories of the current user.
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
        let mut base = Self::rooted(home);
        if cfg!(windows) {
            if let Some(roaming) = dirs::config_dir() {
                base.roaming_app_data = roaming;
            }
            if let Some(local) = dirs::data_local_dir() {
                base.local_app_data = local;
            }
        }
        Ok(base)
    }
}

/// Maps a client and OS family to the client's configuration file.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: BaseDirs,
    workspace_root: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver over the given base directories.
    pub fn new(base: BaseDirs) -> Self {
        Self {
            base,
            workspace_root: None,
        }
    }

    /// Set the project root used for workspace-scoped configuration.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// The configured workspace root, if any.
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// Resolve the global (per-user) configuration file of `client`.
    pub fn resolve(&self, client: ClientId, os: OsFamily) -> PathBuf {
        match client.descriptor().location {
            ConfigLocation::Home(rel) => join_all(&self.base.home, rel),
            ConfigLocation::EditorUserSettings(app) => {
                let support = match os {
                    OsFamily::Windows => self.base.roaming_app_data.clone(),
                    OsFamily::MacOS => self
                        .base
                        .home
                        .join("Library")
                        .join("Application Support"),
                    OsFamily::Linux => self.base.home.join(".config"),
                };
                support.join(app).join("User").join("settings.json")
            }
            ConfigLocation::XdgOrLocalAppData(rel) => match os {
                OsFamily::Windows => join_all(&self.base.local_app_data, rel),
                OsFamily::Linux | OsFamily::MacOS => {
                    join_all(&self.base.home.join(".config"), rel)
                }
            },
        }
    }

    /// Resolve the configuration file of `client` for `scope`.
    pub fn resolve_scoped(&self, client: ClientId, os: OsFamily, scope: Scope) -> Result<PathBuf> {
        match scope {
            Scope::Global => Ok(self.resolve(client, os)),
            Scope::Workspace => {
                let target =
                    client
                        .descriptor()
                        .workspace
                        .ok_or_else(|| ConfigError::UnsupportedScope {
                            client: client.descriptor().display_name.to_string(),
                            scope: scope.to_string(),
                        })?;
                let root = self
                    .workspace_root
                    .as_ref()
                    .ok_or(ConfigError::NoWorkspaceRoot)?;
                Ok(root.join(target.dir).join(target.file))
            }
        }
    }
}

fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, p| acc.join(p))
}
