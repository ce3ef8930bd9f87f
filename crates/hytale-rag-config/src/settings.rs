//! Setup settings.
//!
//! Resolution order (later overrides earlier):
//! 1. Built-in defaults
//! 2. `<install dir>/hytale-rag.toml`
//! 3. Environment variables (`HYTALE_RAG_RELEASES_API`, `HYTALE_RAG_RELEASES_REPO`,
//!    `OLLAMA_HOST`, `HYTALE_RAG_OLLAMA_MODEL`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clients::SERVICE_NAME;
use crate::{ConfigError, Result};

/// Settings filename inside the install directory.
pub const SETTINGS_FILE: &str = "hytale-rag.toml";

pub const RELEASES_API_ENV: &str = "HYTALE_RAG_RELEASES_API";
pub const RELEASES_REPO_ENV: &str = "HYTALE_RAG_RELEASES_REPO";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const OLLAMA_MODEL_ENV: &str = "HYTALE_RAG_OLLAMA_MODEL";

/// Top-level setup settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupSettings {
    pub releases: ReleaseSettings,
    pub runtime: RuntimeSettings,
    pub service: ServiceSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Releases
// ─────────────────────────────────────────────────────────────────────────────

/// Where prebuilt dataset archives are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    /// Base URL of the releases API.
    pub api_base: String,
    /// `owner/name` of the repository publishing the archives.
    pub repo: String,
    /// Leading component of archive asset names.
    pub asset_prefix: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            repo: "logan-mcduffie/Hytale-Toolkit".to_string(),
            asset_prefix: "lancedb".to_string(),
        }
    }
}

impl ReleaseSettings {
    /// Metadata URL of the latest release.
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.repo
        )
    }

    /// Browser page users can download archives from by hand.
    pub fn manual_download_url(&self) -> String {
        format!("https://github.com/{}/releases/latest", self.repo)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local runtime
// ─────────────────────────────────────────────────────────────────────────────

/// Local embedding runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Base URL of the runtime's HTTP API.
    pub base_url: String,
    /// Embedding model that must be pulled.
    pub model: String,
    /// Health polls after starting the runtime.
    pub health_attempts: u32,
    /// Delay between health polls, in milliseconds.
    pub health_interval_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            health_attempts: 10,
            health_interval_ms: 1000,
        }
    }
}

impl RuntimeSettings {
    /// Health polls to make; never fewer than one.
    pub fn poll_attempts(&self) -> u32 {
        self.health_attempts.max(1)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for the entry written into client documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Entry name under each client's server container.
    pub entry_name: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            entry_name: SERVICE_NAME.to_string(),
        }
    }
}

/// Result of settings loading.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: SetupSettings,
    /// The settings file that was checked.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
    /// Problems that were recovered from by falling back to defaults.
    pub warnings: Vec<String>,
}

impl SetupSettings {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load settings for `install_dir`, then apply environment overrides.
    ///
    /// A malformed file is reported as a warning and defaults are used.
    pub fn load(install_dir: &Path) -> LoadedSettings {
        Self::load_with_env(install_dir, |key| std::env::var(key).ok())
    }

    /// Like [`SetupSettings::load`] with an explicit environment lookup.
    pub fn load_with_env(
        install_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> LoadedSettings {
        let path = install_dir.join(SETTINGS_FILE);
        let mut warnings = Vec::new();
        let mut loaded = false;

        let mut settings = if path.is_file() {
            match read_file(&path).and_then(|text| Self::from_toml(&text)) {
                Ok(settings) => {
                    loaded = true;
                    settings
                }
                Err(e) => {
                    warnings.push(format!("Failed to load {}: {}", path.display(), e));
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        if settings.runtime.health_attempts == 0 {
            warnings.push(format!(
                "{}: runtime.health_attempts must be at least 1; using 1",
                path.display()
            ));
            settings.runtime.health_attempts = 1;
        }

        settings.apply_env_overrides(env);

        LoadedSettings {
            settings,
            path,
            loaded,
            warnings,
        }
    }

    /// Override fields from environment variables; empty values are ignored.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(api) = get(RELEASES_API_ENV) {
            self.releases.api_base = api;
        }
        if let Some(repo) = get(RELEASES_REPO_ENV) {
            self.releases.repo = repo;
        }
        if let Some(host) = get(OLLAMA_HOST_ENV) {
            self.runtime.base_url = normalize_host(&host);
        }
        if let Some(model) = get(OLLAMA_MODEL_ENV) {
            self.runtime.model = model;
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// `OLLAMA_HOST` is commonly a bare `host:port`.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
