//! The install directory's `.env` file: provider selection and secrets.
//!
//! Lines are `KEY=VALUE`, split on the first `=`. Blank lines, `#` comments
//! and lines without `=` are skipped. Unknown keys survive a load/save cycle.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::write_atomic;
use crate::{ConfigError, Result};

/// File name inside the install directory.
pub const ENV_FILE_NAME: &str = ".env";

/// Selected embedding backend.
pub const PROVIDER_KEY: &str = "EMBEDDING_PROVIDER";

/// API key for the cloud provider.
pub const VOYAGE_KEY: &str = "VOYAGE_API_KEY";

/// Model name for the local provider.
pub const OLLAMA_MODEL_KEY: &str = "OLLAMA_MODEL";

/// Embedding-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Voyage AI hosted embeddings.
    Cloud,
    /// Ollama running on this machine.
    Local,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Cloud, Provider::Local];

    /// Value written to [`PROVIDER_KEY`]; also used in asset and directory names.
    pub fn wire_value(&self) -> &'static str {
        match self {
            Provider::Cloud => "voyage",
            Provider::Local => "ollama",
        }
    }

    /// Parse a wire value or its synonym.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "voyage" | "cloud" => Some(Provider::Cloud),
            "ollama" | "local" => Some(Provider::Local),
            _ => None,
        }
    }

    /// Menu label.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Cloud => "Voyage AI (cloud, requires an API key)",
            Provider::Local => "Ollama (local, free, runs on this machine)",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_value())
    }
}

/// Provider-specific settings stored in the env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingSettings {
    Cloud { api_key: String },
    Local { model: String },
}

impl EmbeddingSettings {
    pub fn provider(&self) -> Provider {
        match self {
            EmbeddingSettings::Cloud { .. } => Provider::Cloud,
            EmbeddingSettings::Local { .. } => Provider::Local,
        }
    }
}

/// Ordered key/value lines of an env file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Parse permissively; malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut file = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line, "skipping env line without '='");
                continue;
            };
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                continue;
            }
            file.set(key, unquote(value.trim()));
        }
        file
    }

    /// Load from disk. A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::ReadFile {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    /// Write all entries to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render())
    }

    /// Render as `KEY=VALUE` lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, keeping its position if it already exists.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Provider settings, if the file holds a complete selection.
    ///
    /// A file with only `VOYAGE_API_KEY` is treated as a cloud selection.
    pub fn embedding(&self) -> Option<EmbeddingSettings> {
        let provider = match self.get(PROVIDER_KEY) {
            Some(value) => Provider::from_wire(value)?,
            None if self.get(VOYAGE_KEY).is_some() => Provider::Cloud,
            None => return None,
        };
        let non_empty = |key| self.get(key).filter(|v| !v.is_empty()).map(str::to_string);
        match provider {
            Provider::Cloud => non_empty(VOYAGE_KEY).map(|api_key| EmbeddingSettings::Cloud { api_key }),
            Provider::Local => non_empty(OLLAMA_MODEL_KEY).map(|model| EmbeddingSettings::Local { model }),
        }
    }

    /// Record the provider selection and its setting.
    pub fn set_embedding(&mut self, settings: &EmbeddingSettings) {
        self.set(PROVIDER_KEY, settings.provider().wire_value());
        match settings {
            EmbeddingSettings::Cloud { api_key } => self.set(VOYAGE_KEY, api_key.as_str()),
            EmbeddingSettings::Local { model } => self.set(OLLAMA_MODEL_KEY, model.as_str()),
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_permissive() {
        let env = EnvFile::parse(
            "# comment\n\nVOYAGE_API_KEY=pa-123=abc\nnot a pair\n=novalue\nexport OLLAMA_MODEL=\"nomic-embed-text\"\n",
        );
        assert_eq!(env.get(VOYAGE_KEY), Some("pa-123=abc"));
        assert_eq!(env.get(OLLAMA_MODEL_KEY), Some("nomic-embed-text"));
        assert_eq!(env.entries().count(), 2);
    }

    #[test]
    fn test_set_keeps_position() {
        let mut env = EnvFile::parse("A=1\nB=2\n");
        env.set("A", "3");
        env.set("C", "4");
        assert_eq!(env.render(), "A=3\nB=2\nC=4\n");
    }

    #[test]
    fn test_cloud_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ENV_FILE_NAME);

        let mut env = EnvFile::default();
        env.set_embedding(&EmbeddingSettings::Cloud {
            api_key: "pa-secret".into(),
        });
        env.save(&path).unwrap();

        let loaded = EnvFile::load(&path).unwrap();
        assert_eq!(loaded.get(PROVIDER_KEY), Some("voyage"));
        assert_eq!(
            loaded.embedding(),
            Some(EmbeddingSettings::Cloud {
                api_key: "pa-secret".into()
            })
        );
    }

    #[test]
    fn test_local_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ENV_FILE_NAME);

        let settings = EmbeddingSettings::Local {
            model: "nomic-embed-text".into(),
        };
        let mut env = EnvFile::default();
        env.set_embedding(&settings);
        env.save(&path).unwrap();

        let loaded = EnvFile::load(&path).unwrap();
        assert_eq!(loaded, env);
        assert_eq!(loaded.embedding(), Some(settings));
    }

    #[test]
    fn test_switching_provider_preserves_other_keys() {
        let mut env = EnvFile::parse("VOYAGE_API_KEY=pa-1\nCUSTOM=x\n");
        env.set_embedding(&EmbeddingSettings::Local {
            model: "m".into(),
        });
        assert_eq!(env.get("CUSTOM"), Some("x"));
        assert_eq!(env.get(VOYAGE_KEY), Some("pa-1"));
        assert_eq!(env.embedding().unwrap().provider(), Provider::Local);
    }

    #[test]
    fn test_legacy_key_only_file_is_cloud() {
        let env = EnvFile::parse("VOYAGE_API_KEY=pa-legacy\n");
        assert_eq!(
            env.embedding(),
            Some(EmbeddingSettings::Cloud {
                api_key: "pa-legacy".into()
            })
        );
    }

    #[test]
    fn test_incomplete_selection() {
        assert!(EnvFile::parse("EMBEDDING_PROVIDER=ollama\n").embedding().is_none());
        assert!(EnvFile::parse("EMBEDDING_PROVIDER=voyage\nVOYAGE_API_KEY=\n")
            .embedding()
            .is_none());
        assert!(EnvFile::parse("EMBEDDING_PROVIDER=openai\nVOYAGE_API_KEY=x\n")
            .embedding()
            .is_none());
    }

    #[test]
    fn test_provider_wire_values() {
        assert_eq!(Provider::from_wire("VOYAGE"), Some(Provider::Cloud));
        assert_eq!(Provider::from_wire("local"), Some(Provider::Local));
        assert_eq!(Provider::from_wire("other"), None);
        for p in Provider::ALL {
            assert_eq!(Provider::from_wire(p.wire_value()), Some(p));
        }
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(EnvFile::load(&dir.path().join(".env")).unwrap().is_empty());
    }
}
