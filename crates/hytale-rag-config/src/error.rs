//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while resolving, reading or writing client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize a TOML section.
    #[error("failed to serialize TOML: {0}")]
    SerializeToml(#[from] toml::ser::Error),

    /// Failed to serialize a JSON document.
    #[error("failed to serialize JSON: {0}")]
    SerializeJson(#[from] serde_json::Error),

    /// Client id not present in the catalog.
    #[error("unknown client '{0}' (expected one of: {known})", known = crate::clients::known_ids())]
    UnknownClient(String),

    /// The client has no configuration file for the requested scope.
    #[error("{client} does not support {scope} configuration")]
    UnsupportedScope { client: String, scope: String },

    /// Workspace scope requested but no workspace root is known.
    #[error("no workspace root available for workspace-scoped configuration")]
    NoWorkspaceRoot,

    /// The home directory could not be determined.
    #[error("could not determine the home directory; set HOME (or USERPROFILE on Windows)")]
    HomeDirUnavailable,
}
