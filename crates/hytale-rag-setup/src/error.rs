//! Error types for provisioning.
//!
//! Every fatal variant's message ends with what the user can do next.

use hytale_rag_config::ConfigError;
use thiserror::Error;

/// Result type alias using the setup error type.
pub type Result<T> = std::result::Result<T, SetupError>;

/// Error type for setup operations.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Client catalog, settings or env file error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error outside config documents.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A requirement of the install directory or host is not met.
    #[error("{0}")]
    Precondition(String),

    /// Reading an answer from the user failed.
    #[error("failed to read input: {0}")]
    Prompt(#[source] std::io::Error),

    /// The user declined a step that setup cannot continue without.
    #[error("{step} was declined. {guidance}")]
    Declined { step: String, guidance: String },

    /// Releases API or download failure.
    #[error("{action} failed: {source}\nDownload the archive manually from {manual_url}")]
    Network {
        action: String,
        source: reqwest::Error,
        manual_url: String,
    },

    /// The latest release has no asset with the expected name.
    #[error(
        "release has no asset named '{name}' (available: {}). Download manually from {manual_url}",
        if .available.is_empty() { "none".to_string() } else { .available.join(", ") }
    )]
    AssetNotFound {
        name: String,
        available: Vec<String>,
        manual_url: String,
    },

    /// The archive could not be unpacked.
    #[error("failed to extract '{archive}': {message}")]
    Extract { archive: String, message: String },

    /// Extraction finished but expected tables are missing.
    #[error("archive '{asset}' did not contain: {}. Re-run setup or download it manually", .missing.join(", "))]
    IncompleteArchive { asset: String, missing: Vec<String> },

    /// Verification still reports a fault after the retry, or the retry was declined.
    #[error("the {provider} dataset appears corrupted. {guidance}")]
    DatasetCorrupted { provider: String, guidance: String },

    /// The self-test could not be run.
    #[error("dataset verification could not run: {0}")]
    VerificationFailed(String),

    /// `npm install` failed.
    #[error("installing service dependencies failed: {0}. Run `npm install` in the install directory and check its output")]
    DependencyInstall(String),

    /// A subprocess could not be started.
    #[error("failed to run '{program}': {source}")]
    Process {
        program: String,
        source: std::io::Error,
    },

    /// Installing needs administrator rights the session doesn't have.
    #[error("{action} requires administrator privileges. Re-run from an Administrator terminal, or install manually from {manual_url}")]
    ElevationRequired { action: String, manual_url: String },

    /// The runtime installer failed.
    #[error("installing the local runtime failed: {detail}. Install it manually from {manual_url}")]
    RuntimeInstall { detail: String, manual_url: String },

    /// The runtime did not become healthy.
    #[error("the local runtime did not respond at {base_url} after {attempts} attempts. Start it with `ollama serve` and re-run setup")]
    RuntimeStart { attempts: u32, base_url: String },

    /// Pulling the embedding model failed.
    #[error("pulling model '{model}' failed: {detail}. Run `ollama pull {model}` manually")]
    ModelPull { model: String, detail: String },

    /// Cloud provider selected but no API key is available.
    #[error("no API key provided. Get one at https://dash.voyageai.com/ and re-run setup, or choose the local provider")]
    MissingApiKey,
}

impl SetupError {
    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a declined-step error.
    pub fn declined(step: impl Into<String>, guidance: impl Into<String>) -> Self {
        Self::Declined {
            step: step.into(),
            guidance: guidance.into(),
        }
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
