//! Client configuration for the Hytale RAG service.
//!
//! Provides:
//! - A static catalog of developer-tool clients and their config schemas
//! - Per-OS resolution of each client's configuration file
//! - Launch descriptors (inline and helper-script flavors)
//! - Idempotent merging of the service entry into JSON and TOML documents
//! - The install directory's `.env` file and `hytale-rag.toml` settings

pub mod clients;
pub mod document;
pub mod envfile;
pub mod error;
pub mod launch;
pub mod paths;
pub mod platform;
pub mod register;
pub mod settings;

pub use clients::{
    catalog, ClientDescriptor, ClientId, ConfigFormat, LaunchFlavor, SchemaVariant, Scope,
    SERVICE_NAME,
};
pub use document::{write_atomic, JsonDocument, MergeOutcome, TomlAppendDocument};
pub use envfile::{EmbeddingSettings, EnvFile, Provider, ENV_FILE_NAME};
pub use error::{ConfigError, Result};
pub use launch::{CommandBuilder, ServiceLaunchDescriptor, TransportKind};
pub use paths::{BaseDirs, PathResolver};
pub use platform::{OsFamily, Platform};
pub use register::{ClientConfigurator, Registration, RegistrationStatus};
pub use settings::{LoadedSettings, SetupSettings};
