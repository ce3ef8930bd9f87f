//! Provisioning for the Hytale RAG service.
//!
//! Everything that touches the outside world goes through a trait so the
//! sequence can be driven from tests:
//!
//! - [`ProcessRunner`]: external commands (`npm`, `ollama`, installers)
//! - [`ReleaseSource`]: the release host serving dataset archives
//! - [`RuntimeApi`]: the local embedding runtime's HTTP API
//! - [`DecisionSource`]: user consent, selections and secrets
//!
//! [`SetupOrchestrator`] composes them into the full setup sequence.

pub mod dataset;
pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod release;
pub mod runtime;
pub mod service;

pub use dataset::{DataType, DatasetLayout, DatasetProvisioner, EnsureOutcome, SelfTest, Verdict};
pub use decision::{DecisionSource, NoticeLevel};
pub use error::{Result, SetupError};
pub use orchestrator::{
    ClientOutcome, RegistrationPlan, SetupOrchestrator, SetupReport, failed_clients,
    register_clients,
};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemRunner};
pub use release::{GithubReleases, Release, ReleaseAsset, ReleaseSource};
pub use runtime::{OllamaApi, RuntimeApi, RuntimeProvisioner, RuntimeStage, RuntimeState};
pub use service::ServiceWorkspace;
