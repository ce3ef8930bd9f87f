//! Prebuilt dataset acquisition and verification.
//!
//! A dataset is complete when every expected table directory exists; no
//! content is inspected. Corruption is detected heuristically by scanning the
//! service's stats self-test output, see [`classify_verification_output`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hytale_rag_config::Provider;
use serde::Serialize;

use crate::decision::{DecisionSource, NoticeLevel};
use crate::error::{Result, SetupError};
use crate::process::ProcessOutput;
use crate::release::{ReleaseSource, extract_tar_gz};

/// Dataset root below the install directory.
pub const DATA_DIR: &str = "data";

/// Directory holding table directories inside a provider's dataset.
pub const TABLES_DIR: &str = "lancedb";

const TABLE_SUFFIX: &str = ".lance";

const SERVER_TABLES: &[&str] = &["hytale_methods"];
const CLIENT_TABLES: &[&str] = &["hytale_client_ui"];
const GAMEDATA_TABLES: &[&str] = &["hytale_gamedata"];
const ALL_TABLES: &[&str] = &["hytale_methods", "hytale_client_ui", "hytale_gamedata"];

const RANGE_FAULT: &str = "range start must not be greater than end";

/// Which part of the dataset is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    All,
    Server,
    Client,
    Gamedata,
}

impl DataType {
    /// Menu order.
    pub const ALL: [DataType; 4] = [
        DataType::All,
        DataType::Server,
        DataType::Client,
        DataType::Gamedata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::All => "all",
            DataType::Server => "server",
            DataType::Client => "client",
            DataType::Gamedata => "gamedata",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataType::All => "Everything (server code, client UI and game data)",
            DataType::Server => "Server code only",
            DataType::Client => "Client UI only",
            DataType::Gamedata => "Game data only",
        }
    }

    /// Table names this data type requires. `All` is the union of the others.
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            DataType::All => ALL_TABLES,
            DataType::Server => SERVER_TABLES,
            DataType::Client => CLIENT_TABLES,
            DataType::Gamedata => GAMEDATA_TABLES,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release asset name for a provider and data type.
pub fn asset_name(prefix: &str, provider: Provider, data_type: DataType) -> String {
    format!("{}-{}-{}.tar.gz", prefix, provider.wire_value(), data_type.as_str())
}

/// On-disk layout of datasets under an install directory.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    install_dir: PathBuf,
}

impl DatasetLayout {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.install_dir.join(DATA_DIR)
    }

    /// Extraction target for `provider`'s archive.
    pub fn provider_dir(&self, provider: Provider) -> PathBuf {
        self.data_dir().join(provider.wire_value())
    }

    pub fn table_path(&self, provider: Provider, table: &str) -> PathBuf {
        self.provider_dir(provider)
            .join(TABLES_DIR)
            .join(format!("{}{}", table, TABLE_SUFFIX))
    }

    /// Expected tables that are not on disk.
    pub fn missing_tables(&self, provider: Provider, data_type: DataType) -> Vec<&'static str> {
        data_type
            .tables()
            .iter()
            .copied()
            .filter(|t| !self.table_path(provider, t).exists())
            .collect()
    }

    pub fn is_complete(&self, provider: Provider, data_type: DataType) -> bool {
        self.missing_tables(provider, data_type).is_empty()
    }
}

/// Result of classifying self-test output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "lowercase")]
pub enum Verdict {
    Healthy,
    /// No fault signature, but the run did not look clean.
    Suspect(String),
    /// A known fault signature was found.
    Corrupted(String),
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }
}

/// Classify the stats self-test's combined output.
///
/// Corrupted tables make the service crash while scanning them, so a panic
/// signature or the slicing error they trigger means `Corrupted`. Anything
/// else that failed is only `Suspect`.
pub fn classify_verification_output(output: &str, exit_code: Option<i32>) -> Verdict {
    let fault_line = output.lines().find(|line| {
        let lower = line.to_ascii_lowercase();
        lower.contains("panic")
            || (lower.contains("thread") && lower.contains("panicked"))
            || lower.contains(RANGE_FAULT)
    });
    if let Some(line) = fault_line {
        return Verdict::Corrupted(line.trim().to_string());
    }

    match exit_code {
        Some(0) => {}
        Some(code) => return Verdict::Suspect(format!("self-test exited with code {}", code)),
        None => return Verdict::Suspect("self-test was terminated by a signal".to_string()),
    }

    match output
        .lines()
        .find(|line| line.to_ascii_lowercase().contains("error"))
    {
        Some(line) => Verdict::Suspect(line.trim().to_string()),
        None => Verdict::Healthy,
    }
}

/// The service's read-only stats run.
#[async_trait]
pub trait SelfTest: Send + Sync {
    async fn run_stats(&self) -> Result<ProcessOutput>;
}

/// What [`DatasetProvisioner::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Every expected table was already on disk.
    AlreadyPresent,
    /// The archive was downloaded and extracted.
    Downloaded { bytes: u64 },
}

/// Downloads, extracts and verifies datasets.
pub struct DatasetProvisioner<'a> {
    layout: DatasetLayout,
    source: &'a dyn ReleaseSource,
    asset_prefix: String,
}

impl<'a> DatasetProvisioner<'a> {
    pub fn new(
        layout: DatasetLayout,
        source: &'a dyn ReleaseSource,
        asset_prefix: impl Into<String>,
    ) -> Self {
        Self {
            layout,
            source,
            asset_prefix: asset_prefix.into(),
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Make sure the tables for `provider`/`data_type` exist.
    ///
    /// Returns without network access when they already do.
    pub async fn ensure(
        &self,
        provider: Provider,
        data_type: DataType,
        decisions: &mut dyn DecisionSource,
    ) -> Result<EnsureOutcome> {
        if self.layout.is_complete(provider, data_type) {
            tracing::info!(%provider, %data_type, "dataset already present");
            decisions.notify(NoticeLevel::Success, "Dataset already present");
            return Ok(EnsureOutcome::AlreadyPresent);
        }
        let bytes = self.acquire(provider, data_type, decisions).await?;
        Ok(EnsureOutcome::Downloaded { bytes })
    }

    /// Replace `provider`'s dataset with a fresh download.
    pub async fn acquire(
        &self,
        provider: Provider,
        data_type: DataType,
        decisions: &mut dyn DecisionSource,
    ) -> Result<u64> {
        let target = self.layout.provider_dir(provider);
        if target.exists() {
            tracing::info!(path = %target.display(), "removing previous dataset");
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| SetupError::io(&target, e))?;
        }

        let name = asset_name(&self.asset_prefix, provider, data_type);
        let release = self.source.latest_release().await?;
        let asset = release
            .asset(&name)
            .ok_or_else(|| SetupError::AssetNotFound {
                name: name.clone(),
                available: release.asset_names(),
                manual_url: self.source.manual_url(),
            })?;

        decisions.notify(
            NoticeLevel::Info,
            &format!("Downloading {} from release {}...", name, release.tag_name),
        );
        let archive = self.layout.data_dir().join(&name);
        let bytes = self.source.download(asset, &archive).await?;

        decisions.notify(NoticeLevel::Info, "Extracting...");
        let extracted = extract_tar_gz(&archive, &target).await;
        remove_archive(&archive).await;
        extracted?;

        let missing = self.layout.missing_tables(provider, data_type);
        if !missing.is_empty() {
            return Err(SetupError::IncompleteArchive {
                asset: name,
                missing: missing.into_iter().map(String::from).collect(),
            });
        }

        decisions.notify(NoticeLevel::Success, "Dataset downloaded and extracted");
        Ok(bytes)
    }

    /// Run the self-test once and classify it.
    pub async fn verify(&self, self_test: &dyn SelfTest) -> Result<Verdict> {
        let output = self_test.run_stats().await?;
        let verdict = classify_verification_output(&output.combined(), output.code);
        tracing::info!(?verdict, "dataset verification");
        Ok(verdict)
    }

    /// Verify, re-acquiring at most once when corruption is detected.
    ///
    /// A `Suspect` first pass is only a warning. Declining the re-download
    /// returns the `Corrupted` verdict with manual guidance. After the retry
    /// anything but `Healthy` is fatal.
    pub async fn verify_with_retry(
        &self,
        provider: Provider,
        data_type: DataType,
        self_test: &dyn SelfTest,
        decisions: &mut dyn DecisionSource,
    ) -> Result<Verdict> {
        decisions.notify(NoticeLevel::Step, "Verifying dataset");

        let reason = match self.verify(self_test).await? {
            Verdict::Healthy => {
                decisions.notify(NoticeLevel::Success, "Dataset verified");
                return Ok(Verdict::Healthy);
            }
            Verdict::Suspect(reason) => {
                decisions.notify(
                    NoticeLevel::Warning,
                    &format!("Verification reported a problem, continuing: {}", reason),
                );
                return Ok(Verdict::Suspect(reason));
            }
            Verdict::Corrupted(reason) => reason,
        };

        decisions.notify(
            NoticeLevel::Error,
            &format!("The dataset appears corrupted: {}", reason),
        );
        let retry = decisions.confirm("Delete the dataset and download it again?", true)?;
        if !retry {
            decisions.notify(
                NoticeLevel::Warning,
                &format!(
                    "Skipping the re-download; the dataset may need fixing by hand. {}",
                    self.manual_guidance(provider, data_type)
                ),
            );
            return Ok(Verdict::Corrupted(reason));
        }

        self.acquire(provider, data_type, decisions).await?;
        match self.verify(self_test).await? {
            Verdict::Healthy => {
                decisions.notify(NoticeLevel::Success, "Dataset verified");
                Ok(Verdict::Healthy)
            }
            Verdict::Suspect(reason) | Verdict::Corrupted(reason) => {
                Err(SetupError::DatasetCorrupted {
                    provider: provider.wire_value().to_string(),
                    guidance: format!(
                        "Verification still fails after re-downloading ({}). {}",
                        reason,
                        self.manual_guidance(provider, data_type)
                    ),
                })
            }
        }
    }

    fn manual_guidance(&self, provider: Provider, data_type: DataType) -> String {
        format!(
            "Delete {} and download {} manually from {}, extracting it into that directory.",
            self.layout.provider_dir(provider).display(),
            asset_name(&self.asset_prefix, provider, data_type),
            self.source.manual_url()
        )
    }
}

async fn remove_archive(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "could not delete downloaded archive");
    }
}

/// Self-test replaying fixed outputs; the last one repeats.
#[cfg(test)]
pub struct MockSelfTest {
    outputs: std::sync::Mutex<std::collections::VecDeque<ProcessOutput>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSelfTest {
    pub fn new(outputs: impl IntoIterator<Item = ProcessOutput>) -> Self {
        Self {
            outputs: std::sync::Mutex::new(outputs.into_iter().collect()),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SelfTest for MockSelfTest {
    async fn run_stats(&self) -> Result<ProcessOutput> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut outputs = self.outputs.lock().unwrap();
        let next = if outputs.len() > 1 {
            outputs.pop_front()
        } else {
            outputs.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, ScriptedDecisions};
    use crate::release::{MockReleaseSource, build_archive};
    use tempfile::TempDir;

    const PANIC_OUTPUT: &str = "Loading tables...\n\
        thread 'main' panicked at lance-core/src/utils.rs:42:5:\n\
        range start must not be greater than end: 9 <= 3\n";

    fn healthy() -> ProcessOutput {
        ProcessOutput::ok("hytale_methods: 37412 rows\nhytale_gamedata: 9120 rows\n")
    }

    fn corrupted() -> ProcessOutput {
        ProcessOutput {
            code: Some(101),
            stdout: String::new(),
            stderr: PANIC_OUTPUT.to_string(),
        }
    }

    fn touch_table(layout: &DatasetLayout, provider: Provider, table: &str) {
        std::fs::create_dir_all(layout.table_path(provider, table)).unwrap();
    }

    fn server_source() -> MockReleaseSource {
        MockReleaseSource::new()
            .with_asset(
                "lancedb-voyage-server.tar.gz",
                build_archive(&["lancedb/hytale_methods.lance"]),
            )
            .with_asset(
                "lancedb-voyage-all.tar.gz",
                build_archive(&["lancedb/hytale_methods.lance"]),
            )
    }

    #[test]
    fn test_all_is_union_of_others() {
        let mut union: Vec<&str> = [DataType::Server, DataType::Client, DataType::Gamedata]
            .iter()
            .flat_map(|d| d.tables().iter().copied())
            .collect();
        union.sort();
        let mut all = DataType::All.tables().to_vec();
        all.sort();
        assert_eq!(all, union);
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(
            asset_name("lancedb", Provider::Local, DataType::Gamedata),
            "lancedb-ollama-gamedata.tar.gz"
        );
        assert_eq!(
            asset_name("lancedb", Provider::Cloud, DataType::All),
            "lancedb-voyage-all.tar.gz"
        );
    }

    #[test]
    fn test_layout_paths() {
        let layout = DatasetLayout::new("/opt/rag");
        assert_eq!(
            layout.table_path(Provider::Cloud, "hytale_methods"),
            PathBuf::from("/opt/rag/data/voyage/lancedb/hytale_methods.lance")
        );
    }

    #[test]
    fn test_classify_healthy() {
        assert_eq!(
            classify_verification_output(&healthy().combined(), Some(0)),
            Verdict::Healthy
        );
    }

    #[test]
    fn test_classify_fault_markers() {
        assert!(matches!(
            classify_verification_output(PANIC_OUTPUT, Some(101)),
            Verdict::Corrupted(_)
        ));
        assert!(matches!(
            classify_verification_output("PANIC: table footer invalid", Some(0)),
            Verdict::Corrupted(_)
        ));
        match classify_verification_output(
            "stats\nslice failed: range start must not be greater than end",
            Some(1),
        ) {
            Verdict::Corrupted(line) => assert!(line.starts_with("slice failed")),
            other => panic!("expected corrupted, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_suspect() {
        assert_eq!(
            classify_verification_output("no output", Some(2)),
            Verdict::Suspect("self-test exited with code 2".into())
        );
        assert!(matches!(
            classify_verification_output("Error: VOYAGE_API_KEY is invalid", Some(0)),
            Verdict::Suspect(_)
        ));
        assert!(matches!(
            classify_verification_output("", None),
            Verdict::Suspect(_)
        ));
    }

    #[tokio::test]
    async fn test_gamedata_present_short_circuits() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());
        touch_table(&layout, Provider::Local, "hytale_gamedata");

        let source = MockReleaseSource::new();
        let provisioner = DatasetProvisioner::new(layout, &source, "lancedb");
        let mut decisions = ScriptedDecisions::default();

        let outcome = provisioner
            .ensure(Provider::Local, DataType::Gamedata, &mut decisions)
            .await
            .unwrap();
        assert_eq!(outcome, EnsureOutcome::AlreadyPresent);
        assert_eq!(source.network_calls(), 0);

        // the union is not complete yet
        assert!(!provisioner.layout().is_complete(Provider::Local, DataType::All));
    }

    #[tokio::test]
    async fn test_acquire_replaces_partial_dataset() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());
        let stale = layout.provider_dir(Provider::Cloud).join("stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let source = server_source();
        let provisioner = DatasetProvisioner::new(layout.clone(), &source, "lancedb");
        let mut decisions = ScriptedDecisions::default();

        let outcome = provisioner
            .ensure(Provider::Cloud, DataType::Server, &mut decisions)
            .await
            .unwrap();
        assert!(matches!(outcome, EnsureOutcome::Downloaded { bytes } if bytes > 0));
        assert!(!stale.exists());
        assert!(layout.is_complete(Provider::Cloud, DataType::Server));
        assert!(!layout.data_dir().join("lancedb-voyage-server.tar.gz").exists());
        assert_eq!(source.downloads(), 1);
    }

    #[tokio::test]
    async fn test_missing_asset_lists_available() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let mut decisions = ScriptedDecisions::default();

        let err = provisioner
            .ensure(Provider::Local, DataType::Client, &mut decisions)
            .await
            .unwrap_err();
        match err {
            SetupError::AssetNotFound { name, available, .. } => {
                assert_eq!(name, "lancedb-ollama-client.tar.gz");
                assert_eq!(available.len(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(source.downloads(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_archive() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let mut decisions = ScriptedDecisions::default();

        let err = provisioner
            .ensure(Provider::Cloud, DataType::All, &mut decisions)
            .await
            .unwrap_err();
        match err {
            SetupError::IncompleteArchive { missing, .. } => {
                assert_eq!(missing, vec!["hytale_client_ui", "hytale_gamedata"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupted_twice_retries_exactly_once() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(dir.path());
        touch_table(&layout, Provider::Cloud, "hytale_methods");

        let source = server_source();
        let provisioner = DatasetProvisioner::new(layout, &source, "lancedb");
        let self_test = MockSelfTest::new([corrupted(), corrupted()]);
        let mut decisions = ScriptedDecisions::new([Answer::Confirm(true), Answer::Confirm(true)]);

        let err = provisioner
            .verify_with_retry(Provider::Cloud, DataType::Server, &self_test, &mut decisions)
            .await
            .unwrap_err();

        assert!(matches!(err, SetupError::DatasetCorrupted { .. }));
        assert!(err.to_string().contains("still fails"));
        assert_eq!(source.downloads(), 1);
        assert_eq!(self_test.calls(), 2);
        // only the first corruption asks
        assert_eq!(decisions.remaining(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_then_healthy() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let self_test = MockSelfTest::new([corrupted(), healthy()]);
        let mut decisions = ScriptedDecisions::default();

        let verdict = provisioner
            .verify_with_retry(Provider::Cloud, DataType::Server, &self_test, &mut decisions)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Healthy);
        assert_eq!(source.downloads(), 1);
    }

    #[tokio::test]
    async fn test_suspect_after_retry_is_fatal() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let self_test = MockSelfTest::new([corrupted(), ProcessOutput::failed(1, "")]);
        let mut decisions = ScriptedDecisions::default();

        let err = provisioner
            .verify_with_retry(Provider::Cloud, DataType::Server, &self_test, &mut decisions)
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::DatasetCorrupted { .. }));
    }

    #[tokio::test]
    async fn test_retry_declined() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let self_test = MockSelfTest::new([corrupted()]);
        let mut decisions = ScriptedDecisions::new([Answer::Confirm(false)]);

        let verdict = provisioner
            .verify_with_retry(Provider::Cloud, DataType::Server, &self_test, &mut decisions)
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Corrupted(_)));
        assert!(decisions.noticed(NoticeLevel::Warning, "lancedb-voyage-server.tar.gz"));
        assert_eq!(source.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_suspect_first_pass_warns() {
        let dir = TempDir::new().unwrap();
        let source = server_source();
        let provisioner = DatasetProvisioner::new(DatasetLayout::new(dir.path()), &source, "lancedb");
        let self_test = MockSelfTest::new([ProcessOutput::ok("error: slow disk")]);
        let mut decisions = ScriptedDecisions::default();

        let verdict = provisioner
            .verify_with_retry(Provider::Cloud, DataType::Server, &self_test, &mut decisions)
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Suspect(_)));
        assert!(decisions.noticed(NoticeLevel::Warning, "slow disk"));
        assert_eq!(source.network_calls(), 0);
    }
}
