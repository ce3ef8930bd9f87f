//! Release-asset host client and archive extraction.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use hytale_rag_config::settings::ReleaseSettings;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, SetupError};

const USER_AGENT: &str = concat!("hytale-rag-setup/", env!("CARGO_PKG_VERSION"));

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Release metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable file of a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

/// Source of dataset archives.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Metadata of the latest release.
    async fn latest_release(&self) -> Result<Release>;

    /// Download `asset` to `dest`, returning the number of bytes written.
    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> Result<u64>;

    /// Page where archives can be downloaded by hand.
    fn manual_url(&self) -> String;
}

/// [`ReleaseSource`] over the GitHub releases API.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: reqwest::Client,
    settings: ReleaseSettings,
    show_progress: bool,
}

impl GithubReleases {
    pub fn new(settings: ReleaseSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            settings,
            show_progress: true,
        }
    }

    /// Disable the terminal progress bar.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn network(&self, action: impl Into<String>, source: reqwest::Error) -> SetupError {
        SetupError::Network {
            action: action.into(),
            source,
            manual_url: self.settings.manual_download_url(),
        }
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template("  [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("  {spinner:.green} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner
            }
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self) -> Result<Release> {
        let url = self.settings.latest_release_url();
        tracing::debug!(%url, "fetching release metadata");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.network("Fetching release metadata", e))?;
        let release: Release = response
            .json()
            .await
            .map_err(|e| self.network("Reading release metadata", e))?;
        tracing::info!(tag = %release.tag_name, assets = release.assets.len(), "found release");
        Ok(release)
    }

    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> Result<u64> {
        let action = format!("Downloading {}", asset.name);
        let response = self
            .client
            .get(&asset.browser_download_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.network(action.clone(), e))?;

        let total = response
            .content_length()
            .or((asset.size > 0).then_some(asset.size));
        let total_mb = total.map(|t| t as f64 / BYTES_PER_MB);
        let bar = self.progress_bar(total);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SetupError::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SetupError::io(dest, e))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    bar.abandon();
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(self.network(action, e));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| SetupError::io(dest, e))?;
            written += chunk.len() as u64;
            bar.set_position(written);
            let done_mb = written as f64 / BYTES_PER_MB;
            bar.set_message(match total_mb {
                Some(t) => format!("{:.1} / {:.1} MB", done_mb, t),
                None => format!("{:.1} MB", done_mb),
            });
        }
        file.flush().await.map_err(|e| SetupError::io(dest, e))?;
        bar.finish_and_clear();

        tracing::info!(asset = %asset.name, bytes = written, "download complete");
        Ok(written)
    }

    fn manual_url(&self) -> String {
        self.settings.manual_download_url()
    }
}

/// Unpack a gzip-compressed tar archive into `dest`.
pub async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let label = archive.display().to_string();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::create_dir_all(&dest)?;
        let file = std::fs::File::open(&archive)?;
        let decoder = flate2::read::GzDecoder::new(std::io::BufReader::new(file));
        tar::Archive::new(decoder).unpack(&dest)
    })
    .await
    .map_err(|e| SetupError::Extract {
        archive: label.clone(),
        message: e.to_string(),
    })?
    .map_err(|e| SetupError::Extract {
        archive: label,
        message: e.to_string(),
    })
}

/// Build a `.tar.gz` holding one file inside each of `dirs`.
#[cfg(test)]
pub fn build_archive(dirs: &[&str]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for dir in dirs {
        let body = b"lance";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/data.bin", dir), &body[..])
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// In-memory release host for tests.
#[cfg(test)]
pub struct MockReleaseSource {
    release: Release,
    archives: std::collections::HashMap<String, Vec<u8>>,
    metadata_calls: std::sync::atomic::AtomicUsize,
    downloads: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockReleaseSource {
    pub fn new() -> Self {
        Self {
            release: Release {
                tag_name: "v1.0.0".into(),
                assets: Vec::new(),
            },
            archives: Default::default(),
            metadata_calls: Default::default(),
            downloads: Default::default(),
        }
    }

    pub fn with_asset(mut self, name: &str, archive: Vec<u8>) -> Self {
        self.release.assets.push(ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("mock://{}", name),
            size: archive.len() as u64,
        });
        self.archives.insert(name.to_string(), archive);
        self
    }

    /// Metadata requests plus downloads.
    pub fn network_calls(&self) -> usize {
        self.metadata_calls() + self.downloads()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl ReleaseSource for MockReleaseSource {
    async fn latest_release(&self) -> Result<Release> {
        self.metadata_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.release.clone())
    }

    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let bytes = &self.archives[&asset.name];
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SetupError::io(parent, e))?;
        }
        std::fs::write(dest, bytes).map_err(|e| SetupError::io(dest, e))?;
        Ok(bytes.len() as u64)
    }

    fn manual_url(&self) -> String {
        "https://example.invalid/releases".to_string()
    }
}
