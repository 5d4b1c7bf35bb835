//! Engine data assets (geoip.dat / geosite.dat).
//!
//! # Responsibilities
//! - Locate the asset directory and the engine config file
//! - Report whether the geo data files are present
//! - Download missing files from their upstream repositories
//!
//! # Design Decisions
//! - The latest tag is resolved through the GitHub API, the file itself
//!   comes from the jsDelivr mirror pinned to that tag
//! - Files are staged as `<upstream name>.part` and renamed into place

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::resilience::backoff::BackoffPolicy;

const TIMEOUT_SECS: u64 = 60;
const RETRY: BackoffPolicy = BackoffPolicy::new(3, 500, 4000);

pub const GITHUB_API: &str = "https://api.github.com";
pub const JSDELIVR_CDN: &str = "https://cdn.jsdelivr.net";

/// An upstream data file and the name it is installed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoAsset {
    pub repo: &'static str,
    pub filename: &'static str,
    pub localname: &'static str,
}

pub const GEOIP: GeoAsset = GeoAsset {
    repo: "v2rayA/dist-geoip",
    filename: "geoip.dat",
    localname: "geoip.dat",
};

pub const GEOSITE: GeoAsset = GeoAsset {
    repo: "v2rayA/dist-domain-list-community",
    filename: "dlc.dat",
    localname: "geosite.dat",
};

/// Routing rule list used by the GFW-list modes.
pub const RULE_LIST: GeoAsset = GeoAsset {
    repo: "v2rayA/dist-v2ray-rules-dat",
    filename: "geosite.dat",
    localname: "LoyalsoldierSite.dat",
};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("{0} has no published tags")]
    NoTags(String),

    #[error("malformed tag list for {repo}: {source}")]
    TagList {
        repo: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("download<{}>: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chmod: {0}")]
    Chmod(#[source] std::io::Error),

    #[error("rename: {0}")]
    Rename(#[source] std::io::Error),
}

/// Where the engine keeps its assets and configuration.
pub trait AssetLocator: Send + Sync {
    fn location_path(&self) -> PathBuf;

    fn geoip_exists(&self) -> bool {
        self.location_path().join(GEOIP.localname).is_file()
    }

    fn geosite_exists(&self) -> bool {
        self.location_path().join(GEOSITE.localname).is_file()
    }

    fn config_path(&self) -> PathBuf;
}

/// Filesystem asset locator driven by the environment config.
#[derive(Debug, Clone)]
pub struct FsAssets {
    asset_dir: PathBuf,
    config_path: PathBuf,
}

impl FsAssets {
    pub fn new(asset_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            config_path: config_path.into(),
        }
    }
}

impl AssetLocator for FsAssets {
    fn location_path(&self) -> PathBuf {
        self.asset_dir.clone()
    }

    fn config_path(&self) -> PathBuf {
        self.config_path.clone()
    }
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
}

/// Downloads assets pinned to their latest upstream tag.
#[derive(Debug, Clone)]
pub struct AssetDownloader {
    client: Client,
    api_base: String,
    cdn_base: String,
}

impl AssetDownloader {
    /// Create a downloader against the public GitHub API and jsDelivr.
    pub fn new() -> Result<Self, AssetError> {
        Self::with_endpoints(GITHUB_API, JSDELIVR_CDN)
    }

    /// Create a downloader against custom endpoints (mirrors, tests).
    pub fn with_endpoints(api_base: &str, cdn_base: &str) -> Result<Self, AssetError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("proxy-manager/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn tags_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/tags", self.api_base, repo)
    }

    pub fn cdn_url(&self, repo: &str, tag: &str, filename: &str) -> String {
        format!("{}/gh/{}@{}/{}", self.cdn_base, repo, tag, filename)
    }

    /// Name of the most recent tag of `repo`.
    pub async fn latest_tag(&self, repo: &str) -> Result<String, AssetError> {
        let body = self.get_with_retry(&self.tags_url(repo)).await?;
        let tags: Vec<GithubTag> =
            serde_json::from_slice(&body).map_err(|source| AssetError::TagList {
                repo: repo.to_string(),
                source,
            })?;
        tags.into_iter()
            .next()
            .map(|t| t.name)
            .ok_or_else(|| AssetError::NoTags(repo.to_string()))
    }

    /// Download `asset` into `dir`, returning the installed path.
    pub async fn download(&self, asset: GeoAsset, dir: &Path) -> Result<PathBuf, AssetError> {
        let tag = self.latest_tag(asset.repo).await?;
        self.download_at(asset, &tag, dir).await
    }

    /// Download `asset` as published under `tag`.
    pub async fn download_at(
        &self,
        asset: GeoAsset,
        tag: &str,
        dir: &Path,
    ) -> Result<PathBuf, AssetError> {
        let url = self.cdn_url(asset.repo, tag, asset.filename);
        let staged = dir.join(format!("{}.part", asset.filename));

        tracing::info!(repo = asset.repo, tag = %tag, file = asset.filename, "Installing asset");

        let body = self.get_with_retry(&url).await?;
        fs::create_dir_all(dir)
            .and_then(|_| fs::write(&staged, &body))
            .map_err(|source| AssetError::Write {
                path: staged.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))
                .map_err(AssetError::Chmod)?;
        }

        let installed = dir.join(asset.localname);
        fs::rename(&staged, &installed).map_err(AssetError::Rename)?;
        Ok(installed)
    }

    async fn get_with_retry(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if RETRY.should_retry(attempt) => {
                    let delay = RETRY.delay(attempt);
                    tracing::debug!(url, attempt, delay = ?delay, error = %e, "Retrying download");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Download both geo assets when either one is missing.
///
/// Failures are logged per repository and never abort; returns how many
/// downloads failed.
pub async fn ensure_geo_assets(locator: &dyn AssetLocator, downloader: &AssetDownloader) -> usize {
    if locator.geoip_exists() && locator.geosite_exists() {
        return 0;
    }

    let dir = locator.location_path();
    let mut failures = 0;
    for asset in [GEOIP, GEOSITE] {
        if let Err(e) = downloader.download(asset, &dir).await {
            tracing::warn!(repo = asset.repo, error = %e, "Asset download failed, continuing without it");
            failures += 1;
        }
    }
    failures
}
