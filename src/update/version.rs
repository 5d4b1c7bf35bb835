//! Release checks against a configured GitHub repository.
//!
//! Without a repository there is nothing to compare against, so the check
//! reports the running version and never flags an update.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::engine::assets::GITHUB_API;
use crate::update::{ReleaseChecker, UpdateError};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Result of the most recent release check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub found_new: bool,
    pub remote_version: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Compare a release tag (with or without a leading `v`) to `current`.
pub fn is_newer(tag: &str, current: &str) -> Result<bool, UpdateError> {
    let remote = Version::parse(tag.trim().trim_start_matches('v'))?;
    let local = Version::parse(current.trim_start_matches('v'))?;
    Ok(remote > local)
}

pub struct GithubReleaseChecker {
    client: Client,
    api_base: String,
    repo: Option<String>,
    current: String,
}

impl GithubReleaseChecker {
    pub fn new(repo: Option<&str>) -> Result<Self, UpdateError> {
        Self::with_endpoint(GITHUB_API, repo)
    }

    pub fn with_endpoint(api_base: &str, repo: Option<&str>) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(format!("proxy-manager/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.map(str::to_string),
            current: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Compare against `current` instead of the crate version.
    pub fn with_current_version(mut self, current: impl Into<String>) -> Self {
        self.current = current.into();
        self
    }

    fn latest_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repo)
    }
}

#[async_trait]
impl ReleaseChecker for GithubReleaseChecker {
    async fn check_for_newer_release(&self) -> Result<(bool, String), UpdateError> {
        let Some(repo) = self.repo.as_deref() else {
            tracing::debug!("No release repository configured, skipping release check");
            return Ok((false, self.current.clone()));
        };
        let url = self.latest_url(repo);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let release: Release = response.json().await?;
        let remote = release.tag_name.trim_start_matches('v').to_string();
        let newer = is_newer(&remote, &self.current)?;
        Ok((newer, remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_semantic_versions() {
        assert!(is_newer("v2.2.0", "2.1.9").unwrap());
        assert!(is_newer("2.10.0", "2.9.0").unwrap());
        assert!(!is_newer("v2.1.0", "2.1.0").unwrap());
        assert!(!is_newer("1.0.0", "2.0.0").unwrap());
    }

    #[test]
    fn rejects_garbage_tags() {
        assert!(matches!(
            is_newer("nightly", "1.0.0"),
            Err(UpdateError::VersionParse(_))
        ));
    }

    #[test]
    fn latest_release_url() {
        let checker =
            GithubReleaseChecker::with_endpoint("http://api.local/", Some("org/app")).unwrap();
        assert_eq!(
            checker.latest_url("org/app"),
            "http://api.local/repos/org/app/releases/latest"
        );
    }

    #[tokio::test]
    async fn unconfigured_repository_never_reports_an_update() {
        // Unroutable endpoint: any request would fail the test.
        let checker = GithubReleaseChecker::with_endpoint("http://127.0.0.1:9", None)
            .unwrap()
            .with_current_version("0.1.0");
        let (found_new, version) = checker.check_for_newer_release().await.unwrap();
        assert!(!found_new);
        assert_eq!(version, "0.1.0");
    }
}
