//! HTTP-backed [`Updater`].
//!
//! Subscriptions are fetched from their source URL and decoded as either a
//! base64 blob or plain text with one share link per line. The rule list is
//! downloaded from its upstream repository pinned to the latest tag.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use reqwest::Client;
use url::Url;

use crate::engine::assets::{AssetDownloader, RULE_LIST};
use crate::observability::metrics;
use crate::storage::ConfigStore;
use crate::update::{UpdateError, Updater};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Non-forced refreshes newer than this are skipped.
pub const MIN_REFRESH_AGE: Duration = Duration::from_secs(5 * 60);

pub struct HttpUpdater {
    store: Arc<dyn ConfigStore>,
    client: Client,
    assets: AssetDownloader,
    asset_dir: PathBuf,
}

impl HttpUpdater {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        assets: AssetDownloader,
        asset_dir: impl Into<PathBuf>,
    ) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(format!("proxy-manager/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            store,
            client,
            assets,
            asset_dir: asset_dir.into(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, UpdateError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Updater for HttpUpdater {
    async fn update_subscription(&self, index: usize, forced: bool) -> Result<(), UpdateError> {
        let subscription = self
            .store
            .subscriptions()
            .into_iter()
            .nth(index)
            .ok_or(UpdateError::NoSuchSubscription(index))?;

        let now = unix_now();
        if !forced && is_fresh(subscription.updated_at, now) {
            tracing::debug!(index, "Subscription refreshed recently, skipping");
            return Ok(());
        }

        let url = subscription_url(&subscription.address)?;
        let body = self.fetch(url.as_str()).await?;
        let nodes = decode_subscription(&body);
        if nodes.is_empty() {
            return Err(UpdateError::EmptySubscription(index));
        }

        tracing::debug!(index, nodes = nodes.len(), "Fetched subscription");
        self.store.update_subscription_nodes(index, nodes, now)?;
        Ok(())
    }

    async fn update_rule_list(&self) -> Result<String, UpdateError> {
        let result = async {
            let tag = self.assets.latest_tag(RULE_LIST.repo).await?;
            self.assets
                .download_at(RULE_LIST, &tag, &self.asset_dir)
                .await?;
            self.store.set_rule_list_version(&tag)?;
            Ok::<_, UpdateError>(tag)
        }
        .await;
        metrics::record_rule_list_update(result.is_ok());
        result
    }
}

/// Extract share links from a subscription body.
///
/// Bodies that decode as base64 (any common alphabet) are decoded first;
/// everything else is read as plain text. Only lines containing `://` count.
pub fn decode_subscription(body: &str) -> Vec<String> {
    let compact: String = body.split_whitespace().collect();
    let text = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(compact.as_bytes()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| body.to_string());

    text.lines()
        .map(str::trim)
        .filter(|line| line.contains("://"))
        .map(str::to_string)
        .collect()
}

/// Parse a subscription address; only http and https sources are fetched.
fn subscription_url(address: &str) -> Result<Url, UpdateError> {
    let url = Url::parse(address.trim())
        .map_err(|e| UpdateError::InvalidAddress(format!("{address}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UpdateError::InvalidAddress(format!(
            "{address}: unsupported scheme {other}"
        ))),
    }
}

fn is_fresh(updated_at: Option<u64>, now: u64) -> bool {
    updated_at.is_some_and(|at| now.saturating_sub(at) < MIN_REFRESH_AGE.as_secs())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
