//! Subscription refresh pass.

use std::sync::Arc;

use crate::observability::metrics;
use crate::storage::ConfigStore;
use crate::update::pool::BoundedPool;
use crate::update::Updater;

/// Maximum subscriptions refreshed at the same time.
pub const UPDATE_CONCURRENCY: usize = 2;

/// Refresh every configured subscription, two at a time.
///
/// The subscription list is read when the pass starts. Outcomes are only
/// logged; a failed refresh is not retried and does not stop the others.
pub async fn update_subscriptions(store: &dyn ConfigStore, updater: Arc<dyn Updater>) {
    let subscriptions = store.subscriptions();
    if subscriptions.is_empty() {
        tracing::debug!("No subscriptions to update");
        return;
    }

    tracing::info!(count = subscriptions.len(), "Updating subscriptions");

    let pool = BoundedPool::new(UPDATE_CONCURRENCY);
    pool.run_all(subscriptions.into_iter().enumerate(), |(index, subscription)| {
        let updater = Arc::clone(&updater);
        async move {
            metrics::subscription_update_started();
            let result = updater.update_subscription(index, false).await;
            metrics::subscription_update_finished();
            metrics::record_subscription_update(result.is_ok());

            match result {
                Ok(()) => tracing::info!(
                    index,
                    address = %subscription.address,
                    "[AutoUpdate] Subscription updated"
                ),
                Err(e) => tracing::info!(
                    index,
                    error = %e,
                    "[AutoUpdate] Failed to update subscription"
                ),
            }
        }
    })
    .await;
}
