//! Metrics collection and exposition.
//!
//! # Metrics
//! - `subscription_updates_total` (counter): refresh outcomes by `result`
//! - `subscription_updates_in_flight` (gauge): refreshes holding a pool permit
//! - `rule_list_updates_total` (counter): rule-list outcomes by `result`
//! - `network_readiness_waits_total` (counter): failed readiness probes
//! - `remote_version_newer` (gauge): 1 when a newer release was found

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub fn record_subscription_update(success: bool) {
    metrics::counter!("subscription_updates_total", "result" => outcome(success)).increment(1);
}

pub fn subscription_update_started() {
    metrics::gauge!("subscription_updates_in_flight").increment(1.0);
}

pub fn subscription_update_finished() {
    metrics::gauge!("subscription_updates_in_flight").decrement(1.0);
}

pub fn record_rule_list_update(success: bool) {
    metrics::counter!("rule_list_updates_total", "result" => outcome(success)).increment(1);
}

pub fn record_readiness_wait() {
    metrics::counter!("network_readiness_waits_total").increment(1);
}

pub fn record_remote_version(found_new: bool) {
    metrics::gauge!("remote_version_newer").set(if found_new { 1.0 } else { 0.0 });
}
