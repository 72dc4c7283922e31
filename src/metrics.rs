//! Prometheus metrics.
//!
//! The recorder is process-global; [`install`] is idempotent so routers built
//! repeatedly (tests) share one handle.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once and return its render handle.
///
/// Returns `None` if another recorder was already installed.
pub fn install() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .clone()
}

pub fn record_request(route: &'static str, status: u16) {
    counter!("manifest_hunter_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}

pub fn record_cache_hit() {
    counter!("manifest_hunter_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("manifest_hunter_cache_misses_total").increment(1);
}

pub fn record_coalesced() {
    counter!("manifest_hunter_coalesced_requests_total").increment(1);
}

/// `outcome` is one of `found`, `not_found`, `error`.
pub fn record_extraction(outcome: &'static str, start: Instant) {
    counter!("manifest_hunter_extractions_total", "outcome" => outcome).increment(1);
    histogram!("manifest_hunter_extraction_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_popups_closed(count: usize) {
    counter!("manifest_hunter_popups_closed_total").increment(count as u64);
}
