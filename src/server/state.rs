use crate::{
    browser::ChromiumDriver,
    cache::ManifestCache,
    config::Config,
    extractor::{BrowserExtractor, ManifestExtractor},
    metrics,
    resolver::ManifestResolver,
    target::TargetUrlBuilder,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Cache-fronted, coalescing manifest resolver
    pub resolver: ManifestResolver,
    /// Prometheus render handle, if this process owns the recorder
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Production state: resolver backed by headless Chromium sessions.
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = config.extractor_settings();
        let driver =
            ChromiumDriver::new().with_request_timeout(settings.browser_request_timeout());
        let extractor = BrowserExtractor::new(
            driver,
            settings,
            config.manifest_matcher()?,
            config.max_browser_sessions,
        );
        Self::with_extractor(config, Arc::new(extractor))
    }

    /// State with a caller-supplied extractor.
    pub fn with_extractor(
        config: Config,
        extractor: Arc<dyn ManifestExtractor>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let targets = TargetUrlBuilder::new(&config.embed_base_url)?;
        let cache = Arc::new(ManifestCache::with_ttl(config.cache_ttl()));
        let resolver = ManifestResolver::new(targets, cache, extractor);

        Ok(Self {
            config: Arc::new(config),
            resolver,
            metrics: metrics::install(),
            started_at: Instant::now(),
        })
    }
}
