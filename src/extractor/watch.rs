//! Response watch: passive observer of every network response a session's
//! page receives, latching the first manifest that is not an ad.

use crate::browser::ObservedResponse;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// HLS playlist URLs, with or without a query string.
pub const DEFAULT_MANIFEST_PATTERN: &str = r"(?i)\.m3u8(?:[?#]|$)";

/// Ad-server and pre-roll playlists that precede the real stream.
pub const DEFAULT_AD_EXCLUDE_PATTERN: &str =
    r"(?i)(?:^|[/.?&=_-])(?:ads?|adserver|adservice|doubleclick|preroll|vast)(?:[/.?&=_-]|$)";

/// Decides whether an observed response is the stream manifest.
#[derive(Clone, Debug)]
pub struct ManifestMatcher {
    manifest: Regex,
    exclude: Regex,
}

impl ManifestMatcher {
    pub fn new(manifest_pattern: &str, exclude_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            manifest: Regex::new(manifest_pattern)?,
            exclude: Regex::new(exclude_pattern)?,
        })
    }

    /// Matcher built from the default patterns.
    pub fn standard() -> Self {
        Self::new(DEFAULT_MANIFEST_PATTERN, DEFAULT_AD_EXCLUDE_PATTERN)
            .expect("default manifest patterns are valid")
    }

    pub fn is_manifest(&self, url: &str) -> bool {
        self.manifest.is_match(url) && !self.exclude.is_match(url)
    }
}

/// Single-assignment slot for the session's manifest URL.
///
/// The first `offer` wins; every later offer is ignored. Clones share the slot.
#[derive(Clone, Debug)]
pub struct ManifestLatch {
    slot: Arc<watch::Sender<Option<String>>>,
}

impl ManifestLatch {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Latch `url` if nothing is latched yet. Returns `true` if this call won.
    pub fn offer(&self, url: &str) -> bool {
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(url.to_string());
            true
        })
    }

    pub fn get(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    pub fn is_latched(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Resolves once a URL has been latched.
    pub async fn wait(&self) -> Option<String> {
        let mut rx = self.slot.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|latched| latched.clone())
    }
}

impl Default for ManifestLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume `responses` until one qualifies as the manifest, then latch it.
pub async fn watch_responses(
    mut responses: BoxStream<'static, ObservedResponse>,
    matcher: ManifestMatcher,
    latch: ManifestLatch,
) {
    while let Some(response) = responses.next().await {
        if !matcher.is_manifest(&response.url) {
            continue;
        }
        if latch.offer(&response.url) {
            info!("Latched manifest {} (status {})", response.url, response.status);
        } else {
            debug!("Ignoring later manifest {}", response.url);
        }
        return;
    }
    debug!("Response stream ended without a manifest");
}
