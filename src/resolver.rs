//! Request orchestration: target URL → cache → browser extraction → cache.
//!
//! Identical requests that miss the cache while an extraction for the same
//! key is running attach to that extraction instead of launching their own
//! browser. The extraction runs in its own task; when every caller waiting on
//! it has gone away (e.g. the HTTP client disconnected), its cancellation
//! token fires and the browser session is torn down early.

use crate::cache::ManifestStore;
use crate::error::{ExtractError, ResolverError, Result};
use crate::extractor::ManifestExtractor;
use crate::metrics;
use crate::target::{MediaRequest, TargetUrlBuilder};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type FlightOutcome = std::result::Result<Option<String>, ExtractError>;

/// A manifest URL ready to hand back to the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub manifest_url: String,
    pub server: String,
}

/// One running extraction, shared by every caller waiting on its key.
struct Flight {
    id: u64,
    outcome: watch::Receiver<Option<FlightOutcome>>,
    /// Mutated only under the map's shard lock.
    waiters: usize,
    cancel: CancellationToken,
}

/// Releases a caller's interest in a flight; the last one out cancels it.
struct FlightGuard {
    flights: Arc<DashMap<String, Flight>>,
    key: String,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(mut flight) = self.flights.get_mut(&self.key)
            && flight.id == self.id
        {
            flight.waiters = flight.waiters.saturating_sub(1);
            if flight.waiters == 0 {
                debug!("No callers left, cancelling extraction for {}", self.key);
                flight.cancel.cancel();
            }
        }
    }
}

#[derive(Clone)]
pub struct ManifestResolver {
    targets: TargetUrlBuilder,
    cache: Arc<dyn ManifestStore>,
    extractor: Arc<dyn ManifestExtractor>,
    flights: Arc<DashMap<String, Flight>>,
    next_flight: Arc<AtomicU64>,
}

impl ManifestResolver {
    pub fn new(
        targets: TargetUrlBuilder,
        cache: Arc<dyn ManifestStore>,
        extractor: Arc<dyn ManifestExtractor>,
    ) -> Self {
        Self {
            targets,
            cache,
            extractor,
            flights: Arc::new(DashMap::new()),
            next_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of cache entries, including expired ones not yet evicted.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Number of extractions currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Resolve `request` to a manifest URL.
    ///
    /// # Errors
    /// - [`ResolverError::InvalidRequest`] if no target URL can be built
    /// - [`ResolverError::NotFound`] if the session saw no manifest
    /// - [`ResolverError::Upstream`] if the browser session failed
    pub async fn resolve(&self, request: &MediaRequest) -> Result<Resolved> {
        let key = self.targets.build(request)?;

        if let Some(manifest_url) = self.cache.get(&key) {
            metrics::record_cache_hit();
            return Ok(Resolved {
                manifest_url,
                server: request.server.clone(),
            });
        }
        metrics::record_cache_miss();

        let (mut outcome, _guard) = self.join(&key);
        let outcome = {
            let ready = outcome.wait_for(Option::is_some).await.map_err(|_| {
                ResolverError::Upstream("extraction ended without a result".to_string())
            })?;
            ready.clone()
        };

        match outcome {
            Some(Ok(Some(manifest_url))) => Ok(Resolved {
                manifest_url,
                server: request.server.clone(),
            }),
            Some(Ok(None)) => Err(ResolverError::NotFound),
            Some(Err(e)) => Err(e.into()),
            None => Err(ResolverError::Upstream(
                "extraction ended without a result".to_string(),
            )),
        }
    }

    /// Attach to the running flight for `key`, or start one.
    fn join(&self, key: &str) -> (watch::Receiver<Option<FlightOutcome>>, FlightGuard) {
        let (outcome, id) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().cancel.is_cancelled() => {
                let flight = occupied.get_mut();
                flight.waiters += 1;
                metrics::record_coalesced();
                debug!("Joining in-flight extraction for {}", key);
                (flight.outcome.clone(), flight.id)
            }
            Entry::Occupied(mut occupied) => {
                let flight = self.launch(key);
                let joined = (flight.outcome.clone(), flight.id);
                occupied.insert(flight);
                joined
            }
            Entry::Vacant(vacant) => {
                let flight = self.launch(key);
                let joined = (flight.outcome.clone(), flight.id);
                vacant.insert(flight);
                joined
            }
        };

        (
            outcome,
            FlightGuard {
                flights: self.flights.clone(),
                key: key.to_string(),
                id,
            },
        )
    }

    fn launch(&self, key: &str) -> Flight {
        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let key = key.to_string();
        let token = cancel.clone();
        let extractor = self.extractor.clone();
        let cache = self.cache.clone();
        let flights = self.flights.clone();

        info!("Starting extraction for {}", key);
        tokio::spawn(async move {
            let start = Instant::now();
            let run = {
                let key = key.clone();
                tokio::spawn(async move { extractor.extract(&key, token).await })
            };
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ExtractError::Aborted(e.to_string())),
            };

            match &outcome {
                Ok(Some(manifest_url)) => {
                    info!(
                        "Resolved {} -> {} in {:.1}s",
                        key,
                        manifest_url,
                        start.elapsed().as_secs_f64()
                    );
                    cache.set(&key, manifest_url.clone());
                }
                Ok(None) => info!("No manifest found for {}", key),
                Err(e) => info!("Extraction failed for {}: {}", key, e),
            }

            flights.remove_if(&key, |_, flight| flight.id == id);
            let _ = tx.send(Some(outcome));
        });

        Flight {
            id,
            outcome: rx,
            waiters: 1,
            cancel,
        }
    }
}
