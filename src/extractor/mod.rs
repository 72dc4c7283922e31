//! Browser-driven manifest extraction.
//!
//! One extraction is one browser session walked through a fixed sequence:
//!
//! 1. Launch an isolated session.
//! 2. Start the response watch, then navigate and wait for initial markup.
//! 3. Settle: a few pointer moves, then wait for the loading overlay to go.
//! 4. Wait for the play control to become visible.
//! 5. Click it up to three times, closing any popups each click spawns.
//! 6. Give late responses a final grace period.
//! 7. Close the session, on every path, exactly once.
//!
//! Every wait is bounded here, not in the browser layer. Overlay and trigger
//! timeouts are not errors; they just end the session with whatever the
//! watch has latched.

pub mod watch;

use crate::browser::{BrowserDriver, BrowserProfile, BrowserSession};
use crate::error::ExtractError;
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use watch::{ManifestLatch, ManifestMatcher};

/// Synthetic pointer path traced before waiting on the page.
const POINTER_PATH: [(f64, f64); 3] = [(100.0, 100.0), (200.0, 150.0), (300.0, 250.0)];

/// Default structural locator of the player's play control.
pub const DEFAULT_PLAY_SELECTOR: &str = "#player button, .play-button, .vjs-big-play-button, .jw-icon-display, [aria-label='Play']";

/// Default text of the page's loading overlay.
pub const DEFAULT_LOADING_TEXT: &str = "Loading";

/// Resolves an embed URL to a manifest URL.
#[async_trait]
pub trait ManifestExtractor: Send + Sync + 'static {
    /// `Ok(None)` when the session completed without seeing a manifest.
    async fn extract(
        &self,
        target_url: &str,
        cancel: CancellationToken,
    ) -> Result<Option<String>, ExtractError>;
}

/// Bounds and page knobs for one session.
#[derive(Clone, Debug)]
pub struct ExtractorSettings {
    pub profile: BrowserProfile,
    pub play_selector: String,
    pub loading_text: String,
    pub launch_timeout: Duration,
    pub navigation_timeout: Duration,
    pub pointer_pause: Duration,
    pub overlay_timeout: Duration,
    pub trigger_timeout: Duration,
    pub click_attempts: u32,
    pub click_timeout: Duration,
    pub network_quiet: Duration,
    pub network_quiet_timeout: Duration,
    pub popup_close_timeout: Duration,
    pub final_grace: Duration,
    pub cleanup_timeout: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            profile: BrowserProfile::default(),
            play_selector: DEFAULT_PLAY_SELECTOR.to_string(),
            loading_text: DEFAULT_LOADING_TEXT.to_string(),
            launch_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(60),
            pointer_pause: Duration::from_millis(250),
            overlay_timeout: Duration::from_secs(120),
            trigger_timeout: Duration::from_secs(30),
            click_attempts: 3,
            click_timeout: Duration::from_secs(10),
            network_quiet: Duration::from_millis(500),
            network_quiet_timeout: Duration::from_secs(5),
            popup_close_timeout: Duration::from_secs(5),
            final_grace: Duration::from_secs(10),
            cleanup_timeout: Duration::from_secs(15),
        }
    }
}

impl ExtractorSettings {
    /// Per-command deadline a browser backend should use: longer than the
    /// longest single call bounded here, so these bounds always fire first.
    pub fn browser_request_timeout(&self) -> Duration {
        let longest = [
            self.launch_timeout,
            self.navigation_timeout,
            self.click_timeout,
            self.network_quiet_timeout,
            self.popup_close_timeout,
            self.cleanup_timeout,
        ]
        .into_iter()
        .max()
        .unwrap_or_default();
        longest + Duration::from_secs(5)
    }
}

/// [`ManifestExtractor`] that drives a real browser.
pub struct BrowserExtractor<D> {
    driver: D,
    settings: ExtractorSettings,
    matcher: ManifestMatcher,
    permits: Arc<Semaphore>,
}

impl<D: BrowserDriver> BrowserExtractor<D> {
    /// `max_sessions` caps how many browser sessions may be live at once.
    pub fn new(
        driver: D,
        settings: ExtractorSettings,
        matcher: ManifestMatcher,
        max_sessions: usize,
    ) -> Self {
        Self {
            driver,
            settings,
            matcher,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    /// Steps 2-6. Returns early without error when a non-fatal bound expires.
    async fn drive(
        &self,
        session: &dyn BrowserSession,
        target_url: &str,
        latch: &ManifestLatch,
    ) -> Result<(), ExtractError> {
        let s = &self.settings;

        match timeout(s.navigation_timeout, session.navigate(target_url)).await {
            Ok(Ok(())) => debug!("Initial markup loaded for {}", target_url),
            Ok(Err(e)) => return Err(ExtractError::Navigate(e.to_string())),
            Err(_) => {
                return Err(ExtractError::Navigate(format!(
                    "timed out after {}s",
                    s.navigation_timeout.as_secs()
                )));
            }
        }

        for (x, y) in POINTER_PATH {
            if let Err(e) = session.move_pointer(x, y).await {
                debug!("Pointer move failed: {}", e);
            }
            tokio::time::sleep(s.pointer_pause).await;
        }

        match timeout(s.overlay_timeout, session.wait_for_text_absent(&s.loading_text)).await {
            Ok(Ok(())) => debug!("Loading overlay cleared"),
            Ok(Err(e)) => debug!("Overlay check failed, continuing: {}", e),
            Err(_) => debug!(
                "Loading overlay still present after {}s, continuing",
                s.overlay_timeout.as_secs()
            ),
        }
        if latch.is_latched() {
            return Ok(());
        }

        match timeout(s.trigger_timeout, session.wait_for_visible(&s.play_selector)).await {
            Ok(Ok(())) => debug!("Play control visible"),
            Ok(Err(e)) => {
                info!("Play control lookup failed: {}", e);
                return Ok(());
            }
            Err(_) => {
                info!(
                    "Play control not visible within {}s",
                    s.trigger_timeout.as_secs()
                );
                return Ok(());
            }
        }

        for attempt in 1..=s.click_attempts {
            if latch.is_latched() {
                break;
            }
            debug!("Clicking play control ({}/{})", attempt, s.click_attempts);
            match timeout(s.click_timeout, session.click(&s.play_selector)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(ExtractError::Interaction(e.to_string())),
                Err(_) => {
                    return Err(ExtractError::Interaction(format!(
                        "click timed out after {}s",
                        s.click_timeout.as_secs()
                    )));
                }
            }

            if timeout(
                s.network_quiet_timeout,
                session.wait_for_network_quiet(s.network_quiet),
            )
            .await
            .is_err()
            {
                debug!("Network still busy after click {}", attempt);
            }

            match timeout(s.popup_close_timeout, session.close_auxiliary_pages()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(closed)) => {
                    debug!("Closed {} popup(s) after click {}", closed, attempt);
                    metrics::record_popups_closed(closed);
                }
                Ok(Err(e)) => debug!("Ignoring popup close failure: {}", e),
                Err(_) => debug!("Popup close timed out"),
            }
        }

        if !latch.is_latched() && timeout(s.final_grace, latch.wait()).await.is_err() {
            debug!("No manifest within final grace period");
        }

        Ok(())
    }
}

#[async_trait]
impl<D: BrowserDriver> ManifestExtractor for BrowserExtractor<D> {
    async fn extract(
        &self,
        target_url: &str,
        cancel: CancellationToken,
    ) -> Result<Option<String>, ExtractError> {
        let start = Instant::now();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            permit = self.permits.acquire() => {
                permit.map_err(|e| ExtractError::Aborted(e.to_string()))?
            }
        };

        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            launched = timeout(
                self.settings.launch_timeout,
                self.driver.launch(&self.settings.profile),
            ) => launched,
        };
        let mut session = match launched {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                metrics::record_extraction("error", start);
                return Err(ExtractError::Launch(e.to_string()));
            }
            Err(_) => {
                metrics::record_extraction("error", start);
                return Err(ExtractError::Launch(format!(
                    "timed out after {}s",
                    self.settings.launch_timeout.as_secs()
                )));
            }
        };
        debug!("Browser session started for {}", target_url);

        let latch = ManifestLatch::new();
        let outcome = match session.responses().await {
            Ok(responses) => {
                let watcher = tokio::spawn(watch::watch_responses(
                    responses,
                    self.matcher.clone(),
                    latch.clone(),
                ));
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ExtractError::Cancelled),
                    result = self.drive(session.as_ref(), target_url, &latch) => result,
                };
                watcher.abort();
                outcome
            }
            Err(e) => Err(ExtractError::Launch(format!("response watch: {e}"))),
        };
        let found = latch.get();

        match timeout(self.settings.cleanup_timeout, session.close()).await {
            Ok(Ok(())) => debug!("Browser session closed for {}", target_url),
            Ok(Err(e)) => debug!("Ignoring browser close failure: {}", e),
            Err(_) => warn!("Browser close timed out for {}", target_url),
        }

        match (found, outcome) {
            (Some(url), outcome) => {
                if let Err(e) = outcome {
                    warn!("Session for {} ended with {} after latching a manifest", target_url, e);
                }
                metrics::record_extraction("found", start);
                Ok(Some(url))
            }
            (None, Ok(())) => {
                info!("No manifest observed for {}", target_url);
                metrics::record_extraction("not_found", start);
                Ok(None)
            }
            (None, Err(e)) => {
                metrics::record_extraction("error", start);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ObservedResponse;
    use crate::error::BrowserError;
    use futures_util::StreamExt;
    use futures_util::stream::{self, BoxStream};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const MANIFEST: &str = "https://cdn.example/stream/abc.m3u8";

    /// How the fake page behaves.
    #[derive(Clone, Default)]
    struct Script {
        on_load: Vec<&'static str>,
        on_click: Vec<&'static str>,
        /// Responses sent this long after navigation starts
        delayed: Option<(Duration, &'static str)>,
        fail_launch: bool,
        hang_launch: bool,
        fail_navigate: bool,
        hang_navigate: bool,
        hang_overlay: bool,
        trigger_visible: bool,
        /// How long the play control takes to appear
        trigger_delay: Duration,
        /// 1-based click that fails
        fail_click_at: Option<usize>,
        popups_per_click: usize,
        fail_popup_close: bool,
        hang_popup_close: bool,
    }

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        closes: AtomicUsize,
        clicks: AtomicUsize,
        popups_closed: AtomicUsize,
    }

    struct MockDriver {
        script: Script,
        seen: Arc<Counters>,
    }

    struct MockSession {
        script: Script,
        seen: Arc<Counters>,
        tx: mpsc::UnboundedSender<ObservedResponse>,
        rx: Mutex<Option<mpsc::UnboundedReceiver<ObservedResponse>>>,
        open_popups: AtomicUsize,
    }

    impl MockSession {
        fn emit(&self, urls: &[&str]) {
            for url in urls {
                let _ = self.tx.send(ObservedResponse::new(*url));
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for MockDriver {
        async fn launch(
            &self,
            _profile: &BrowserProfile,
        ) -> Result<Box<dyn BrowserSession>, BrowserError> {
            self.seen.launches.fetch_add(1, Ordering::SeqCst);
            if self.script.hang_launch {
                std::future::pending::<()>().await;
            }
            if self.script.fail_launch {
                return Err(BrowserError::Launch("no chrome binary".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            Ok(Box::new(MockSession {
                script: self.script.clone(),
                seen: self.seen.clone(),
                tx,
                rx: Mutex::new(Some(rx)),
                open_popups: AtomicUsize::new(0),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for MockSession {
        async fn responses(&self) -> Result<BoxStream<'static, ObservedResponse>, BrowserError> {
            let rx = self
                .rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| BrowserError::Protocol("already subscribed".into()))?;
            Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed())
        }

        async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
            self.emit(&self.script.on_load);
            if let Some((delay, url)) = self.script.delayed {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(ObservedResponse::new(url));
                });
            }
            if self.script.hang_navigate {
                std::future::pending::<()>().await;
            }
            if self.script.fail_navigate {
                return Err(BrowserError::Navigation("net::ERR_CONNECTION_RESET".into()));
            }
            Ok(())
        }

        async fn move_pointer(&self, _x: f64, _y: f64) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn wait_for_text_absent(&self, _text: &str) -> Result<(), BrowserError> {
            if self.script.hang_overlay {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn wait_for_visible(&self, _selector: &str) -> Result<(), BrowserError> {
            if !self.script.trigger_visible {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.script.trigger_delay).await;
            Ok(())
        }

        async fn click(&self, _selector: &str) -> Result<(), BrowserError> {
            let click = self.seen.clicks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.script.fail_click_at == Some(click) {
                return Err(BrowserError::Protocol("node detached".into()));
            }
            self.open_popups
                .fetch_add(self.script.popups_per_click, Ordering::SeqCst);
            self.emit(&self.script.on_click);
            Ok(())
        }

        async fn wait_for_network_quiet(&self, quiet: Duration) -> Result<(), BrowserError> {
            tokio::time::sleep(quiet).await;
            Ok(())
        }

        async fn close_auxiliary_pages(&self) -> Result<usize, BrowserError> {
            if self.script.hang_popup_close {
                std::future::pending::<()>().await;
            }
            if self.script.fail_popup_close {
                return Err(BrowserError::Protocol("target crashed".into()));
            }
            let closed = self.open_popups.swap(0, Ordering::SeqCst);
            self.seen.popups_closed.fetch_add(closed, Ordering::SeqCst);
            Ok(closed)
        }

        async fn close(&mut self) -> Result<(), BrowserError> {
            self.seen.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_settings() -> ExtractorSettings {
        ExtractorSettings {
            launch_timeout: Duration::from_millis(200),
            navigation_timeout: Duration::from_millis(100),
            pointer_pause: Duration::from_millis(1),
            overlay_timeout: Duration::from_millis(50),
            trigger_timeout: Duration::from_millis(50),
            click_timeout: Duration::from_millis(100),
            network_quiet: Duration::from_millis(10),
            network_quiet_timeout: Duration::from_millis(50),
            popup_close_timeout: Duration::from_millis(50),
            final_grace: Duration::from_millis(50),
            cleanup_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn extractor(script: Script) -> (BrowserExtractor<MockDriver>, Arc<Counters>) {
        let seen = Arc::new(Counters::default());
        let driver = MockDriver {
            script,
            seen: seen.clone(),
        };
        (
            BrowserExtractor::new(driver, fast_settings(), ManifestMatcher::standard(), 2),
            seen,
        )
    }

    async fn run(ex: &BrowserExtractor<MockDriver>) -> Result<Option<String>, ExtractError> {
        ex.extract(
            "https://embed.example.com/movie/1?autoPlay=true&server=Vfast",
            CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn manifest_after_click_stops_clicking() {
        let (ex, seen) = extractor(Script {
            on_click: vec!["https://cdn.example/player.js", MANIFEST],
            trigger_visible: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(Some(MANIFEST.to_string())));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_qualifying_response_wins() {
        let (ex, seen) = extractor(Script {
            on_load: vec![
                "https://cdn.example/a.js",
                "https://cdn.example/stream/b.m3u8",
                "https://ads.example.com/c.m3u8",
                "https://cdn.example/stream/d.m3u8",
            ],
            trigger_visible: true,
            ..Default::default()
        });

        assert_eq!(
            run(&ex).await,
            Ok(Some("https://cdn.example/stream/b.m3u8".to_string()))
        );
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_manifest_after_all_clicks_is_none() {
        let (ex, seen) = extractor(Script {
            on_click: vec!["https://ads.example.com/preroll.m3u8"],
            trigger_visible: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(None));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 3);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn popups_closed_after_every_click() {
        let (ex, seen) = extractor(Script {
            trigger_visible: true,
            popups_per_click: 2,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(None));
        assert_eq!(seen.popups_closed.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn launch_failure_is_error_without_session() {
        let (ex, seen) = extractor(Script {
            fail_launch: true,
            ..Default::default()
        });

        assert!(matches!(run(&ex).await, Err(ExtractError::Launch(_))));
        assert_eq!(seen.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn navigate_error_closes_once() {
        let (ex, seen) = extractor(Script {
            fail_navigate: true,
            ..Default::default()
        });

        assert!(matches!(run(&ex).await, Err(ExtractError::Navigate(_))));
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigate_timeout_closes_once() {
        let (ex, seen) = extractor(Script {
            hang_navigate: true,
            ..Default::default()
        });

        assert!(matches!(run(&ex).await, Err(ExtractError::Navigate(_))));
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_timeout_is_not_an_error() {
        let (ex, seen) = extractor(Script {
            trigger_visible: false,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(None));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 0);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn click_error_closes_once() {
        let (ex, seen) = extractor(Script {
            trigger_visible: true,
            fail_click_at: Some(1),
            ..Default::default()
        });

        assert!(matches!(run(&ex).await, Err(ExtractError::Interaction(_))));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn latched_manifest_survives_navigation_timeout() {
        let (ex, seen) = extractor(Script {
            on_load: vec![MANIFEST],
            hang_navigate: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(Some(MANIFEST.to_string())));
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_closes_session() {
        let seen = Arc::new(Counters::default());
        let driver = MockDriver {
            script: Script {
                hang_navigate: true,
                ..Default::default()
            },
            seen: seen.clone(),
        };
        let settings = ExtractorSettings {
            navigation_timeout: Duration::from_secs(30),
            ..fast_settings()
        };
        let ex = BrowserExtractor::new(driver, settings, ManifestMatcher::standard(), 1);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = ex.extract("https://embed.example.com/movie/1", cancel).await;
        assert_eq!(result, Err(ExtractError::Cancelled));
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_launch_skips_browser() {
        let (ex, seen) = extractor(Script::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ex.extract("https://embed.example.com/movie/1", cancel).await;
        assert_eq!(result, Err(ExtractError::Cancelled));
        assert_eq!(seen.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn play_control_appearing_late_is_still_clicked() {
        let seen = Arc::new(Counters::default());
        let driver = MockDriver {
            script: Script {
                on_click: vec![MANIFEST],
                trigger_visible: true,
                trigger_delay: Duration::from_millis(100),
                ..Default::default()
            },
            seen: seen.clone(),
        };
        let settings = ExtractorSettings {
            trigger_timeout: Duration::from_millis(500),
            ..fast_settings()
        };
        let ex = BrowserExtractor::new(driver, settings, ManifestMatcher::standard(), 1);

        assert_eq!(run(&ex).await, Ok(Some(MANIFEST.to_string())));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlay_timeout_is_not_an_error() {
        let (ex, seen) = extractor(Script {
            on_click: vec![MANIFEST],
            hang_overlay: true,
            trigger_visible: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(Some(MANIFEST.to_string())));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 1);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn popup_close_failure_is_swallowed() {
        let (ex, seen) = extractor(Script {
            trigger_visible: true,
            popups_per_click: 1,
            fail_popup_close: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(None));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 3);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn popup_close_hang_is_bounded() {
        let (ex, seen) = extractor(Script {
            on_click: vec!["https://ads.example.com/preroll.m3u8"],
            trigger_visible: true,
            hang_popup_close: true,
            ..Default::default()
        });

        assert_eq!(run(&ex).await, Ok(None));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 3);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manifest_during_final_grace_is_returned() {
        let seen = Arc::new(Counters::default());
        let driver = MockDriver {
            script: Script {
                delayed: Some((Duration::from_millis(150), MANIFEST)),
                trigger_visible: true,
                ..Default::default()
            },
            seen: seen.clone(),
        };
        let settings = ExtractorSettings {
            final_grace: Duration::from_millis(1000),
            ..fast_settings()
        };
        let ex = BrowserExtractor::new(driver, settings, ManifestMatcher::standard(), 1);

        assert_eq!(run(&ex).await, Ok(Some(MANIFEST.to_string())));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 3);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn click_error_on_later_attempt_closes_once() {
        let (ex, seen) = extractor(Script {
            trigger_visible: true,
            popups_per_click: 1,
            fail_click_at: Some(2),
            ..Default::default()
        });

        assert!(matches!(run(&ex).await, Err(ExtractError::Interaction(_))));
        assert_eq!(seen.clicks.load(Ordering::SeqCst), 2);
        assert_eq!(seen.popups_closed.load(Ordering::SeqCst), 1);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_launch() {
        let seen = Arc::new(Counters::default());
        let driver = MockDriver {
            script: Script {
                hang_launch: true,
                ..Default::default()
            },
            seen: seen.clone(),
        };
        let settings = ExtractorSettings {
            launch_timeout: Duration::from_secs(30),
            ..fast_settings()
        };
        let ex = BrowserExtractor::new(driver, settings, ManifestMatcher::standard(), 1);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            ex.extract("https://embed.example.com/movie/1", cancel),
        )
        .await
        .expect("cancellation should not wait for the launch bound");
        assert_eq!(result, Err(ExtractError::Cancelled));
        assert_eq!(seen.launches.load(Ordering::SeqCst), 1);
        assert_eq!(seen.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn browser_request_timeout_outlasts_every_call_bound() {
        let settings = ExtractorSettings::default();
        assert!(settings.browser_request_timeout() > settings.navigation_timeout);

        let slow = ExtractorSettings {
            cleanup_timeout: Duration::from_secs(120),
            ..ExtractorSettings::default()
        };
        assert!(slow.browser_request_timeout() > Duration::from_secs(120));
    }
}
