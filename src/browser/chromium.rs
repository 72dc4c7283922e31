//! Chromium implementation of the browser control surface.
//!
//! Each session launches its own Chromium process against a fresh temporary
//! profile directory, so concurrent sessions never share cookies, storage or
//! HTTP cache. The profile directory is deleted when the session closes.

use super::{BrowserDriver, BrowserProfile, BrowserSession, ObservedResponse};
use crate::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Interval between DOM polls in the wait helpers.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-command CDP deadline when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Launches one Chromium process per session.
#[derive(Clone, Debug)]
pub struct ChromiumDriver {
    request_timeout: Duration,
}

impl Default for ChromiumDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromiumDriver {
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Deadline chromiumoxide applies to every single CDP command. Must be
    /// longer than any bound the caller puts around one browser call, or
    /// navigation to a slow server fails early with a protocol timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(
        &self,
        profile: &BrowserProfile,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("manifest-hunter-")
            .tempdir()
            .map_err(|e| BrowserError::Launch(format!("profile dir: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir.path())
            .request_timeout(self.request_timeout)
            .window_size(profile.viewport_width, profile.viewport_height)
            .viewport(Viewport {
                width: profile.viewport_width,
                height: profile.viewport_height,
                ..Default::default()
            })
            .arg(format!("--lang={}", profile.locale))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--autoplay-policy=no-user-gesture-required");
        if !profile.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &profile.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The CDP handler must be polled for the browser to make progress
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match open_primary_page(&browser, profile).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    debug!("Browser close after failed launch: {}", close_err);
                }
                handler.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        debug!("Chromium session launched in {}", profile_dir.path().display());

        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(browser),
            page,
            handler,
            profile_dir: Some(profile_dir),
        }))
    }
}

async fn open_primary_page(
    browser: &Browser,
    profile: &BrowserProfile,
) -> Result<Page, BrowserError> {
    let page = browser.new_page("about:blank").await?;
    let user_agent = SetUserAgentOverrideParams::builder()
        .user_agent(&profile.user_agent)
        .accept_language(&profile.locale)
        .build()
        .map_err(BrowserError::Protocol)?;
    page.execute(user_agent).await?;
    Ok(page)
}

#[derive(Debug, PartialEq)]
struct ClickPoint {
    x: f64,
    y: f64,
}

/// Result of the visibility script. The script always returns an object:
/// a bare `null` comes back from CDP without a value and cannot be decoded.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VisibleMatch {
    found: bool,
    x: f64,
    y: f64,
}

impl VisibleMatch {
    fn point(self) -> Option<ClickPoint> {
        self.found.then_some(ClickPoint {
            x: self.x,
            y: self.y,
        })
    }
}

/// A live Chromium process with its primary page.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    profile_dir: Option<TempDir>,
}

impl ChromiumSession {
    /// Centre of the first visible element matching `selector`.
    async fn visible_point(&self, selector: &str) -> Result<Option<ClickPoint>, BrowserError> {
        let selector = serde_json::to_string(selector)
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({selector})) {{
                    const r = el.getBoundingClientRect();
                    const s = window.getComputedStyle(el);
                    if (r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none') {{
                        return {{ found: true, x: r.left + r.width / 2, y: r.top + r.height / 2 }};
                    }}
                }}
                return {{ found: false }};
            }})()"#
        );
        let matched = self
            .page
            .evaluate(script)
            .await?
            .into_value::<VisibleMatch>()
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(matched.point())
    }

    async fn page_text_contains(&self, text: &str) -> Result<bool, BrowserError> {
        let needle = serde_json::to_string(text)
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let script =
            format!("document.body ? document.body.innerText.includes({needle}) : true");
        self.page
            .evaluate(script)
            .await?
            .into_value::<bool>()
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> Result<(), BrowserError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind.clone()).x(x).y(y);
        if kind != DispatchMouseEventType::MouseMoved {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder.build().map_err(BrowserError::Protocol)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn responses(&self) -> Result<BoxStream<'static, ObservedResponse>, BrowserError> {
        let events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?;
        Ok(events
            .map(|event| ObservedResponse {
                url: event.response.url.clone(),
                status: event.response.status,
            })
            .boxed())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await?;

        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        if let Some(error_text) = &response.result.error_text {
            return Err(BrowserError::Navigation(error_text.clone()));
        }

        match dom_ready.next().await {
            Some(_) => Ok(()),
            None => Err(BrowserError::Navigation(
                "page closed before DOMContentLoaded".to_string(),
            )),
        }
    }

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.mouse(DispatchMouseEventType::MouseMoved, x, y).await
    }

    async fn wait_for_text_absent(&self, text: &str) -> Result<(), BrowserError> {
        while self.page_text_contains(text).await? {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str) -> Result<(), BrowserError> {
        while self.visible_point(selector).await?.is_none() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let point = self.visible_point(selector).await?.ok_or_else(|| {
            BrowserError::Protocol(format!("no visible element matches {selector}"))
        })?;
        self.mouse(DispatchMouseEventType::MouseMoved, point.x, point.y)
            .await?;
        self.mouse(DispatchMouseEventType::MousePressed, point.x, point.y)
            .await?;
        self.mouse(DispatchMouseEventType::MouseReleased, point.x, point.y)
            .await
    }

    async fn wait_for_network_quiet(&self, quiet: Duration) -> Result<(), BrowserError> {
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?;
        loop {
            match tokio::time::timeout(quiet, events.next()).await {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Ok(()),
            }
        }
    }

    async fn close_auxiliary_pages(&self) -> Result<usize, BrowserError> {
        let pages = self.browser.lock().await.pages().await?;
        let primary = self.page.target_id().clone();

        let mut closed = 0;
        for page in pages {
            if *page.target_id() == primary {
                continue;
            }
            match page.close().await {
                Ok(()) => closed += 1,
                Err(e) => debug!("Ignoring popup close failure: {}", e),
            }
        }
        Ok(closed)
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let browser = self.browser.get_mut();
        let result = browser.close().await.map(|_| ());
        if let Err(e) = browser.wait().await {
            warn!("Chromium process did not exit cleanly: {}", e);
        }
        self.handler.abort();

        if let Some(dir) = self.profile_dir.take()
            && let Err(e) = dir.close()
        {
            debug!("Failed to remove browser profile dir: {}", e);
        }

        result.map_err(BrowserError::from)
    }
}
