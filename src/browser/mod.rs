//! Browser control surface used by the extractor.
//!
//! The traits here carry no timeouts of their own: every wait resolves only
//! when its condition holds, and the extractor wraps each call in an explicit
//! bound. This keeps the timing policy in one place and lets test doubles
//! simulate a hung page by never resolving.

pub mod chromium;

use crate::error::BrowserError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

pub use chromium::ChromiumDriver;

/// Desktop Chrome on Windows; the target gates playback on a realistic UA.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Fingerprint presented by every session
#[derive(Clone, Debug, PartialEq)]
pub struct BrowserProfile {
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when `None`
    pub executable: Option<String>,
    pub user_agent: String,
    pub locale: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            locale: "en-US".to_string(),
            viewport_width: 1366,
            viewport_height: 768,
        }
    }
}

/// A network response seen by the page
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedResponse {
    pub url: String,
    pub status: i64,
}

impl ObservedResponse {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
        }
    }
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    /// Start a session that shares no cookies, storage or cache with any
    /// other session.
    async fn launch(
        &self,
        profile: &BrowserProfile,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One isolated browser context with a primary page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Every response the primary page receives from now on, in arrival order.
    async fn responses(&self) -> Result<BoxStream<'static, ObservedResponse>, BrowserError>;

    /// Load `url` in the primary page, resolving once the initial markup
    /// has been parsed (DOMContentLoaded), not on full network idle.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), BrowserError>;

    /// Resolves once `text` no longer appears in the page's visible text.
    async fn wait_for_text_absent(&self, text: &str) -> Result<(), BrowserError>;

    /// Resolves once an element matching `selector` is visible.
    async fn wait_for_visible(&self, selector: &str) -> Result<(), BrowserError>;

    /// Pointer click on the first visible element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Resolves once no response has arrived for `quiet`.
    async fn wait_for_network_quiet(&self, quiet: Duration) -> Result<(), BrowserError>;

    /// Close every page other than the primary one, returning how many were
    /// closed. Individual close failures are skipped.
    async fn close_auxiliary_pages(&self) -> Result<usize, BrowserError>;

    /// Tear down the context and all of its pages.
    async fn close(&mut self) -> Result<(), BrowserError>;
}
