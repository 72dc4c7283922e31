use crate::browser::{BrowserProfile, DEFAULT_USER_AGENT};
use crate::extractor::watch::{DEFAULT_AD_EXCLUDE_PATTERN, DEFAULT_MANIFEST_PATTERN};
use crate::extractor::{
    DEFAULT_LOADING_TEXT, DEFAULT_PLAY_SELECTOR, ExtractorSettings, ManifestMatcher,
};
use crate::target::TargetUrlBuilder;
use std::env;
use std::time::Duration;

/// Server label used when a request does not name one
pub const DEFAULT_SERVER: &str = "Vfast";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Base of the third-party embed site, e.g. `https://embed.example.com`
    pub embed_base_url: String,
    pub is_dev: bool,
    pub default_server: String,
    /// Manifest cache TTL in seconds (default: 3600)
    pub cache_ttl_secs: u64,
    /// Cap on concurrently live browser sessions (default: 4)
    pub max_browser_sessions: usize,
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub user_agent: String,
    pub browser_locale: String,
    /// CSS selector of the player's play control
    pub play_selector: String,
    /// Text shown by the page's loading overlay
    pub loading_text: String,
    pub manifest_pattern: String,
    pub ad_exclude_pattern: String,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode the embed base URL has a placeholder default; in PROD it is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let embed_base_url = if is_dev {
            env::var("EMBED_BASE_URL").unwrap_or_else(|_| "https://embed.example.com".to_string())
        } else {
            env::var("EMBED_BASE_URL").map_err(|_| "EMBED_BASE_URL is required in production")?
        };
        TargetUrlBuilder::new(&embed_base_url)
            .map_err(|e| format!("Invalid EMBED_BASE_URL '{embed_base_url}': {e}"))?;

        let default_server = env::var("DEFAULT_SERVER")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());

        let cache_ttl_secs: u64 = env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let max_browser_sessions: usize = env::var("MAX_BROWSER_SESSIONS")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .unwrap_or(4);

        let headless = env::var("HEADLESS")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let chrome_executable = env::var("CHROME_EXECUTABLE").ok();

        let user_agent =
            env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        let browser_locale = env::var("BROWSER_LOCALE").unwrap_or_else(|_| "en-US".to_string());

        let play_selector =
            env::var("PLAY_SELECTOR").unwrap_or_else(|_| DEFAULT_PLAY_SELECTOR.to_string());
        let loading_text =
            env::var("LOADING_TEXT").unwrap_or_else(|_| DEFAULT_LOADING_TEXT.to_string());

        let manifest_pattern =
            env::var("MANIFEST_PATTERN").unwrap_or_else(|_| DEFAULT_MANIFEST_PATTERN.to_string());
        let ad_exclude_pattern = env::var("AD_EXCLUDE_PATTERN")
            .unwrap_or_else(|_| DEFAULT_AD_EXCLUDE_PATTERN.to_string());
        // Fail at startup rather than on the first request
        ManifestMatcher::new(&manifest_pattern, &ad_exclude_pattern)?;

        Ok(Config {
            port,
            embed_base_url,
            is_dev,
            default_server,
            cache_ttl_secs,
            max_browser_sessions,
            headless,
            chrome_executable,
            user_agent,
            browser_locale,
            play_selector,
            loading_text,
            manifest_pattern,
            ad_exclude_pattern,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn browser_profile(&self) -> BrowserProfile {
        BrowserProfile {
            headless: self.headless,
            executable: self.chrome_executable.clone(),
            user_agent: self.user_agent.clone(),
            locale: self.browser_locale.clone(),
            ..BrowserProfile::default()
        }
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            profile: self.browser_profile(),
            play_selector: self.play_selector.clone(),
            loading_text: self.loading_text.clone(),
            ..ExtractorSettings::default()
        }
    }

    pub fn manifest_matcher(&self) -> Result<ManifestMatcher, regex::Error> {
        ManifestMatcher::new(&self.manifest_pattern, &self.ad_exclude_pattern)
    }
}
