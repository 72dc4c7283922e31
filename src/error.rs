use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to HTTP callers of the resolver
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Malformed request (unknown media type, missing season/episode)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Extraction finished without observing a manifest
    #[error("m3u8 not found")]
    NotFound,

    /// Browser launch/navigation failure or unexpected session error
    #[error("{0}")]
    Upstream(String),
}

/// Failures of the browser control surface
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Protocol(err.to_string())
    }
}

/// Failures of a single extraction session.
///
/// `Clone` because one outcome is fanned out to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigate(String),

    #[error("page interaction failed: {0}")]
    Interaction(String),

    #[error("extraction cancelled")]
    Cancelled,

    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

impl From<ExtractError> for ResolverError {
    fn from(err: ExtractError) -> Self {
        ResolverError::Upstream(err.to_string())
    }
}

impl ResolverError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolverError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ResolverError::NotFound => StatusCode::NOT_FOUND,
            ResolverError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        if let ResolverError::Upstream(msg) = &self {
            error!("Upstream failure: {}", msg);
        }

        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
