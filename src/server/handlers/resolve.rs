use crate::{
    error::Result,
    metrics,
    server::state::AppState,
    target::{MediaKind, MediaRequest, parse_positive},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Optional query parameters shared by both resolve routes
#[derive(Debug, Default, Deserialize)]
pub struct ResolveParams {
    /// Backend server label; falls back to the configured default
    pub server: Option<String>,
}

impl ResolveParams {
    fn server_or(self, default: &str) -> String {
        self.server
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    pub success: bool,
    pub m3u8_url: String,
    pub server: String,
}

/// `GET /movie/{id}`
pub async fn resolve_movie(
    Path(id): Path<String>,
    Query(params): Query<ResolveParams>,
    State(state): State<AppState>,
) -> Result<Json<ManifestResponse>> {
    let server = params.server_or(&state.config.default_server);
    info!("Resolving movie {} via {}", id, server);

    respond(&state, MediaRequest::movie(id, server)).await
}

/// `GET /tv/{id}/{season}/{episode}`
pub async fn resolve_tv(
    Path((id, season, episode)): Path<(String, String, String)>,
    Query(params): Query<ResolveParams>,
    State(state): State<AppState>,
) -> Result<Json<ManifestResponse>> {
    let server = params.server_or(&state.config.default_server);
    info!("Resolving tv {} S{}E{} via {}", id, season, episode, server);

    let request = match (
        parse_positive("season", &season),
        parse_positive("episode", &episode),
    ) {
        (Ok(season), Ok(episode)) => {
            MediaRequest::tv_episode(id, Some(season), Some(episode), server)
        }
        (Err(e), _) | (_, Err(e)) => {
            metrics::record_request(MediaKind::TvEpisode.as_str(), e.status().as_u16());
            return Err(e);
        }
    };

    respond(&state, request).await
}

async fn respond(state: &AppState, request: MediaRequest) -> Result<Json<ManifestResponse>> {
    let result = state.resolver.resolve(&request).await;
    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request(request.kind.as_str(), status);

    let resolved = result?;
    Ok(Json(ManifestResponse {
        success: true,
        m3u8_url: resolved.manifest_url,
        server: resolved.server,
    }))
}
