//! Media request model and canonical embed URL construction.
//!
//! The embed URL doubles as the cache key, so construction must be
//! deterministic: identical requests always produce the identical string.

use crate::error::{ResolverError, Result};
use url::Url;

/// Kind of title being resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    TvEpisode,
}

impl MediaKind {
    /// Path segment on the embed site, also the route label in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::TvEpisode => "tv",
        }
    }
}

/// One inbound resolve request. Built per call, consumed to build the
/// target URL, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRequest {
    pub kind: MediaKind,
    pub id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub server: String,
}

impl MediaRequest {
    pub fn movie(id: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Movie,
            id: id.into(),
            season: None,
            episode: None,
            server: server.into(),
        }
    }

    pub fn tv_episode(
        id: impl Into<String>,
        season: Option<u32>,
        episode: Option<u32>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            kind: MediaKind::TvEpisode,
            id: id.into(),
            season,
            episode,
            server: server.into(),
        }
    }
}

/// Parse a season/episode path segment as a positive integer.
pub fn parse_positive(field: &str, raw: &str) -> Result<u32> {
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ResolverError::InvalidRequest(format!(
            "{field} must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Builds canonical embed URLs against a fixed third-party base.
///
/// Movie: `{base}/movie/{id}?autoPlay=true&server={server}`
/// TV:    `{base}/tv/{id}/{season}/{episode}?autoPlay=true&server={server}`
#[derive(Clone, Debug)]
pub struct TargetUrlBuilder {
    base: Url,
}

impl TargetUrlBuilder {
    pub fn new(base: &str) -> std::result::Result<Self, url::ParseError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    /// Canonical embed URL for `request`.
    ///
    /// # Errors
    /// [`ResolverError::InvalidRequest`] when a TV episode lacks a positive
    /// season or episode number. Movies ignore season/episode entirely.
    pub fn build(&self, request: &MediaRequest) -> Result<String> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ResolverError::InvalidRequest("embed base URL cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();

            match request.kind {
                MediaKind::Movie => {
                    segments.push(request.kind.as_str()).push(&request.id);
                }
                MediaKind::TvEpisode => {
                    let (season, episode) = match (request.season, request.episode) {
                        (Some(s), Some(e)) if s > 0 && e > 0 => (s, e),
                        _ => {
                            return Err(ResolverError::InvalidRequest(
                                "season and episode are required for tv episodes".to_string(),
                            ));
                        }
                    };
                    segments
                        .push(request.kind.as_str())
                        .push(&request.id)
                        .push(&season.to_string())
                        .push(&episode.to_string());
                }
            }
        }

        url.query_pairs_mut()
            .append_pair("autoPlay", "true")
            .append_pair("server", &request.server);

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TargetUrlBuilder {
        TargetUrlBuilder::new("https://embed.example.com").unwrap()
    }

    #[test]
    fn movie_url_shape() {
        let url = builder()
            .build(&MediaRequest::movie("12345", "Vfast"))
            .unwrap();
        assert_eq!(
            url,
            "https://embed.example.com/movie/12345?autoPlay=true&server=Vfast"
        );
    }

    #[test]
    fn tv_url_shape() {
        let url = builder()
            .build(&MediaRequest::tv_episode("999", Some(1), Some(5), "Vfast"))
            .unwrap();
        assert_eq!(
            url,
            "https://embed.example.com/tv/999/1/5?autoPlay=true&server=Vfast"
        );
    }

    #[test]
    fn base_with_trailing_slash_and_path() {
        let b = TargetUrlBuilder::new("https://embed.example.com/embed/").unwrap();
        let url = b.build(&MediaRequest::movie("1", "Vfast")).unwrap();
        assert_eq!(
            url,
            "https://embed.example.com/embed/movie/1?autoPlay=true&server=Vfast"
        );
    }

    #[test]
    fn deterministic() {
        let req = MediaRequest::tv_episode("42", Some(3), Some(7), "Vfast");
        assert_eq!(builder().build(&req).unwrap(), builder().build(&req).unwrap());
    }

    #[test]
    fn distinct_requests_never_collide() {
        let b = builder();
        let requests = [
            MediaRequest::movie("1", "Vfast"),
            MediaRequest::movie("1", "Other"),
            MediaRequest::movie("2", "Vfast"),
            MediaRequest::movie("1/2", "Vfast"),
            MediaRequest::tv_episode("1", Some(1), Some(2), "Vfast"),
            MediaRequest::tv_episode("1", Some(2), Some(1), "Vfast"),
            MediaRequest::tv_episode("1", Some(1), Some(2), "Other"),
            MediaRequest::tv_episode("1/2", Some(1), Some(1), "Vfast"),
            MediaRequest::tv_episode("1", Some(12), Some(1), "Vfast"),
            MediaRequest::tv_episode("1", Some(1), Some(21), "Vfast"),
        ];
        let mut urls: Vec<String> = requests.iter().map(|r| b.build(r).unwrap()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), requests.len());
    }

    #[test]
    fn tv_without_season_or_episode_is_invalid() {
        let b = builder();
        for req in [
            MediaRequest::tv_episode("1", None, Some(1), "Vfast"),
            MediaRequest::tv_episode("1", Some(1), None, "Vfast"),
            MediaRequest::tv_episode("1", None, None, "Vfast"),
            MediaRequest::tv_episode("1", Some(0), Some(1), "Vfast"),
        ] {
            assert!(matches!(
                b.build(&req),
                Err(ResolverError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn movie_ignores_season_and_episode() {
        let mut req = MediaRequest::movie("7", "Vfast");
        req.season = Some(1);
        let with_season = builder().build(&req).unwrap();
        req.season = None;
        req.episode = Some(0);
        let with_episode = builder().build(&req).unwrap();

        assert_eq!(with_season, with_episode);
    }

    #[test]
    fn media_kind_labels() {
        assert_eq!(MediaRequest::movie("1", "Vfast").kind.as_str(), "movie");
        assert_eq!(
            MediaRequest::tv_episode("1", Some(1), Some(1), "Vfast")
                .kind
                .as_str(),
            "tv"
        );
    }

    #[test]
    fn positive_numbers_only() {
        assert_eq!(parse_positive("season", "3").unwrap(), 3);
        assert!(parse_positive("season", "0").is_err());
        assert!(parse_positive("episode", "-1").is_err());
        assert!(parse_positive("episode", "one").is_err());
    }

    #[test]
    fn opaque_base_rejected() {
        assert!(TargetUrlBuilder::new("mailto:someone@example.com").is_err());
    }
}
