//! Spotify Web API client
//!
//! Covers the three read-only calls the profile needs:
//! - `GET /me/player/recently-played` (the user's listening history)
//! - `GET /playlists/{id}/tracks` (regional baseline, paginated)
//! - `GET /audio-features?ids=...` (batched, at most 100 ids per call)
//!
//! Authorization is a bearer access token obtained elsewhere; this client
//! never performs an OAuth exchange or refreshes the token.

use crate::profile::TrackSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use whoami_common::RawFeatureRecord;

const USER_AGENT: &str = concat!("whoami/", env!("CARGO_PKG_VERSION"));
const MIN_REQUEST_INTERVAL_MS: u64 = 100;

/// Audio-features endpoint accepts at most this many ids per request
pub const AUDIO_FEATURES_BATCH: usize = 100;
/// Page size requested from the playlist-items endpoint
pub const PLAYLIST_PAGE_LIMIT: u32 = 100;

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Token missing, expired or lacking scope (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Too many requests (429)
    #[error("Rate limit exceeded (retry after {retry_after_secs:?}s)")]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    /// Any other non-success response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Base URL cannot carry the request path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// One entry of the recently-played history
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayHistoryItem {
    pub played_at: DateTime<Utc>,
    pub track: Track,
}

/// Track object (simplified)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    /// Spotify track id; `None` for local files
    pub id: Option<String>,
    pub name: String,
    /// Popularity on Spotify's 0-100 scale
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl Track {
    /// Popularity rescaled to 0..1 for the normalizer
    pub fn popularity_score(&self) -> f64 {
        f64::from(self.popularity) / 100.0
    }

    /// Comma-joined artist names
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artist {
    pub name: String,
}

/// Audio features of one track
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioFeatures {
    pub id: String,
    pub danceability: f64,
    pub energy: f64,
    /// Average loudness in dB (typically -60..0)
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    /// Estimated tempo in BPM
    pub tempo: f64,
}

impl AudioFeatures {
    /// Name-keyed record for the normalizer
    pub fn to_record(&self) -> RawFeatureRecord {
        RawFeatureRecord::new()
            .with("danceability", self.danceability)
            .with("energy", self.energy)
            .with("loudness", self.loudness)
            .with("speechiness", self.speechiness)
            .with("acousticness", self.acousticness)
            .with("instrumentalness", self.instrumentalness)
            .with("liveness", self.liveness)
            .with("valence", self.valence)
            .with("tempo", self.tempo)
    }
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedPage {
    items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

/// Enforces a minimum spacing between consecutive requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Spotify request spacing: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
}

impl SpotifyClient {
    /// Create a client against the public Web API
    pub fn new(access_token: impl Into<String>) -> Result<Self, SpotifyError> {
        Self::with_base_url(access_token, whoami_common::config::DEFAULT_API_BASE_URL)
    }

    /// Create a client against an alternate base URL (e.g. a local stand-in)
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, SpotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            rate_limiter: Arc::new(RateLimiter::new(Duration::from_millis(
                MIN_REQUEST_INTERVAL_MS,
            ))),
        })
    }

    /// Replace the minimum spacing between requests
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(interval));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the user's most recently played tracks (newest first)
    pub async fn fetch_recently_played(
        &self,
        limit: u32,
    ) -> Result<Vec<PlayHistoryItem>, SpotifyError> {
        let url = format!("{}/me/player/recently-played?limit={}", self.base_url, limit);
        let page: RecentlyPlayedPage = self.get_json(&url).await?;

        tracing::info!(requested = limit, received = page.items.len(), "Fetched recently played tracks");

        Ok(page.items)
    }

    /// Fetch every track of a playlist, following pagination
    ///
    /// Items whose track is missing (removed or local-only) are skipped.
    pub async fn fetch_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        let mut first_page = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        first_page
            .query_pairs_mut()
            .append_pair("limit", &PLAYLIST_PAGE_LIMIT.to_string());

        let mut url = Some(first_page.to_string());
        let mut tracks = Vec::new();
        let mut pages = 0usize;

        while let Some(page_url) = url {
            let page: PlaylistPage = self.get_json(&page_url).await?;
            pages += 1;
            tracks.extend(page.items.into_iter().filter_map(|item| item.track));
            url = page.next;
        }

        tracing::info!(
            playlist = %playlist_id,
            pages,
            tracks = tracks.len(),
            "Fetched playlist tracks"
        );

        Ok(tracks)
    }

    /// Fetch audio features for `ids`, preserving request order
    ///
    /// Entries are `None` for tracks Spotify has no analysis for.
    pub async fn fetch_audio_features(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, SpotifyError> {
        let mut features = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(AUDIO_FEATURES_BATCH) {
            let url = format!("{}/audio-features?ids={}", self.base_url, chunk.join(","));
            let response: AudioFeaturesResponse = self.get_json(&url).await?;

            if response.audio_features.len() != chunk.len() {
                return Err(SpotifyError::ParseError(format!(
                    "Requested audio features for {} tracks, received {}",
                    chunk.len(),
                    response.audio_features.len()
                )));
            }

            features.extend(response.audio_features);
        }

        tracing::debug!(
            tracks = ids.len(),
            analyzed = features.iter().filter(|f| f.is_some()).count(),
            "Fetched audio features"
        );

        Ok(features)
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, SpotifyError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SpotifyError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                SpotifyError::InvalidUrl(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SpotifyError> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Querying Spotify Web API");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Unauthorized(error_text));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(SpotifyError::RateLimitExceeded { retry_after_secs });
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn recently_played(&self, limit: u32) -> Result<Vec<PlayHistoryItem>, SpotifyError> {
        self.fetch_recently_played(limit).await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        self.fetch_playlist_tracks(playlist_id).await
    }

    async fn audio_features(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, SpotifyError> {
        self.fetch_audio_features(ids).await
    }
}
