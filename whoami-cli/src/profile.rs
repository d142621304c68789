//! Listening-profile builder
//!
//! Sequences the fetches and the normalizer:
//!
//! ```text
//! recently played ──> track ids + popularity ──> audio features ──> normalize
//! playlist tracks ──> track ids + popularity ──> audio features ──> normalize ──> average
//! ```
//!
//! Each fetch is awaited before the next starts. An empty id list stops the
//! flow with [`whoami_common::Error::EmptyInput`] before any feature lookup.

use crate::spotify_client::{AudioFeatures, PlayHistoryItem, SpotifyError, Track};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use whoami_common::{AverageTable, FeatureNormalizer, FeatureTable, RawFeatureRecord};

/// Source of tracks and their audio features
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Most recently played tracks, at most `limit`
    async fn recently_played(&self, limit: u32) -> Result<Vec<PlayHistoryItem>, SpotifyError>;

    /// All tracks of a playlist
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError>;

    /// Audio features positionally matching `ids`
    async fn audio_features(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, SpotifyError>;
}

/// Profile builder errors
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Track source failed (network, auth, malformed response)
    #[error("Track source error: {0}")]
    Source(#[from] SpotifyError),

    /// Normalization failed or no tracks were found
    #[error(transparent)]
    Core(#[from] whoami_common::Error),
}

/// Personal rows plus the averages they are compared against
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    /// Every normalized row of the personal listening history
    pub rows: FeatureTable,
    /// Per-feature means of `rows`
    pub personal_average: AverageTable,
    /// Per-feature means of the regional playlist, if requested
    pub regional_average: Option<AverageTable>,
}

impl Comparison {
    /// Sorted union of feature names across all tables (chart category order)
    pub fn categories(&self) -> Vec<String> {
        let mut names = self.rows.feature_names();
        if let Some(regional) = &self.regional_average {
            names.extend(regional.feature_names());
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Builds personal and regional feature tables from a [`TrackSource`]
pub struct ProfileBuilder<S> {
    source: S,
    normalizer: FeatureNormalizer,
}

impl<S: TrackSource> ProfileBuilder<S> {
    pub fn new(source: S, normalizer: FeatureNormalizer) -> Self {
        Self { source, normalizer }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Normalized rows for the user's recently played tracks
    pub async fn personal(&self, limit: u32) -> Result<FeatureTable, ProfileError> {
        let history = self.source.recently_played(limit).await?;

        for item in &history {
            debug!(
                played_at = %item.played_at,
                track = %item.track.name,
                artists = %item.track.artist_names(),
                "Recently played"
            );
        }

        let tracks = history.into_iter().map(|item| item.track).collect();
        self.normalize_tracks(tracks, "recently played history").await
    }

    /// Per-feature means over a playlist's tracks
    pub async fn regional(&self, playlist_id: &str) -> Result<AverageTable, ProfileError> {
        let tracks = self.source.playlist_tracks(playlist_id).await?;
        let table = self
            .normalize_tracks(tracks, &format!("playlist {}", playlist_id))
            .await?;
        Ok(FeatureNormalizer::average(&table))
    }

    /// Personal table and averages, with an optional regional baseline
    pub async fn compare(
        &self,
        limit: u32,
        regional_playlist: Option<&str>,
    ) -> Result<Comparison, ProfileError> {
        let rows = self.personal(limit).await?;
        let personal_average = FeatureNormalizer::average(&rows);

        let regional_average = match regional_playlist {
            Some(playlist_id) => Some(self.regional(playlist_id).await?),
            None => None,
        };

        info!(
            rows = rows.len(),
            features = personal_average.len(),
            regional = regional_average.is_some(),
            "Listening profile ready"
        );

        Ok(Comparison {
            rows,
            personal_average,
            regional_average,
        })
    }

    async fn normalize_tracks(
        &self,
        tracks: Vec<Track>,
        context: &str,
    ) -> Result<FeatureTable, ProfileError> {
        let (track_ids, popularities): (Vec<String>, Vec<f64>) = tracks
            .iter()
            .filter_map(|track| {
                track
                    .id
                    .clone()
                    .map(|id| (id, track.popularity_score()))
            })
            .unzip();

        if track_ids.is_empty() {
            return Err(whoami_common::Error::EmptyInput(format!(
                "{} contains no Spotify tracks",
                context
            ))
            .into());
        }

        let features = self.source.audio_features(&track_ids).await?;
        if features.len() != track_ids.len() {
            return Err(SpotifyError::ParseError(format!(
                "Requested audio features for {} tracks, received {}",
                track_ids.len(),
                features.len()
            ))
            .into());
        }

        let mut records: Vec<RawFeatureRecord> = Vec::with_capacity(features.len());
        let mut kept_popularities = Vec::with_capacity(features.len());

        for ((id, popularity), feature) in track_ids.iter().zip(popularities).zip(features) {
            match feature {
                Some(feature) => {
                    records.push(feature.to_record());
                    kept_popularities.push(popularity);
                }
                None => warn!(track_id = %id, "No audio features available, skipping track"),
            }
        }

        info!(
            source = %context,
            tracks = track_ids.len(),
            analyzed = records.len(),
            "Normalizing audio features"
        );
        if records.is_empty() {
            warn!(
                source = %context,
                tracks = track_ids.len(),
                "None of the tracks have audio features; the chart will be empty"
            );
        }

        Ok(self.normalizer.normalize(&records, &kept_popularities)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whoami_common::NormalizedRow;

    #[test]
    fn test_categories_union_sorted() {
        let mut rows = FeatureTable::new();
        rows.push(NormalizedRow::new("popularity", 0.5));
        rows.push(NormalizedRow::new("energy", 0.5));
        let personal_average = FeatureNormalizer::average(&rows);

        let mut regional_rows = FeatureTable::new();
        regional_rows.push(NormalizedRow::new("tempo", 0.4));
        regional_rows.push(NormalizedRow::new("energy", 0.6));

        let comparison = Comparison {
            rows,
            personal_average,
            regional_average: Some(FeatureNormalizer::average(&regional_rows)),
        };

        assert_eq!(comparison.categories(), vec!["energy", "popularity", "tempo"]);
    }

    #[test]
    fn test_empty_input_error_message() {
        let err: ProfileError =
            whoami_common::Error::EmptyInput("recently played history contains no Spotify tracks".to_string())
                .into();
        assert_eq!(
            err.to_string(),
            "No tracks found: recently played history contains no Spotify tracks"
        );
    }
}
