//! Contracts with the upstream music catalog.
//!
//! The catalog itself (HTTP, auth, paging) lives outside this crate. What
//! crosses the boundary is a list of raw track records and an artist → genre
//! lookup that must be called in batches of at most [`MAX_ARTIST_BATCH`].

use crate::error::TasteError;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Catalog limit on artists per lookup and tracks per page.
pub const MAX_ARTIST_BATCH: usize = 50;

/// A track with its genres resolved through the primary artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artist_ids: Vec<String>,
    pub artist_names: Vec<String>,
    pub album_name: String,
    pub album_cover: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl Track {
    /// The artist whose genres tag this track, if it has any.
    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_ids.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArtist {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlbum {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// Track record as the catalog returns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrack {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
    #[serde(default)]
    pub album: RawAlbum,
}

impl RawTrack {
    /// Convert into a [`Track`] with no genres yet.
    ///
    /// Returns `None` for tracks without any artist; those cannot be tagged.
    #[must_use]
    pub fn into_track(self) -> Option<Track> {
        if self.artists.is_empty() {
            return None;
        }
        let (artist_ids, artist_names): (Vec<String>, Vec<String>) = self.artists.into_iter().map(|a| (a.id, a.name)).unzip();
        Some(Track {
            id: self.id,
            uri: self.uri,
            name: self.name,
            artist_ids,
            artist_names,
            album_name: self.album.name,
            album_cover: self.album.images.into_iter().next().map(|img| img.url),
            genres: Vec::new(),
        })
    }
}

/// Pull the playlist or user id out of an `open.spotify.com` share link.
///
/// Returns `None` for anything that is not such a link, including bare ids.
///
/// ```
/// use genre_distro::catalog::extract_id;
///
/// assert_eq!(extract_id("https://open.spotify.com/playlist/37i9dQZF?si=abc"), Some("37i9dQZF"));
/// assert_eq!(extract_id("37i9dQZF"), None);
/// ```
#[must_use]
pub fn extract_id(url: &str) -> Option<&str> {
    const HOST: &str = "open.spotify.com/";

    let rest = &url[url.find(HOST)? + HOST.len()..];
    let id = rest.strip_prefix("playlist/").or_else(|| rest.strip_prefix("user/"))?;
    let id = id.split('?').next().unwrap_or_default();
    (!id.is_empty()).then_some(id)
}

/// Read a JSON array of raw catalog tracks.
pub fn load_raw_tracks(path: &Path) -> Result<Vec<RawTrack>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read track list at {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse track list at {}", path.display()))
}

/// Artist → subgenre lookup against the catalog.
pub trait ArtistGenreSource {
    /// Look up genres for at most [`MAX_ARTIST_BATCH`] artists.
    ///
    /// Artists the catalog does not know are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog call fails or the batch is too large.
    fn artist_genres(&self, artist_ids: &[String]) -> Result<HashMap<String, Vec<String>>>;
}

/// Offline catalog backed by an `artist_id -> [genres]` JSON file.
#[derive(Debug, Clone, Default)]
pub struct FileArtistSource {
    genres: HashMap<String, Vec<String>>,
}

impl FileArtistSource {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read artist genre file at {}", path.display()))?;
        let genres: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse artist genre file at {}", path.display()))?;
        debug!("Loaded {} artists from {}", genres.len(), path.display());
        Ok(Self { genres })
    }

    #[must_use]
    pub fn from_map(genres: HashMap<String, Vec<String>>) -> Self {
        Self { genres }
    }
}

impl ArtistGenreSource for FileArtistSource {
    fn artist_genres(&self, artist_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        if artist_ids.len() > MAX_ARTIST_BATCH {
            return Err(TasteError::BatchTooLarge { size: artist_ids.len(), limit: MAX_ARTIST_BATCH }.into());
        }
        Ok(artist_ids
            .iter()
            .filter_map(|id| self.genres.get(id).map(|g| (id.clone(), g.clone())))
            .collect())
    }
}

/// Listening-history window for top-track requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// About the last four weeks.
    ShortTerm,
    /// About the last six months.
    #[default]
    MediumTerm,
    /// About the last year.
    LongTerm,
}

impl FromStr for TimeRange {
    type Err = TasteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "short_term" => Ok(Self::ShortTerm),
            "medium_term" => Ok(Self::MediumTerm),
            "long_term" => Ok(Self::LongTerm),
            other => Err(TasteError::InvalidTimeRange(other.to_string())),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ShortTerm => "short_term",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        })
    }
}

/// One catalog page request: `limit` tracks starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// Validated request for a user's top tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopTracksRequest {
    pub num_tracks: usize,
    pub time_range: TimeRange,
}

impl TopTracksRequest {
    /// # Errors
    ///
    /// Fails with [`TasteError::InvalidTrackCount`] when `num_tracks` is zero.
    pub fn new(num_tracks: usize, time_range: TimeRange) -> std::result::Result<Self, TasteError> {
        if num_tracks == 0 {
            return Err(TasteError::InvalidTrackCount(num_tracks));
        }
        Ok(Self { num_tracks, time_range })
    }

    /// Page plan that never asks for more than [`MAX_ARTIST_BATCH`] at once.
    ///
    /// The remainder page goes first so every later page is full-sized.
    #[must_use]
    pub fn pages(&self) -> Vec<Page> {
        let mut pages = Vec::with_capacity(self.num_tracks / MAX_ARTIST_BATCH + 1);
        let mut offset = 0;

        let remainder = self.num_tracks % MAX_ARTIST_BATCH;
        if remainder != 0 {
            pages.push(Page { offset, limit: remainder });
            offset += remainder;
        }
        for _ in 0..self.num_tracks / MAX_ARTIST_BATCH {
            pages.push(Page { offset, limit: MAX_ARTIST_BATCH });
            offset += MAX_ARTIST_BATCH;
        }

        pages
    }
}

impl Default for TopTracksRequest {
    fn default() -> Self {
        Self { num_tracks: 100, time_range: TimeRange::MediumTerm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_track_without_artist_is_skipped() {
        let raw = RawTrack { id: "t1".into(), uri: "catalog:track:t1".into(), ..Default::default() };
        assert!(raw.into_track().is_none());
    }

    #[test]
    fn test_raw_track_parses_catalog_json() {
        let json = r#"[{
            "id": "t1", "uri": "catalog:track:t1", "name": "Song",
            "artists": [{"id": "a1", "name": "Artist"}, {"id": "a2", "name": "Feature"}],
            "album": {"name": "Album", "images": [{"url": "http://img/1"}]}
        }]"#;
        let raw: Vec<RawTrack> = serde_json::from_str(json).unwrap();
        let track = raw.into_iter().next().unwrap().into_track().unwrap();

        assert_eq!(track.primary_artist(), Some("a1"));
        assert_eq!(track.artist_names, vec!["Artist".to_string(), "Feature".to_string()]);
        assert_eq!(track.album_cover.as_deref(), Some("http://img/1"));
        assert!(track.genres.is_empty());
    }

    #[test]
    fn test_track_without_artists_has_no_primary() {
        let track: Track = serde_json::from_str(
            r#"{"id": "t1", "uri": "u", "name": "", "artist_ids": [], "artist_names": [],
                "album_name": "", "album_cover": null}"#,
        )
        .unwrap();
        assert_eq!(track.primary_artist(), None);
    }

    #[test]
    fn test_extract_id_from_share_links() {
        assert_eq!(extract_id("https://open.spotify.com/playlist/5ABC?si=1f2e"), Some("5ABC"));
        assert_eq!(extract_id("open.spotify.com/user/someone"), Some("someone"));
        assert_eq!(extract_id("https://open.spotify.com/album/5ABC"), None);
        assert_eq!(extract_id("https://open.spotify.com/playlist/?si=1"), None);
        assert_eq!(extract_id("5ABC"), None);
    }

    #[test]
    fn test_missing_cover_is_none() {
        let raw = RawTrack {
            id: "t1".into(),
            uri: "u".into(),
            artists: vec![RawArtist { id: "a".into(), name: String::new() }],
            ..Default::default()
        };
        assert_eq!(raw.into_track().unwrap().album_cover, None);
    }

    #[test]
    fn test_time_range_parsing() {
        assert_eq!("long_term".parse::<TimeRange>(), Ok(TimeRange::LongTerm));
        assert_eq!(
            "forever".parse::<TimeRange>(),
            Err(TasteError::InvalidTimeRange("forever".to_string()))
        );
        assert_eq!(TimeRange::default().to_string(), "medium_term");
    }

    #[test]
    fn test_zero_tracks_rejected() {
        assert_eq!(
            TopTracksRequest::new(0, TimeRange::ShortTerm),
            Err(TasteError::InvalidTrackCount(0))
        );
    }

    #[test]
    fn test_page_plan_respects_limit() {
        let req = TopTracksRequest::new(120, TimeRange::MediumTerm).unwrap();
        assert_eq!(
            req.pages(),
            vec![
                Page { offset: 0, limit: 20 },
                Page { offset: 20, limit: 50 },
                Page { offset: 70, limit: 50 },
            ]
        );

        let exact = TopTracksRequest::default();
        assert_eq!(exact.pages().len(), 2);
        assert!(exact.pages().iter().all(|p| p.limit == MAX_ARTIST_BATCH));
    }

    #[test]
    fn test_file_source_refuses_oversized_batch() {
        let source = FileArtistSource::default();
        let ids: Vec<String> = (0..51).map(|i| format!("a{i}")).collect();
        let err = source.artist_genres(&ids).unwrap_err();
        assert!(matches!(err.downcast_ref::<TasteError>(), Some(TasteError::BatchTooLarge { .. })));
    }
}
