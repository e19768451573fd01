//! # Genre Distributions
//!
//! Turns a list of tagged tracks into two normalized frequency maps: one over
//! raw catalog subgenres and one over taxonomy supergenres.
//!
//! ```
//! use genre_distro::distribution::build_distributions;
//! use genre_distro::taxonomy::GenreTaxonomy;
//!
//! let taxonomy = GenreTaxonomy::from_pairs(vec![("Folk", vec!["indie folk"]), ("Hip Hop", vec!["trap"])]);
//! let tags = vec![vec!["indie folk"], vec!["indie folk"], vec!["trap"]];
//! let distros = build_distributions(&tags, &taxonomy);
//!
//! assert!((distros.supergenres["Folk"] - 2.0 / 3.0).abs() < 1e-9);
//! ```
//!
//! [`DistributionBuilder`] is the full pipeline used for real users: it
//! resolves artist genres through an injected [`GenreCache`] and catalog
//! source before counting.

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::cache::{GenreCache, UnknownGenreLedger};
use crate::catalog::{ArtistGenreSource, RawTrack, Track, MAX_ARTIST_BATCH};
use crate::taxonomy::{GenreCounts, GenreTaxonomy};

/// Genre name → normalized frequency.
pub type FrequencyMap = BTreeMap<String, f64>;

/// Anything that carries subgenre tags.
pub trait Tagged {
    type Tag: AsRef<str>;

    fn tags(&self) -> &[Self::Tag];
}

impl Tagged for Track {
    type Tag = String;

    fn tags(&self) -> &[String] {
        &self.genres
    }
}

impl<S: AsRef<str>> Tagged for Vec<S> {
    type Tag = S;

    fn tags(&self) -> &[S] {
        self
    }
}

/// Result of a distribution build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distributions {
    pub subgenres: FrequencyMap,
    pub supergenres: FrequencyMap,
    /// Raw counts of tags the taxonomy could not place.
    pub unknown: GenreCounts,
}

/// Count every tag on every track.
#[must_use]
pub fn count_subgenres<T: Tagged>(tracks: &[T]) -> GenreCounts {
    let mut counts = GenreCounts::new();
    for track in tracks {
        for tag in track.tags() {
            *counts.entry(tag.as_ref().to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Divide each count by the total. An empty tally stays empty.
#[must_use]
pub fn normalize(counts: &GenreCounts) -> FrequencyMap {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return FrequencyMap::new();
    }

    #[allow(clippy::cast_precision_loss)]
    let total = total as f64;
    counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(genre, &count)| {
            #[allow(clippy::cast_precision_loss)]
            let freq = count as f64 / total;
            (genre.clone(), freq)
        })
        .collect()
}

/// Build subgenre and supergenre distributions for `tracks`.
#[must_use]
pub fn build_distributions<T: Tagged>(tracks: &[T], taxonomy: &GenreTaxonomy) -> Distributions {
    let sub_counts = count_subgenres(tracks);
    let (super_counts, unknown) = taxonomy.aggregate_to_supergenre(&sub_counts);

    Distributions {
        subgenres: normalize(&sub_counts),
        supergenres: normalize(&super_counts),
        unknown,
    }
}

/// Tracks with genres attached, plus their distributions.
#[derive(Debug, Clone, Default)]
pub struct ParsedTracks {
    pub tracks: Vec<Track>,
    pub distributions: Distributions,
    /// Raw tracks dropped because they had no artist.
    pub skipped: usize,
}

/// Cache-aware distribution pipeline.
///
/// Owns the genre cache for its lifetime; callers get it back with
/// [`DistributionBuilder::into_cache`].
pub struct DistributionBuilder<'a, S: ArtistGenreSource> {
    source: S,
    cache: GenreCache,
    taxonomy: &'a GenreTaxonomy,
    ledger: Option<UnknownGenreLedger>,
}

impl<'a, S: ArtistGenreSource> DistributionBuilder<'a, S> {
    pub fn new(source: S, cache: GenreCache, taxonomy: &'a GenreTaxonomy) -> Self {
        Self { source, cache, taxonomy, ledger: None }
    }

    /// Record unresolved subgenres in `ledger` after every parse.
    #[must_use]
    pub fn with_ledger(mut self, ledger: UnknownGenreLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &GenreCache {
        &self.cache
    }

    #[must_use]
    pub fn into_cache(self) -> GenreCache {
        self.cache
    }

    /// Resolve genres for `raw_tracks` and compute their distributions.
    ///
    /// Catalog and cache-write failures are logged and the call still
    /// succeeds. Artists whose lookup failed end up untagged, so the result
    /// may be partial. A cache that could not be written stays dirty and is
    /// retried on the next flush.
    pub fn parse_tracks(&mut self, raw_tracks: Vec<RawTrack>) -> Result<ParsedTracks> {
        let total = raw_tracks.len();
        let mut tracks: Vec<Track> = raw_tracks.into_iter().filter_map(RawTrack::into_track).collect();
        let skipped = total - tracks.len();
        if skipped > 0 {
            debug!("Skipped {skipped} tracks without an artist");
        }

        let mut seen = HashSet::new();
        let unknown_artists: Vec<String> = tracks
            .iter()
            .filter_map(Track::primary_artist)
            .filter(|id| !self.cache.contains(id) && seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();

        self.fetch_artist_genres(&unknown_artists);

        for track in &mut tracks {
            track.genres = track
                .primary_artist()
                .and_then(|artist| self.cache.get(artist))
                .map(<[String]>::to_vec)
                .unwrap_or_default();
        }

        let distributions = build_distributions(&tracks, self.taxonomy);
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.merge(&distributions.unknown) {
                warn!("Could not record unknown genres: {e:#}");
            }
        }

        Ok(ParsedTracks { tracks, distributions, skipped })
    }

    fn fetch_artist_genres(&mut self, artist_ids: &[String]) {
        if artist_ids.is_empty() {
            return;
        }
        info!("Looking up genres for {} uncached artists", artist_ids.len());

        for batch in artist_ids.chunks(MAX_ARTIST_BATCH) {
            match self.source.artist_genres(batch) {
                Ok(mut fetched) => {
                    // Artists the catalog has no genres for are cached as empty.
                    for id in batch {
                        fetched.entry(id.clone()).or_default();
                    }
                    if self.cache.merge(fetched) > 0 {
                        if let Err(e) = self.cache.flush() {
                            warn!("Keeping genre cache in memory only: {e:#}");
                        }
                    }
                }
                Err(e) => warn!("Error fetching genres for {} artists: {e:#}", batch.len()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RawArtist;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn example_taxonomy() -> GenreTaxonomy {
        GenreTaxonomy::from_pairs(vec![("Folk", vec!["indie folk"]), ("Hip Hop", vec!["trap"])])
    }

    fn raw(id: &str, artist: &str) -> RawTrack {
        RawTrack {
            id: id.to_string(),
            uri: format!("catalog:track:{id}"),
            artists: vec![RawArtist { id: artist.to_string(), name: String::new() }],
            ..Default::default()
        }
    }

    /// Records every batch it is asked for.
    struct RecordingSource {
        genres: HashMap<String, Vec<String>>,
        calls: RefCell<Vec<usize>>,
        fail: bool,
    }

    impl RecordingSource {
        fn new(genres: &[(&str, &str)]) -> Self {
            Self {
                genres: genres
                    .iter()
                    .map(|(artist, genre)| ((*artist).to_string(), vec![(*genre).to_string()]))
                    .collect(),
                calls: RefCell::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl ArtistGenreSource for &RecordingSource {
        fn artist_genres(&self, artist_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
            self.calls.borrow_mut().push(artist_ids.len());
            if self.fail {
                anyhow::bail!("catalog unavailable");
            }
            Ok(artist_ids
                .iter()
                .filter_map(|id| self.genres.get(id).map(|g| (id.clone(), g.clone())))
                .collect())
        }
    }

    #[test]
    fn test_example_distribution() {
        let tags = vec![vec!["indie folk"], vec!["indie folk"], vec!["trap"]];
        let d = build_distributions(&tags, &example_taxonomy());

        assert!((d.subgenres["indie folk"] - 0.667).abs() < 1e-3);
        assert!((d.subgenres["trap"] - 0.333).abs() < 1e-3);
        assert!((d.supergenres["Folk"] - 0.667).abs() < 1e-3);
        assert!((d.supergenres["Hip Hop"] - 0.333).abs() < 1e-3);
        assert!(d.unknown.is_empty());
    }

    #[test]
    fn test_normalized_sums_to_one() {
        let counts: GenreCounts =
            [("a".to_string(), 7), ("b".to_string(), 13), ("c".to_string(), 1), ("d".to_string(), 99)].into();
        let total: f64 = normalize(&counts).values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs_give_empty_maps() {
        let none: Vec<Vec<&str>> = Vec::new();
        let untagged: Vec<Vec<&str>> = vec![vec![], vec![]];

        for tracks in [none, untagged] {
            let d = build_distributions(&tracks, &example_taxonomy());
            assert!(d.subgenres.is_empty());
            assert!(d.supergenres.is_empty());
        }
        assert!(normalize(&GenreCounts::new()).is_empty());
    }

    #[test]
    fn test_unknown_kept_in_subgenres_only() {
        let tags = vec![vec!["trap", "hyperpop"]];
        let d = build_distributions(&tags, &example_taxonomy());

        assert!((d.subgenres["hyperpop"] - 0.5).abs() < 1e-9);
        assert!((d.supergenres["Hip Hop"] - 1.0).abs() < 1e-9);
        assert_eq!(d.unknown.get("hyperpop"), Some(&1));
    }

    #[test]
    fn test_builder_resolves_and_caches() -> Result<()> {
        let source = RecordingSource::new(&[("a1", "indie folk"), ("a2", "trap")]);
        let taxonomy = example_taxonomy();
        let mut builder = DistributionBuilder::new(&source, GenreCache::in_memory(), &taxonomy);

        let parsed = builder.parse_tracks(vec![raw("t1", "a1"), raw("t2", "a1"), raw("t3", "a2")])?;
        assert_eq!(parsed.tracks[0].genres, vec!["indie folk".to_string()]);
        assert!((parsed.distributions.supergenres["Folk"] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(*source.calls.borrow(), vec![2]);

        // Second run hits the cache only.
        let again = builder.parse_tracks(vec![raw("t1", "a1"), raw("t2", "a1"), raw("t3", "a2")])?;
        assert_eq!(again.distributions, parsed.distributions);
        assert_eq!(source.calls.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_builder_batches_lookups() -> Result<()> {
        let source = RecordingSource::new(&[]);
        let taxonomy = example_taxonomy();
        let mut builder = DistributionBuilder::new(&source, GenreCache::in_memory(), &taxonomy);

        let tracks: Vec<RawTrack> = (0..120).map(|i| raw(&format!("t{i}"), &format!("a{i}"))).collect();
        builder.parse_tracks(tracks)?;

        assert_eq!(*source.calls.borrow(), vec![50, 50, 20]);
        Ok(())
    }

    #[test]
    fn test_genreless_artist_is_looked_up_once() -> Result<()> {
        let source = RecordingSource::new(&[]);
        let taxonomy = example_taxonomy();
        let mut builder = DistributionBuilder::new(&source, GenreCache::in_memory(), &taxonomy);

        for _ in 0..3 {
            let parsed = builder.parse_tracks(vec![raw("t1", "nobody")])?;
            assert!(parsed.distributions.subgenres.is_empty());
        }
        assert_eq!(*source.calls.borrow(), vec![1]);
        assert_eq!(builder.cache().get("nobody"), Some(&[][..]));
        Ok(())
    }

    #[test]
    fn test_unwritable_cache_still_parses() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let cache_dir = dir.path().join("d");
        let cache = GenreCache::load(&cache_dir.join("genre_cache.json"))?;
        std::fs::remove_dir_all(&cache_dir)?;
        std::fs::write(&cache_dir, "not a directory")?;

        let source = RecordingSource::new(&[("a1", "trap")]);
        let taxonomy = example_taxonomy();
        let mut builder = DistributionBuilder::new(&source, cache, &taxonomy);

        let parsed = builder.parse_tracks(vec![raw("t1", "a1"), raw("t2", "a1")])?;
        assert!((parsed.distributions.supergenres["Hip Hop"] - 1.0).abs() < 1e-9);
        assert!(builder.cache().contains("a1"));

        // The in-memory entry still serves the next parse.
        builder.parse_tracks(vec![raw("t3", "a1")])?;
        assert_eq!(source.calls.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_builder_skips_artistless_and_degrades_on_failure() -> Result<()> {
        let mut source = RecordingSource::new(&[("a1", "trap")]);
        source.fail = true;
        let taxonomy = example_taxonomy();
        let mut builder = DistributionBuilder::new(&source, GenreCache::in_memory(), &taxonomy);

        let artistless = RawTrack { id: "x".into(), uri: "u".into(), ..Default::default() };
        let parsed = builder.parse_tracks(vec![raw("t1", "a1"), artistless])?;

        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.tracks.len(), 1);
        assert!(parsed.distributions.subgenres.is_empty());
        Ok(())
    }
}
