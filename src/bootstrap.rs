//! # Bootstrapping
//!
//! Seeds the profile store before real listeners exist.
//!
//! Long public playlists are cut into fixed-size chunks and every full chunk
//! becomes one synthetic, unassigned profile. Profiles are written as
//! individual JSON files, reviewed or labelled offline, then bulk-loaded with
//! [`upload_profiles`]. Once a model is available, [`assign_clusters`]
//! re-labels everything in the store.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{ArtistGenreSource, RawTrack};
use crate::cluster::ClusterRanker;
use crate::db::ProfileStore;
use crate::distribution::DistributionBuilder;
use crate::error::TasteError;
use crate::profile::UserProfile;
use crate::vector::{decode_for_row, GenreSpace};

const ADJECTIVES: [&str; 25] = [
    "vibey", "sunny", "moody", "cozyy", "zesty", "quirk", "breez", "cloud", "sassy", "faint",
    "foggy", "spicy", "grimy", "fizzy", "sleek", "hasty", "tidal", "fuzzy", "stark", "dusky",
    "brisk", "silly", "nerdy", "witty", "lofty",
];

const NOUNS: [&str; 25] = [
    "panda", "koala", "robot", "ninja", "cloud", "squid", "lemon", "berry", "tulip", "mossy",
    "candy", "ghost", "wheat", "petal", "storm", "vapor", "stone", "pearl", "flame", "honey",
    "raven", "sloth", "scone", "lilac", "bloom",
];

/// Random `adjective_noun` handle such as `sunny_koala`.
pub fn fake_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(rng).copied().unwrap_or("listener");
    format!("{adjective}_{noun}")
}

/// Filesystem- and id-safe form of a playlist name, at most `max_len` chars.
#[must_use]
pub fn playlist_slug(name: &str, max_len: usize) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .take(max_len)
        .collect();
    if slug.is_empty() { "unknown".to_string() } else { slug }
}

/// One unassigned profile per full chunk of `tracks`.
///
/// Chunk `i` (1-based) covers tracks `(i-1)*chunk_size .. i*chunk_size`; a
/// chunk shorter than `chunk_size` is skipped. Ids take the form
/// `{name_fn()}-{playlist_id}-{i}`.
pub fn profiles_from_playlist<S, F>(
    builder: &mut DistributionBuilder<'_, S>,
    playlist_id: &str,
    tracks: &[RawTrack],
    chunk_size: usize,
    num_chunks: usize,
    mut name_fn: F,
) -> Result<Vec<UserProfile>>
where
    S: ArtistGenreSource,
    F: FnMut() -> String,
{
    if chunk_size == 0 {
        return Err(TasteError::InvalidRequest("chunk size must be positive".to_string()).into());
    }

    let mut profiles = Vec::new();
    for idx in 0..num_chunks {
        let start = (idx * chunk_size).min(tracks.len());
        let chunk = &tracks[start..((idx + 1) * chunk_size).min(tracks.len())];
        if chunk.len() < chunk_size {
            warn!("Chunk {} of playlist {playlist_id} has only {} tracks", idx + 1, chunk.len());
            continue;
        }

        let parsed = builder
            .parse_tracks(chunk.to_vec())
            .with_context(|| format!("Failed to parse chunk {} of playlist {playlist_id}", idx + 1))?;
        let user_id = format!("{}-{playlist_id}-{}", name_fn(), idx + 1);
        let profile = UserProfile::from_parsed(user_id, &parsed);
        info!(
            "Built {} | Tracks: {} | Subgenres: {} | Supergenres: {}",
            profile.user_id,
            profile.top_tracks.len(),
            profile.subgenres.len(),
            profile.supergenres.len()
        );
        profiles.push(profile);
    }

    Ok(profiles)
}

/// Write each profile to `{dir}/{user_id}.json`.
pub fn write_profiles(dir: &Path, profiles: &[UserProfile]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let path = dir.join(format!("{}.json", profile.user_id));
        let json = serde_json::to_string_pretty(profile)
            .with_context(|| format!("Failed to serialize profile {}", profile.user_id))?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Outcome counts of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Upload Summary:")?;
        writeln!(f, "Uploaded: {}", self.uploaded)?;
        writeln!(f, "Skipped:  {}", self.skipped)?;
        write!(f, "Errors:   {}", self.errors)
    }
}

enum FileOutcome {
    Uploaded(String, i32),
    Skipped(String),
}

/// Load every `*.json` profile under `dirs` into `store`.
///
/// Files are visited in name order per directory. A file is skipped when it
/// has no `user_id`, has no `cluster_id` key, or repeats an id already
/// loaded in this run. Unreadable or invalid files and store failures are
/// counted as errors and the load carries on. With `max_users`, loading
/// stops once that many profiles have been uploaded.
pub fn upload_profiles<S>(store: &mut S, dirs: &[PathBuf], max_users: Option<usize>) -> UploadSummary
where
    S: ProfileStore + ?Sized,
{
    let mut summary = UploadSummary::default();
    let mut seen: HashSet<String> = HashSet::new();
    info!("Starting batch upload with max_users={max_users:?}");

    for dir in dirs {
        let files = match json_files(dir) {
            Ok(files) => files,
            Err(e) => {
                error!("{e:#}");
                summary.errors += 1;
                continue;
            }
        };

        for path in files {
            if max_users.is_some_and(|max| summary.uploaded >= max) {
                info!("Reached max upload limit: {}", summary.uploaded);
                return summary;
            }

            match upload_file(store, &path, &mut seen) {
                Ok(FileOutcome::Uploaded(user_id, cluster_id)) => {
                    debug!("Uploaded {user_id} -> cluster {cluster_id}");
                    summary.uploaded += 1;
                }
                Ok(FileOutcome::Skipped(reason)) => {
                    warn!("Skipping {}: {reason}", path.display());
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Error uploading {}: {e:#}", path.display());
                    summary.errors += 1;
                }
            }
        }
    }

    summary
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn upload_file<S>(store: &mut S, path: &Path, seen: &mut HashSet<String>) -> Result<FileOutcome>
where
    S: ProfileStore + ?Sized,
{
    let raw = fs::read_to_string(path).context("Failed to read file")?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("File is not valid JSON")?;

    let user_id = value.get("user_id").and_then(serde_json::Value::as_str).unwrap_or_default();
    let has_cluster = value.get("cluster_id").is_some_and(|c| !c.is_null());
    if user_id.is_empty() || !has_cluster {
        return Ok(FileOutcome::Skipped("missing user_id or cluster_id".to_string()));
    }
    if seen.contains(user_id) {
        return Ok(FileOutcome::Skipped(format!("duplicate user_id {user_id}")));
    }

    let profile: UserProfile = serde_json::from_value(value).context("File is not a valid profile")?;
    store.save_profile(&profile)?;
    seen.insert(profile.user_id.clone());
    Ok(FileOutcome::Uploaded(profile.user_id, profile.cluster_id))
}

/// Outcome counts of a re-labelling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl fmt::Display for AssignSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Assign Summary:")?;
        writeln!(f, "Changed:   {}", self.changed)?;
        writeln!(f, "Unchanged: {}", self.unchanged)?;
        write!(f, "Errors:    {}", self.errors)
    }
}

/// Score every stored profile with `ranker` and store the new labels.
///
/// # Errors
///
/// Fails immediately if the ranker has no model; per-profile failures are
/// counted instead.
pub fn assign_clusters<S, C>(store: &mut S, ranker: &C, space: &GenreSpace) -> Result<AssignSummary>
where
    S: ProfileStore + ?Sized,
    C: ClusterRanker + ?Sized,
{
    let profiles = store.all_profiles().context("Failed to load profiles for assignment")?;
    let mut summary = AssignSummary::default();

    for profile in profiles {
        let label = match ranker.assign(&decode_for_row(&profile, space)) {
            Ok(label) => label,
            Err(e) if e.downcast_ref::<TasteError>() == Some(&TasteError::ModelNotFitted) => return Err(e),
            Err(e) => {
                error!("Could not score {}: {e:#}", profile.user_id);
                summary.errors += 1;
                continue;
            }
        };

        if label == profile.cluster_id {
            summary.unchanged += 1;
            continue;
        }
        match store.set_cluster(&profile.user_id, label) {
            Ok(_) => summary.changed += 1,
            Err(e) => {
                error!("Could not relabel {}: {e:#}", profile.user_id);
                summary.errors += 1;
            }
        }
    }

    info!("Assigned clusters: {} changed, {} unchanged, {} errors", summary.changed, summary.unchanged, summary.errors);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GenreCache;
    use crate::catalog::{FileArtistSource, RawArtist};
    use crate::cluster::{ArchetypeRanker, ModelHandle};
    use crate::db::SqliteStore;
    use crate::taxonomy::GenreTaxonomy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn raw(i: usize) -> RawTrack {
        let artist = if i % 2 == 0 { "a-rock" } else { "a-pop" };
        RawTrack {
            id: format!("t{i}"),
            uri: format!("spotify:track:t{i}"),
            artists: vec![RawArtist { id: artist.to_string(), name: String::new() }],
            ..Default::default()
        }
    }

    fn source() -> FileArtistSource {
        FileArtistSource::from_map(HashMap::from([
            ("a-rock".to_string(), vec!["grunge".to_string()]),
            ("a-pop".to_string(), vec!["dance pop".to_string()]),
        ]))
    }

    fn taxonomy() -> GenreTaxonomy {
        GenreTaxonomy::from_pairs(vec![("Rock", vec!["grunge"]), ("Pop", vec!["dance pop"])])
    }

    #[test]
    fn test_fake_names_use_word_lists() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let name = fake_name(&mut rng);
            let (adjective, noun) = name.split_once('_').unwrap();
            assert!(ADJECTIVES.contains(&adjective));
            assert!(NOUNS.contains(&noun));
        }
    }

    #[test]
    fn test_playlist_slug() {
        assert_eq!(playlist_slug(" Indie / Rock Mix ", 50), "indie___rock_mix");
        assert_eq!(playlist_slug("Radio", 3), "rad");
        assert_eq!(playlist_slug("   ", 10), "unknown");
    }

    #[test]
    fn test_chunks_become_profiles() -> Result<()> {
        let taxonomy = taxonomy();
        let mut builder = DistributionBuilder::new(source(), GenreCache::in_memory(), &taxonomy);
        let tracks: Vec<RawTrack> = (0..70).map(raw).collect();

        let profiles = profiles_from_playlist(&mut builder, "pl1", &tracks, 33, 3, || "sunny_koala".to_string())?;

        // 70 tracks fill two chunks of 33; the third has only 4.
        let ids: Vec<&str> = profiles.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["sunny_koala-pl1-1", "sunny_koala-pl1-2"]);
        assert_eq!(profiles[0].top_tracks.len(), 33);
        assert_eq!(profiles[1].top_tracks[0], "spotify:track:t33");
        assert!(profiles.iter().all(|p| !p.is_assigned()));
        assert!((profiles[0].supergenres["Rock"] - 17.0 / 33.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let taxonomy = taxonomy();
        let mut builder = DistributionBuilder::new(source(), GenreCache::in_memory(), &taxonomy);
        assert!(profiles_from_playlist(&mut builder, "pl", &[], 0, 1, String::new).is_err());
    }

    fn write(dir: &Path, name: &str, value: &serde_json::Value) {
        fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn test_upload_summary_counts() -> Result<()> {
        let dir = TempDir::new()?;
        write(dir.path(), "a.json", &json!({"user_id": "u1", "cluster_id": 2}));
        write(dir.path(), "b.json", &json!({"user_id": "u1", "cluster_id": 3}));
        write(dir.path(), "c.json", &json!({"user_id": "u2"}));
        write(dir.path(), "d.json", &json!({"cluster_id": 1}));
        write(dir.path(), "e.json", &json!({"user_id": "u3", "cluster_id": "seven"}));
        fs::write(dir.path().join("f.json"), "{not json")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;
        write(dir.path(), "g.json", &json!({"user_id": "u4", "cluster_id": -1, "display_name": "x"}));

        let mut store = SqliteStore::open_in_memory()?;
        let summary = upload_profiles(&mut store, &[dir.path().to_path_buf()], None);

        assert_eq!(summary, UploadSummary { uploaded: 2, skipped: 3, errors: 2 });
        assert_eq!(store.get_profile("u1")?.map(|p| p.cluster_id), Some(2));
        assert!(store.contains("u4")?);
        Ok(())
    }

    #[test]
    fn test_upload_stops_at_max_users() -> Result<()> {
        let dir = TempDir::new()?;
        for i in 0..5 {
            write(dir.path(), &format!("{i}.json"), &json!({"user_id": format!("u{i}"), "cluster_id": 0}));
        }

        let mut store = SqliteStore::open_in_memory()?;
        let summary = upload_profiles(&mut store, &[dir.path().to_path_buf()], Some(3));
        assert_eq!(summary.uploaded, 3);
        assert_eq!(store.count()?, 3);
        Ok(())
    }

    #[test]
    fn test_upload_missing_dir_is_an_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let summary = upload_profiles(&mut store, &[PathBuf::from("/definitely/not/here")], None);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn test_summary_display() {
        let summary = UploadSummary { uploaded: 4, skipped: 1, errors: 0 };
        assert_eq!(summary.to_string(), "Upload Summary:\nUploaded: 4\nSkipped:  1\nErrors:   0");
    }

    #[test]
    fn test_write_then_upload() -> Result<()> {
        let dir = TempDir::new()?;
        let mut profile = UserProfile::new("vibey_panda-pl-1");
        profile.cluster_id = 4;
        let written = write_profiles(dir.path(), &[profile.clone()])?;
        assert_eq!(written[0].file_name().unwrap(), "vibey_panda-pl-1.json");

        let mut store = SqliteStore::open_in_memory()?;
        upload_profiles(&mut store, &[dir.path().to_path_buf()], None);
        assert_eq!(store.get_profile("vibey_panda-pl-1")?, Some(profile));
        Ok(())
    }

    #[test]
    fn test_assign_with_archetypes() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let mut metalhead = UserProfile::new("m");
        metalhead.supergenres.insert("Metal".to_string(), 1.0);
        let mut jazzcat = UserProfile::new("j");
        jazzcat.supergenres.insert("Jazz".to_string(), 1.0);
        jazzcat.cluster_id = 3;
        store.save_profiles(&[metalhead, jazzcat])?;

        let ranker = ArchetypeRanker::builtin();
        let summary = assign_clusters(&mut store, &ranker, ranker.space())?;

        assert_eq!(summary, AssignSummary { changed: 1, unchanged: 1, errors: 0 });
        assert_eq!(store.get_profile("m")?.map(|p| p.cluster_id), Some(4));
        Ok(())
    }

    #[test]
    fn test_assign_without_model_fails_fast() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.save_profile(&UserProfile::new("u"))?;

        let err = assign_clusters(&mut store, &ModelHandle::new(), &GenreSpace::supergenres()).unwrap_err();
        assert_eq!(err.downcast_ref::<TasteError>(), Some(&TasteError::ModelNotFitted));
        Ok(())
    }
}
