//! # genre-distro
//!
//! Command-line front end: build taste profiles from track lists, cluster
//! the stored population, and assemble similarity playlists.
//!
//! ## Usage
//!
//! ```bash
//! # Profile a track list and store it
//! genre-distro distro top_tracks.json --user-id alice --save
//!
//! # Seed the store from playlists, then train
//! genre-distro chunk playlist.json --playlist-id 37i9dQ --out seeds/
//! genre-distro upload seeds/
//! genre-distro fit --assign
//!
//! # Recommend
//! genre-distro similar alice
//! genre-distro playlist alice --total 50
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=genre_distro=debug`.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::path::Path;

use genre_distro::bootstrap::{self, assign_clusters, profiles_from_playlist, upload_profiles, write_profiles};
use genre_distro::cache::{GenreCache, UnknownGenreLedger};
use genre_distro::catalog::{extract_id, load_raw_tracks, FileArtistSource, TimeRange, TopTracksRequest};
use genre_distro::cli::{self, Command};
use genre_distro::cluster::evaluation::sweep;
use genre_distro::cluster::{ArchetypeRanker, ClusterModel, ClusterRanker, ModelHandle, RankMetric};
use genre_distro::completion;
use genre_distro::config::{self, RuntimeConfig};
use genre_distro::db::{ProfileStore, SqliteStore};
use genre_distro::distribution::{DistributionBuilder, ParsedTracks};
use genre_distro::playlist::{generate_similarity_playlists, PlaylistRequest};
use genre_distro::profile::UserProfile;
use genre_distro::ranker::{bottom_n, rank_users_by_similarity, top_n};
use genre_distro::taxonomy::GenreTaxonomy;
use genre_distro::vector::{build_fixed_matrix, decode_for_row, GenreSpace, SpaceKind};

fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let data_dir = match &args.data_dir {
        Some(dir) => config::ensure_dir(dir)?,
        None => config::get_data_dir()?,
    };
    let config = RuntimeConfig::with_data_dir(data_dir)
        .with_taxonomy(args.taxonomy.clone())
        .with_artist_source(args.artists.clone());
    debug!("Using data directory {}", config.data_dir.display());

    match args.command {
        Command::Distro { tracks, user_id, num_tracks, time_range, json, save } => {
            let result = distro(&config, &tracks, &user_id, num_tracks, time_range, save);
            match (result, json) {
                (Ok((profile, parsed)), true) => {
                    println!("{}", serde_json::to_string_pretty(&distro_payload(&profile, &parsed))?);
                }
                (Ok((profile, parsed)), false) => print_distro(&profile, &parsed),
                (Err(e), true) => {
                    println!("{}", json!({ "error": format!("{e:#}") }));
                    std::process::exit(1);
                }
                (Err(e), false) => return Err(e),
            }
        }
        Command::Show { user_id, top } => {
            let store = SqliteStore::open(&config.db_path())?;
            let Some(profile) = store.get_profile(&user_id)? else {
                bail!("No profile stored for {user_id}");
            };
            println!("{} (cluster {})", profile.user_id, profile.cluster_id);
            print_top("Supergenres", &profile.top_supergenres(top));
            print_top("Subgenres", &profile.top_subgenres(top));
        }
        Command::Fit { k, seed, n_init, space, assign } => {
            let mut store = SqliteStore::open(&config.db_path())?;
            let seed = seed.unwrap_or(config.seed);
            let config = config.with_clusters(k).with_space(space.into()).with_seed(seed);
            let space = genre_space(&config)?;
            let population = build_fixed_matrix(&store.all_profiles()?, &space);

            let cluster_config = config.cluster_config().with_n_init(n_init);
            let model = ClusterModel::fit(&population, space, &cluster_config)?;
            model.save(&config.model_path())?;
            info!("Model written to {}", config.model_path().display());

            println!("Fitted {} clusters on {} profiles (inertia {:.4})", model.k(), population.len(), model.inertia());
            for (label, size) in model.cluster_sizes().iter().enumerate() {
                println!("  cluster {label:>2}: {size} profiles");
            }

            if assign {
                let handle = ModelHandle::with_model(model);
                let space = handle.current()?.space().clone();
                println!("{}", assign_clusters(&mut store, &handle, &space)?);
            }
        }
        Command::Sweep { min_k, max_k, seed, n_init, space } => {
            if min_k > max_k {
                bail!("--min-k ({min_k}) must not exceed --max-k ({max_k})");
            }
            let store = SqliteStore::open(&config.db_path())?;
            let seed = seed.unwrap_or(config.seed);
            let config = config.with_space(space.into()).with_seed(seed);
            let space = genre_space(&config)?;
            let population = build_fixed_matrix(&store.all_profiles()?, &space);
            let cluster_config = config.cluster_config().with_n_init(n_init);

            println!("{:>4}  {:>12}  {:>10}", "k", "inertia", "silhouette");
            for result in sweep(&population, &space, min_k..=max_k, &cluster_config)? {
                let silhouette = result.silhouette.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
                println!("{:>4}  {:>12.4}  {:>10}", result.k, result.inertia, silhouette);
            }
        }
        Command::Assign { archetypes } => {
            let mut store = SqliteStore::open(&config.db_path())?;
            let (ranker, space) = cluster_ranker(&config, archetypes)?;
            println!("{}", assign_clusters(&mut store, ranker.as_ref(), &space)?);
        }
        Command::Similar { user_id, n, archetypes } => {
            let store = SqliteStore::open(&config.db_path())?;
            let (ranker, space) = cluster_ranker(&config, archetypes)?;
            let profile = stored_profile(&store, &user_id)?;
            let vector = decode_for_row(&profile, &space);

            let (close, far) = ranker.similar_clusters(&vector, n)?;
            let unit = match ranker.metric() {
                RankMetric::Distance => "distance",
                RankMetric::Similarity => "similarity",
            };
            println!("Closest clusters:");
            for c in &close {
                println!("  {:>2}  {unit} {:.4}", c.label, c.score);
            }
            println!("Farthest clusters:");
            for c in &far {
                println!("  {:>2}  {unit} {:.4}", c.label, c.score);
            }

            let others: Vec<UserProfile> =
                store.all_profiles()?.into_iter().filter(|p| p.user_id != user_id).collect();
            let ranked = rank_users_by_similarity(&vector, &build_fixed_matrix(&others, &space));
            println!("Most similar users:");
            for user in top_n(&ranked, n) {
                println!("  {:.4}  {}", user.similarity, user.user_id);
            }
            println!("Least similar users:");
            for user in bottom_n(&ranked, n) {
                println!("  {:.4}  {}", user.similarity, user.user_id);
            }
        }
        Command::Playlist { user_id, total, clusters, users_per_cluster, seed, archetypes, json } => {
            let store = SqliteStore::open(&config.db_path())?;
            let (ranker, space) = cluster_ranker(&config, archetypes)?;
            let profile = stored_profile(&store, &user_id)?;
            let request = PlaylistRequest::new(total, clusters, users_per_cluster)?;
            let mut rng = StdRng::seed_from_u64(seed.unwrap_or(config.seed));

            let playlists = generate_similarity_playlists(
                ranker.as_ref(),
                &store,
                &decode_for_row(&profile, &space),
                &request,
                &mut rng,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&playlists)?);
            } else {
                println!("# Most similar ({} tracks)", playlists.most_similar.len());
                playlists.most_similar.iter().for_each(|uri| println!("{uri}"));
                println!("# Least similar ({} tracks)", playlists.least_similar.len());
                playlists.least_similar.iter().for_each(|uri| println!("{uri}"));
            }
        }
        Command::Chunk { playlist, playlist_id, chunk_size, chunks, name, seed, out } => {
            let taxonomy = GenreTaxonomy::load(&config.taxonomy_path())?;
            let mut builder = distribution_builder(&config, &taxonomy)?;
            let tracks = load_raw_tracks(&playlist)?;
            let playlist_id = extract_id(&playlist_id).unwrap_or(&playlist_id).to_string();
            let mut rng = StdRng::seed_from_u64(seed.unwrap_or(config.seed));

            let profiles = match name {
                Some(name) => {
                    let prefix = bootstrap::playlist_slug(&name, 11);
                    profiles_from_playlist(&mut builder, &playlist_id, &tracks, chunk_size, chunks, || prefix.clone())?
                }
                None => profiles_from_playlist(&mut builder, &playlist_id, &tracks, chunk_size, chunks, || {
                    bootstrap::fake_name(&mut rng)
                })?,
            };
            flush_cache(builder.into_cache());

            for path in write_profiles(&out, &profiles)? {
                println!("Saved {}", path.display());
            }
        }
        Command::Upload { dirs, max_users } => {
            let mut store = SqliteStore::open(&config.db_path())?;
            println!("{}", upload_profiles(&mut store, &dirs, max_users));
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
        Command::CompletionEnhanced => completion::generate_enhanced_bash_completion(),
        Command::CompleteUsers => completion::print_user_completions(&config.db_path())?,
    }

    Ok(())
}

fn distribution_builder<'a>(
    config: &RuntimeConfig,
    taxonomy: &'a GenreTaxonomy,
) -> Result<DistributionBuilder<'a, FileArtistSource>> {
    let source = FileArtistSource::load(&config.artist_source_path())?;
    let cache = GenreCache::load(&config.genre_cache_path())?;
    Ok(DistributionBuilder::new(source, cache, taxonomy).with_ledger(UnknownGenreLedger::new(config.unknown_genres_path())))
}

fn flush_cache(mut cache: GenreCache) {
    if let Err(e) = cache.flush() {
        warn!("Genre cache not saved: {e:#}");
    }
}

fn distro(
    config: &RuntimeConfig,
    tracks: &Path,
    user_id: &str,
    num_tracks: Option<usize>,
    time_range: TimeRange,
    save: bool,
) -> Result<(UserProfile, ParsedTracks)> {
    let taxonomy = GenreTaxonomy::load(&config.taxonomy_path())?;
    let mut builder = distribution_builder(config, &taxonomy)?;

    let mut raw = load_raw_tracks(tracks)?;
    if let Some(n) = num_tracks {
        let request = TopTracksRequest::new(n, time_range)?;
        debug!("Page plan for {n} tracks: {:?}", request.pages());
        raw.truncate(request.num_tracks);
    }

    let parsed = builder.parse_tracks(raw)?;
    flush_cache(builder.into_cache());

    let mut profile = UserProfile::from_parsed(user_id, &parsed);
    profile.extensions.insert("time_range".to_string(), json!(time_range.to_string()));

    if save {
        let mut store = SqliteStore::open(&config.db_path())?;
        if let Some(existing) = store.get_profile(user_id)? {
            profile.cluster_id = existing.cluster_id;
        }
        store.save_profile(&profile)?;
        info!("Saved profile {user_id}");
    }

    Ok((profile, parsed))
}

fn distro_payload(profile: &UserProfile, parsed: &ParsedTracks) -> serde_json::Value {
    let percent = |entries: Vec<(String, f64)>| -> Vec<(String, f64)> {
        entries.into_iter().map(|(g, f)| (g, f * 100.0)).collect()
    };
    json!({
        "user_id": profile.user_id,
        "track_count": parsed.tracks.len(),
        "skipped_tracks": parsed.skipped,
        "subgenre_distribution": percent(profile.top_subgenres(usize::MAX)),
        "supergenre_distribution": percent(profile.top_supergenres(usize::MAX)),
        "unknown_genres": parsed.distributions.unknown,
    })
}

fn print_distro(profile: &UserProfile, parsed: &ParsedTracks) {
    println!("{}: {} tracks ({} skipped)", profile.user_id, parsed.tracks.len(), parsed.skipped);
    print_top("Supergenres", &profile.top_supergenres(10));
    print_top("Subgenres", &profile.top_subgenres(10));
    if !parsed.distributions.unknown.is_empty() {
        println!("{} subgenres are missing from the taxonomy", parsed.distributions.unknown.len());
    }
}

fn print_top(title: &str, entries: &[(String, f64)]) {
    println!("{title}:");
    for (genre, freq) in entries {
        println!("  {:>6.2}%  {genre}", freq * 100.0);
    }
}

fn stored_profile(store: &SqliteStore, user_id: &str) -> Result<UserProfile> {
    store
        .get_profile(user_id)?
        .with_context(|| format!("No profile stored for {user_id}; run `genre-distro distro --save` first"))
}

fn genre_space(config: &RuntimeConfig) -> Result<GenreSpace> {
    Ok(match config.space {
        SpaceKind::Supergenre => GenreSpace::supergenres(),
        SpaceKind::Subgenre => GenreSpace::subgenres_of(&GenreTaxonomy::load(&config.taxonomy_path())?),
    })
}

/// The fitted model, or the built-in archetypes, with the space it ranks in.
fn cluster_ranker(config: &RuntimeConfig, archetypes: bool) -> Result<(Box<dyn ClusterRanker>, GenreSpace)> {
    if archetypes {
        let ranker = ArchetypeRanker::builtin();
        let space = ranker.space().clone();
        return Ok((Box::new(ranker), space));
    }

    let handle = ModelHandle::new();
    let path = config.model_path();
    if path.exists() {
        handle.install(ClusterModel::load(&path)?);
    }
    let space = handle.current()?.space().clone();
    Ok((Box::new(handle), space))
}
