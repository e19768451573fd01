//! # Command-Line Interface Module
//!
//! Clap definitions for the `genre-distro` binary.
//!
//! ## Commands
//!
//! - `distro`: Build genre distributions for a track list
//! - `show`: Print a stored profile's top genres
//! - `fit`: Train the cluster model on all stored profiles
//! - `sweep`: Compare fit quality across cluster counts
//! - `assign`: Re-label every stored profile
//! - `similar`: Closest and farthest clusters and users for a profile
//! - `playlist`: Assemble similar and contrasting playlists
//! - `chunk`: Cut a playlist into synthetic profiles
//! - `upload`: Bulk-load profile JSON files
//!
//! ## Examples
//!
//! ```bash
//! genre-distro distro top_tracks.json --user-id alice --save
//! genre-distro fit --k 12 --seed 4825
//! genre-distro playlist alice --total 50
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::TimeRange;
use crate::config::DATA_DIR_ENV;
use crate::vector::SpaceKind;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Vector layout used for clustering.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum Space {
    /// The 15 canonical supergenres
    #[default]
    Super,
    /// Every subgenre listed in the taxonomy
    Sub,
}

impl From<Space> for SpaceKind {
    fn from(space: Space) -> Self {
        match space {
            Space::Super => SpaceKind::Supergenre,
            Space::Sub => SpaceKind::Subgenre,
        }
    }
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "genre-distro")]
#[command(about = "Genre distributions, listener clusters and similarity playlists")]
#[command(version)]
pub struct Args {
    /// Directory holding the taxonomy, caches, profile database and model
    #[arg(long, global = true, env = DATA_DIR_ENV, value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Taxonomy file (defaults to genre_map.json in the data directory)
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub taxonomy: Option<PathBuf>,

    /// Offline artist catalog (defaults to artist_genres.json in the data directory)
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub artists: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build genre distributions for a list of catalog tracks
    ///
    /// Reads a JSON array of catalog tracks, resolves each primary artist's
    /// subgenres (cache first, then the artist catalog in batches of 50),
    /// and prints the resulting subgenre and supergenre distributions.
    /// Subgenres the taxonomy cannot place are added to unknown_genres.json.
    Distro {
        /// JSON array of catalog tracks
        #[arg(value_hint = clap::ValueHint::FilePath)]
        tracks: PathBuf,

        /// Profile id to build (and save, with --save)
        #[arg(long, default_value = "me")]
        user_id: String,

        /// Only use the first N tracks
        #[arg(long)]
        num_tracks: Option<usize>,

        /// Listening window the tracks were taken from
        #[arg(long, default_value = "medium_term")]
        time_range: TimeRange,

        /// Print a JSON payload instead of a table
        #[arg(long)]
        json: bool,

        /// Save the profile to the store
        #[arg(long)]
        save: bool,
    },

    /// Print a stored profile's top genres
    Show {
        user_id: String,

        /// How many genres to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Train the cluster model on every stored profile
    ///
    /// Runs K-means with several random restarts and keeps the best fit.
    /// The model is written to cluster_model.json and used by `assign`,
    /// `similar` and `playlist`. The same seed always gives the same model.
    Fit {
        /// Number of clusters
        #[arg(long, default_value = "12")]
        k: usize,

        /// Random seed for initialization
        #[arg(long)]
        seed: Option<u64>,

        /// Number of random restarts
        #[arg(long, default_value = "20")]
        n_init: usize,

        /// Vector layout to cluster in
        #[arg(long, value_enum, default_value_t = Space::Super)]
        space: Space,

        /// Store each profile's new label after fitting
        #[arg(long)]
        assign: bool,
    },

    /// Report inertia and silhouette for a range of cluster counts
    Sweep {
        #[arg(long, default_value = "3")]
        min_k: usize,

        #[arg(long, default_value = "15")]
        max_k: usize,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "10")]
        n_init: usize,

        #[arg(long, value_enum, default_value_t = Space::Super)]
        space: Space,
    },

    /// Re-label every stored profile
    ///
    /// Uses the fitted model, or the built-in archetypes with --archetypes.
    Assign {
        /// Use the built-in archetypes instead of the fitted model
        #[arg(long)]
        archetypes: bool,
    },

    /// Show the closest and farthest clusters and users for a profile
    Similar {
        #[arg(value_hint = clap::ValueHint::Other)]
        user_id: String,

        /// Entries to show at each end
        #[arg(short, default_value = "2")]
        n: usize,

        #[arg(long)]
        archetypes: bool,
    },

    /// Assemble "more of the same" and "something different" playlists
    ///
    /// Draws tracks from members of the profile's closest clusters and its
    /// farthest clusters. Prints one track URI per line for each playlist.
    Playlist {
        #[arg(value_hint = clap::ValueHint::Other)]
        user_id: String,

        /// Maximum tracks per playlist
        #[arg(long, default_value = "100")]
        total: usize,

        /// Clusters to draw from at each end
        #[arg(long, default_value = "2")]
        clusters: usize,

        /// Members sampled per cluster
        #[arg(long, default_value = "5")]
        users_per_cluster: usize,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        archetypes: bool,

        #[arg(long)]
        json: bool,
    },

    /// Cut a playlist into synthetic profiles
    ///
    /// Every full chunk of --chunk-size tracks becomes one unassigned
    /// profile, written to --out as {user_id}.json.
    Chunk {
        /// JSON array of catalog tracks
        #[arg(value_hint = clap::ValueHint::FilePath)]
        playlist: PathBuf,

        #[arg(long)]
        playlist_id: String,

        #[arg(long, default_value = "33")]
        chunk_size: usize,

        #[arg(long, default_value = "3")]
        chunks: usize,

        /// Name profiles after this playlist name instead of random handles
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        out: PathBuf,
    },

    /// Bulk-load profile JSON files into the store
    Upload {
        #[arg(required = true, value_hint = clap::ValueHint::DirPath)]
        dirs: Vec<PathBuf>,

        /// Stop after this many uploads
        #[arg(long)]
        max_users: Option<usize>,
    },

    /// Generate shell completions
    ///
    /// Usage: genre-distro completion bash > ~/.local/share/bash-completion/completions/genre-distro
    Completion {
        shell: Shell,
    },

    /// Generate bash completion with stored user id completion
    CompletionEnhanced,

    /// List stored user ids for completion (hidden command)
    #[command(hide = true)]
    CompleteUsers,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_playlist_defaults() {
        let args = Args::parse_from(["genre-distro", "playlist", "alice"]);
        match args.command {
            Command::Playlist { user_id, total, clusters, users_per_cluster, seed, .. } => {
                assert_eq!(user_id, "alice");
                assert_eq!((total, clusters, users_per_cluster), (100, 2, 5));
                assert_eq!(seed, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_time_range_rejected() {
        let result = Args::try_parse_from(["genre-distro", "distro", "t.json", "--time-range", "forever"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_space_flag() {
        let args = Args::parse_from(["genre-distro", "fit", "--space", "sub", "--seed", "9"]);
        match args.command {
            Command::Fit { space, seed, k, .. } => {
                assert_eq!(SpaceKind::from(space), SpaceKind::Subgenre);
                assert_eq!((seed, k), (Some(9), 12));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
