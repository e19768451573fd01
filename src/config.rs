//! # Configuration Module
//!
//! Data directory layout and runtime settings.
//!
//! ## Data Storage
//!
//! Everything lives in one directory, by default the platform data directory:
//! - Linux: `~/.local/share/genre-distro/`
//! - macOS: `~/Library/Application Support/genre-distro/`
//! - Windows: `%APPDATA%\genre-distro\`
//!
//! Set `GENRE_DISTRO_DATA_DIR` (or pass `--data-dir`) to use another location.
//!
//! | File                  | Contents                              |
//! |-----------------------|---------------------------------------|
//! | `genre_map.json`      | supergenre → subgenres taxonomy       |
//! | `genre_cache.json`    | artist id → catalog subgenres         |
//! | `unknown_genres.json` | subgenres missing from the taxonomy   |
//! | `artist_genres.json`  | offline artist catalog                |
//! | `profiles.db`         | SQLite profile store                  |
//! | `cluster_model.json`  | fitted cluster model                  |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cluster::{ClusterConfig, DEFAULT_CLUSTERS};
use crate::vector::SpaceKind;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "GENRE_DISTRO_DATA_DIR";

/// Seed used when none is given on the command line.
pub const DEFAULT_SEED: u64 = 4825;

/// Returns the platform data directory for genre-distro, creating it if needed.
///
/// # Errors
///
/// Fails if the platform has no data directory or it cannot be created.
///
/// # Examples
///
/// ```no_run
/// use genre_distro::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Data lives in {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Set {DATA_DIR_ENV} to choose one explicitly."
        )
    })?;

    ensure_dir(&data_dir.join("genre-distro"))
}

/// Create `dir` if missing and return it.
pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| {
        format!("Failed to create data directory at {}. Please check file permissions.", dir.display())
    })?;
    Ok(dir.to_path_buf())
}

/// Runtime settings shared by every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    /// Taxonomy file; defaults to `genre_map.json` in the data directory.
    pub taxonomy_path: Option<PathBuf>,
    /// Offline artist catalog; defaults to `artist_genres.json` in the data directory.
    pub artist_source_path: Option<PathBuf>,
    pub clusters: usize,
    pub seed: u64,
    pub space: SpaceKind,
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            taxonomy_path: None,
            artist_source_path: None,
            clusters: DEFAULT_CLUSTERS,
            seed: DEFAULT_SEED,
            space: SpaceKind::Supergenre,
        }
    }

    #[must_use]
    pub fn with_taxonomy(mut self, path: Option<PathBuf>) -> Self {
        self.taxonomy_path = path;
        self
    }

    #[must_use]
    pub fn with_artist_source(mut self, path: Option<PathBuf>) -> Self {
        self.artist_source_path = path;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_clusters(mut self, clusters: usize) -> Self {
        self.clusters = clusters;
        self
    }

    #[must_use]
    pub fn with_space(mut self, space: SpaceKind) -> Self {
        self.space = space;
        self
    }

    #[must_use]
    pub fn taxonomy_path(&self) -> PathBuf {
        self.taxonomy_path.clone().unwrap_or_else(|| self.data_dir.join("genre_map.json"))
    }

    #[must_use]
    pub fn artist_source_path(&self) -> PathBuf {
        self.artist_source_path.clone().unwrap_or_else(|| self.data_dir.join("artist_genres.json"))
    }

    #[must_use]
    pub fn genre_cache_path(&self) -> PathBuf {
        self.data_dir.join("genre_cache.json")
    }

    #[must_use]
    pub fn unknown_genres_path(&self) -> PathBuf {
        self.data_dir.join("unknown_genres.json")
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("profiles.db")
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join("cluster_model.json")
    }

    /// K-means settings derived from this configuration.
    #[must_use]
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new(self.seed).with_k(self.clusters)
    }
}
