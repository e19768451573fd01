//! # Persistent genre stores
//!
//! Two small JSON key-value files live next to the profile database:
//!
//! - `genre_cache.json`: artist id → catalog subgenres. Loaded once, merged
//!   into as unknown artists are resolved, and rewritten in full on flush.
//! - `unknown_genres.json`: subgenre → cumulative count of tags the taxonomy
//!   could not place. Used for offline taxonomy curation.
//!
//! Neither file is safe for concurrent writers. The cache is flushed through
//! `&mut self`; the ledger's read-merge-write runs under a process-wide lock.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::taxonomy::GenreCounts;

lazy_static::lazy_static! {
    /// Serializes ledger read-merge-write cycles within this process.
    static ref LEDGER_LOCK: Mutex<()> = Mutex::new(());
}

/// Artist → subgenre cache, optionally backed by a file.
#[derive(Debug, Clone, Default)]
pub struct GenreCache {
    entries: HashMap<String, Vec<String>>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl GenreCache {
    /// Load the cache from `path`, creating an empty file if none exists.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No genre cache at {}, creating an empty one", path.display());
            let mut cache = Self { entries: HashMap::new(), path: Some(path.to_path_buf()), dirty: true };
            cache.flush()?;
            return Ok(cache);
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read genre cache at {}", path.display()))?;
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("Genre cache at {} is not valid JSON", path.display()))?;
        debug!("Loaded {} cached artists from {}", entries.len(), path.display());

        Ok(Self { entries, path: Some(path.to_path_buf()), dirty: false })
    }

    /// A cache that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries(entries: HashMap<String, Vec<String>>) -> Self {
        Self { entries, path: None, dirty: false }
    }

    #[must_use]
    pub fn get(&self, artist_id: &str) -> Option<&[String]> {
        self.entries.get(artist_id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, artist_id: &str) -> bool {
        self.entries.contains_key(artist_id)
    }

    /// Add newly resolved artists. Returns how many were not cached before.
    pub fn merge(&mut self, fetched: HashMap<String, Vec<String>>) -> usize {
        let mut added = 0;
        for (artist, genres) in fetched {
            if self.entries.insert(artist, genres).is_none() {
                added += 1;
            }
        }
        if added > 0 {
            self.dirty = true;
        }
        added
    }

    /// Rewrite the whole cache file if anything changed.
    pub fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        write_json(path, &self.entries)
            .with_context(|| format!("Failed to save genre cache to {}", path.display()))?;
        debug!("Flushed {} cached artists to {}", self.entries.len(), path.display());
        self.dirty = false;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cumulative counts of subgenres missing from the taxonomy.
#[derive(Debug, Clone)]
pub struct UnknownGenreLedger {
    path: PathBuf,
}

impl UnknownGenreLedger {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Current ledger contents. A missing file or corrupt JSON counts as empty.
    ///
    /// # Errors
    ///
    /// Any other read failure, so a merge never overwrites counts it could
    /// not see.
    pub fn read(&self) -> Result<BTreeMap<String, u64>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Unknown-genre ledger at {} is corrupt ({e}); starting over", self.path.display());
                BTreeMap::new()
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read unknown genres at {}", self.path.display())),
        }
    }

    /// Add `unknown` into the ledger, summing with what is already there.
    pub fn merge(&self, unknown: &GenreCounts) -> Result<()> {
        if unknown.is_empty() {
            return Ok(());
        }

        // A poisoned lock only means another merge panicked; the file is still whole.
        let _guard = LEDGER_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut existing = self.read()?;
        for (genre, count) in unknown {
            *existing.entry(genre.clone()).or_insert(0) += count;
        }

        write_json(&self.path, &existing)
            .with_context(|| format!("Failed to save unknown genres to {}", self.path.display()))?;
        debug!("Merged {} unknown genres into {}", unknown.len(), self.path.display());
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
