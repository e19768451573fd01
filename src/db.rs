//! # Profile Store
//!
//! Persistence for [`UserProfile`] records. The rest of the crate talks to
//! the [`ProfileStore`] trait; [`SqliteStore`] is the on-disk implementation.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE profiles (
//!     user_id      TEXT PRIMARY KEY,
//!     cluster_id   INTEGER NOT NULL,
//!     data         TEXT NOT NULL,   -- full profile as JSON
//!     last_updated TEXT NOT NULL
//! );
//! CREATE INDEX idx_profiles_cluster ON profiles(cluster_id);
//! ```
//!
//! `cluster_id` is duplicated out of the JSON so cluster queries can use the
//! index. Taste maps stay maps; vectors are never stored.

use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::profile::UserProfile;

/// Storage for user profiles.
pub trait ProfileStore {
    /// Insert or replace one profile.
    fn save_profile(&mut self, profile: &UserProfile) -> Result<()>;

    /// Insert or replace many profiles atomically. Returns how many were written.
    fn save_profiles(&mut self, profiles: &[UserProfile]) -> Result<usize> {
        for profile in profiles {
            self.save_profile(profile)?;
        }
        Ok(profiles.len())
    }

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Up to `limit` profiles labelled `cluster_id`, ordered by user id.
    fn users_in_cluster(&self, cluster_id: i32, limit: usize) -> Result<Vec<UserProfile>>;

    fn all_profiles(&self) -> Result<Vec<UserProfile>>;

    /// Relabel one profile. Returns `false` if it does not exist.
    fn set_cluster(&mut self, user_id: &str, cluster_id: i32) -> Result<bool>;

    /// Returns `false` if the profile did not exist.
    fn delete_profile(&mut self, user_id: &str) -> Result<bool>;

    fn contains(&self, user_id: &str) -> Result<bool> {
        Ok(self.get_profile(user_id)?.is_some())
    }
}

/// SQLite-backed [`ProfileStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open profile database at {}", path.display()))?;
        debug!("Opened profile database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory profile database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id      TEXT PRIMARY KEY,
                cluster_id   INTEGER NOT NULL,
                data         TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_profiles_cluster ON profiles(cluster_id);",
        )
        .context("Failed to create profiles table")?;
        Ok(Self { conn })
    }

    /// Number of stored profiles.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .context("Failed to count profiles")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

const UPSERT: &str = "INSERT INTO profiles (user_id, cluster_id, data, last_updated)
     VALUES (?1, ?2, ?3, datetime('now'))
     ON CONFLICT(user_id) DO UPDATE SET
        cluster_id = excluded.cluster_id,
        data = excluded.data,
        last_updated = excluded.last_updated";

fn encode(profile: &UserProfile) -> Result<String> {
    serde_json::to_string(profile).with_context(|| format!("Failed to serialize profile {}", profile.user_id))
}

fn decode(user_id: &str, data: &str) -> Result<UserProfile> {
    serde_json::from_str(data).with_context(|| format!("Stored profile {user_id} is not valid JSON"))
}

impl SqliteStore {
    fn query_profiles(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare profile query")?;
        let rows = stmt
            .query_map(args, |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("Failed to query profiles")?;

        let mut profiles = Vec::new();
        for row in rows {
            let (user_id, data) = row.context("Failed to read profile row")?;
            profiles.push(decode(&user_id, &data)?);
        }
        Ok(profiles)
    }
}

impl ProfileStore for SqliteStore {
    fn save_profile(&mut self, profile: &UserProfile) -> Result<()> {
        self.conn
            .execute(UPSERT, params![profile.user_id, profile.cluster_id, encode(profile)?])
            .with_context(|| format!("Failed to save profile {}", profile.user_id))?;
        trace!("Saved profile {}", profile.user_id);
        Ok(())
    }

    fn save_profiles(&mut self, profiles: &[UserProfile]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT)?;
            for profile in profiles {
                stmt.execute(params![profile.user_id, profile.cluster_id, encode(profile)?])
                    .with_context(|| format!("Failed to save profile {}", profile.user_id))?;
            }
        }
        tx.commit().context("Committing profile batch failed")?;
        debug!("Saved {} profiles", profiles.len());
        Ok(profiles.len())
    }

    fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM profiles WHERE user_id = ?1", [user_id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up profile {user_id}"))?;
        data.map(|d| decode(user_id, &d)).transpose()
    }

    fn users_in_cluster(&self, cluster_id: i32, limit: usize) -> Result<Vec<UserProfile>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_profiles(
            "SELECT user_id, data FROM profiles WHERE cluster_id = ?1 ORDER BY user_id LIMIT ?2",
            params![cluster_id, limit],
        )
        .with_context(|| format!("Failed to fetch users from cluster {cluster_id}"))
    }

    fn all_profiles(&self) -> Result<Vec<UserProfile>> {
        self.query_profiles("SELECT user_id, data FROM profiles ORDER BY user_id", [])
    }

    fn set_cluster(&mut self, user_id: &str, cluster_id: i32) -> Result<bool> {
        let Some(mut profile) = self.get_profile(user_id)? else {
            return Ok(false);
        };
        profile.cluster_id = cluster_id;
        self.save_profile(&profile)?;
        Ok(true)
    }

    fn delete_profile(&mut self, user_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM profiles WHERE user_id = ?1", [user_id])
            .with_context(|| format!("Failed to delete profile {user_id}"))?;
        Ok(changed > 0)
    }

    fn contains(&self, user_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM profiles WHERE user_id = ?1", [user_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(id: &str, cluster: i32) -> UserProfile {
        let mut p = UserProfile::new(id);
        p.cluster_id = cluster;
        p.supergenres.insert("Rock".to_string(), 1.0);
        p.top_tracks.push(format!("spotify:track:{id}"));
        p
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let mut original = profile("u1", 3);
        original.extensions.insert("display_name".to_string(), serde_json::json!("Sunny Koala"));
        store.save_profile(&original)?;

        assert_eq!(store.get_profile("u1")?, Some(original));
        assert_eq!(store.get_profile("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_save_replaces_existing() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.save_profile(&profile("u1", 1))?;
        store.save_profile(&profile("u1", 2))?;

        assert_eq!(store.count()?, 1);
        assert_eq!(store.get_profile("u1")?.map(|p| p.cluster_id), Some(2));
        Ok(())
    }

    #[test]
    fn test_users_in_cluster_respects_limit() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let batch: Vec<UserProfile> =
            (0..6).map(|i| profile(&format!("u{i}"), if i % 2 == 0 { 4 } else { 5 })).collect();
        assert_eq!(store.save_profiles(&batch)?, 6);

        let four = store.users_in_cluster(4, 2)?;
        let ids: Vec<&str> = four.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u0", "u2"]);
        assert_eq!(store.users_in_cluster(5, 10)?.len(), 3);
        assert!(store.users_in_cluster(9, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_set_cluster_and_delete() -> Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.save_profile(&profile("u1", -1))?;

        assert!(store.set_cluster("u1", 7)?);
        assert!(!store.set_cluster("ghost", 7)?);
        assert_eq!(store.users_in_cluster(7, 5)?.len(), 1);

        assert!(store.delete_profile("u1")?);
        assert!(!store.delete_profile("u1")?);
        assert!(!store.contains("u1")?);
        Ok(())
    }

    #[test]
    fn test_persists_to_disk() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("profiles.db");
        {
            let mut store = SqliteStore::open(&path)?;
            store.save_profile(&profile("u1", 0))?;
        }

        let store = SqliteStore::open(&path)?;
        assert_eq!(store.all_profiles()?.len(), 1);
        Ok(())
    }
}
