//! User taste profiles as exchanged with the user store.
//!
//! A profile always has the same fixed fields; anything else found in a
//! stored record is kept verbatim in [`UserProfile::extensions`] so it
//! round-trips without being interpreted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::distribution::{FrequencyMap, ParsedTracks};

/// Cluster label for profiles no model has scored yet.
pub const UNASSIGNED_CLUSTER: i32 = -1;

const fn unassigned() -> i32 {
    UNASSIGNED_CLUSTER
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Representative track URIs.
    #[serde(default)]
    pub top_tracks: Vec<String>,
    #[serde(default)]
    pub subgenres: FrequencyMap,
    #[serde(default)]
    pub supergenres: FrequencyMap,
    #[serde(default = "unassigned")]
    pub cluster_id: i32,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            top_tracks: Vec::new(),
            subgenres: FrequencyMap::new(),
            supergenres: FrequencyMap::new(),
            cluster_id: UNASSIGNED_CLUSTER,
            extensions: BTreeMap::new(),
        }
    }

    /// Unassigned profile built from a parse.
    #[must_use]
    pub fn from_parsed(user_id: impl Into<String>, parsed: &ParsedTracks) -> Self {
        Self {
            top_tracks: parsed.tracks.iter().map(|t| t.uri.clone()).collect(),
            subgenres: parsed.distributions.subgenres.clone(),
            supergenres: parsed.distributions.supergenres.clone(),
            ..Self::new(user_id)
        }
    }

    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.cluster_id != UNASSIGNED_CLUSTER
    }

    #[must_use]
    pub fn top_supergenres(&self, n: usize) -> Vec<(String, f64)> {
        top_entries(&self.supergenres, n)
    }

    #[must_use]
    pub fn top_subgenres(&self, n: usize) -> Vec<(String, f64)> {
        top_entries(&self.subgenres, n)
    }
}

/// Largest `n` entries, descending by value, then by name.
fn top_entries(map: &FrequencyMap, n: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = map.iter().map(|(g, &f)| (g.clone(), f)).collect();
    entries.sort_by(|(ga, fa), (gb, fb)| fb.total_cmp(fa).then_with(|| ga.cmp(gb)));
    entries.truncate(n);
    entries
}
