//! # Taste Vectors
//!
//! Dense encodings of genre frequency maps. Every vector is laid out over a
//! [`GenreSpace`], a fixed ordered list of genre names, and vectors are only
//! comparable when built against the same space. Profiles store maps; these
//! vectors exist only inside clustering and ranking.

use serde::{Deserialize, Serialize};

use crate::distribution::FrequencyMap;
use crate::profile::UserProfile;
use crate::taxonomy::GenreTaxonomy;

/// Dense taste vector; slot `i` belongs to genre `i` of its [`GenreSpace`].
pub type TasteVector = Vec<f64>;

/// Canonical supergenre layout used for clustering.
pub const SUPERGENRES: [&str; 15] = [
    "Pop", "Hip Hop", "Rock", "Metal", "Indie",
    "Electronic", "Jazz", "R&B", "Latin", "Country",
    "Classical", "Folk", "Punk", "Reggae", "World",
];

/// Which profile map a space reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    Supergenre,
    Subgenre,
}

/// Ordered genre list that defines the vector layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreSpace {
    pub kind: SpaceKind,
    pub genres: Vec<String>,
}

impl Default for GenreSpace {
    fn default() -> Self {
        Self::supergenres()
    }
}

impl GenreSpace {
    /// The built-in 15-slot supergenre space.
    #[must_use]
    pub fn supergenres() -> Self {
        Self {
            kind: SpaceKind::Supergenre,
            genres: SUPERGENRES.iter().map(|g| (*g).to_string()).collect(),
        }
    }

    /// Supergenres of `taxonomy`, in file order.
    #[must_use]
    pub fn from_taxonomy(taxonomy: &GenreTaxonomy) -> Self {
        Self { kind: SpaceKind::Supergenre, genres: taxonomy.supergenres() }
    }

    /// Flat subgenre list of `taxonomy`.
    #[must_use]
    pub fn subgenres_of(taxonomy: &GenreTaxonomy) -> Self {
        Self { kind: SpaceKind::Subgenre, genres: taxonomy.subgenres() }
    }

    #[must_use]
    pub fn dims(&self) -> usize {
        self.genres.len()
    }

    #[must_use]
    pub fn encode(&self, map: &FrequencyMap) -> TasteVector {
        encode(map, &self.genres)
    }
}

/// Lay `map` out over `canonical`, in order. Missing genres become 0.0.
#[must_use]
pub fn encode<S: AsRef<str>>(map: &FrequencyMap, canonical: &[S]) -> TasteVector {
    canonical
        .iter()
        .map(|genre| map.get(genre.as_ref()).copied().unwrap_or(0.0))
        .collect()
}

/// Vector for a stored profile, in the layout of `space`.
#[must_use]
pub fn decode_for_row(profile: &UserProfile, space: &GenreSpace) -> TasteVector {
    let map = match space.kind {
        SpaceKind::Supergenre => &profile.supergenres,
        SpaceKind::Subgenre => &profile.subgenres,
    };
    space.encode(map)
}

/// Training matrix: one `(user_id, vector)` row per profile, in input order.
#[must_use]
pub fn build_fixed_matrix(profiles: &[UserProfile], space: &GenreSpace) -> Vec<(String, TasteVector)> {
    profiles
        .iter()
        .map(|p| (p.user_id.clone(), decode_for_row(p, space)))
        .collect()
}

#[must_use]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[must_use]
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine similarity. Zero-norm or mismatched vectors score 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (norm_a, norm_b) = (l2_norm(a), l2_norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[must_use]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[must_use]
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq(pairs: &[(&str, f64)]) -> FrequencyMap {
        pairs.iter().map(|(g, f)| ((*g).to_string(), *f)).collect()
    }

    #[test]
    fn test_encode_example() {
        assert_eq!(encode(&freq(&[("Pop", 0.5)]), &["Pop", "Rock"]), vec![0.5, 0.0]);
    }

    #[test]
    fn test_encode_matches_map_slot_by_slot() {
        let map = freq(&[("Jazz", 0.25), ("Folk", 0.75), ("Vaporwave", 1.0)]);
        let space = GenreSpace::supergenres();
        let v = space.encode(&map);

        assert_eq!(v.len(), space.dims());
        for (i, genre) in space.genres.iter().enumerate() {
            assert_eq!(v[i], map.get(genre).copied().unwrap_or(0.0));
        }
    }

    #[test]
    fn test_encode_empty_inputs() {
        let empty: [&str; 0] = [];
        assert!(encode(&freq(&[("Pop", 1.0)]), &empty).is_empty());
        assert_eq!(encode(&FrequencyMap::new(), &["Pop"]), vec![0.0]);
    }

    #[test]
    fn test_decode_for_row_picks_space() {
        let mut profile = UserProfile::new("u1");
        profile.supergenres = freq(&[("Rock", 1.0)]);
        profile.subgenres = freq(&[("shoegaze", 1.0)]);

        let sub_space = GenreSpace { kind: SpaceKind::Subgenre, genres: vec!["shoegaze".into(), "trap".into()] };
        assert_eq!(decode_for_row(&profile, &sub_space), vec![1.0, 0.0]);
        assert_eq!(decode_for_row(&profile, &GenreSpace::supergenres())[2], 1.0);
    }

    #[test]
    fn test_cosine_examples() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(squared_distance(&[1.0], &[1.0]), 0.0);
    }
}
