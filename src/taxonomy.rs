//! # Genre Taxonomy
//!
//! Maps fine-grained catalog tags ("indie folk", "trap") onto a small set of
//! coarse supergenres ("Folk", "Hip Hop") that the clustering works in.
//!
//! The table is loaded once from `genre_map.json`:
//!
//! ```json
//! { "genres_map": { "Pop": ["dance pop", "art pop"], "Hip Hop": ["trap"] } }
//! ```
//!
//! Supergenre order in the file is preserved. If a subgenre is listed under
//! more than one supergenre the first one in file order wins; the loader does
//! not assume the file was curated to be unique.

use anyhow::{Context, Result};
use log::{debug, trace, warn};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// Raw counts keyed by genre name.
pub type GenreCounts = BTreeMap<String, u64>;

/// Static, read-only subgenre → supergenre table.
#[derive(Debug, Clone, Default)]
pub struct GenreTaxonomy {
    /// Supergenres with their subgenres, in file order.
    groups: Vec<(String, Vec<String>)>,
    /// Reverse index; first insertion wins.
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct TaxonomyFile {
    genres_map: OrderedGroups,
}

/// A JSON object deserialized into a `Vec` so key order survives.
struct OrderedGroups(Vec<(String, Vec<String>)>);

impl<'de> Deserialize<'de> for OrderedGroups {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct GroupsVisitor;

        impl<'de> Visitor<'de> for GroupsVisitor {
            type Value = OrderedGroups;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping supergenre names to lists of subgenres")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut groups = Vec::with_capacity(map.size_hint().unwrap_or(16));
                while let Some((name, subs)) = map.next_entry::<String, Vec<String>>()? {
                    groups.push((name, subs));
                }
                Ok(OrderedGroups(groups))
            }
        }

        deserializer.deserialize_map(GroupsVisitor)
    }
}

impl GenreTaxonomy {
    /// Build a taxonomy from `(supergenre, subgenres)` pairs, in priority order.
    pub fn from_pairs<S, I, T>(pairs: I) -> Self
    where
        S: Into<String>,
        T: Into<String>,
        I: IntoIterator<Item = (S, Vec<T>)>,
    {
        let groups: Vec<(String, Vec<String>)> = pairs
            .into_iter()
            .map(|(sup, subs)| (sup.into(), subs.into_iter().map(Into::into).collect()))
            .collect();

        let mut index: HashMap<String, usize> = HashMap::new();
        for (pos, (sup, subs)) in groups.iter().enumerate() {
            for sub in subs {
                if let Some(&first) = index.get(sub) {
                    warn!(
                        "Subgenre `{sub}' listed under both `{}' and `{sup}'; keeping `{}'",
                        groups[first].0, groups[first].0
                    );
                    continue;
                }
                index.insert(sub.clone(), pos);
            }
        }

        Self { groups, index }
    }

    /// Parse a taxonomy from the `{"genres_map": {...}}` JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: TaxonomyFile =
            serde_json::from_str(json).context("Genre taxonomy is not a valid `genres_map' document")?;
        Ok(Self::from_pairs(file.genres_map.0))
    }

    /// Load the taxonomy file. Called once at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read genre taxonomy at {}", path.display()))?;
        let taxonomy = Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse genre taxonomy at {}", path.display()))?;
        debug!(
            "Loaded genre taxonomy with {} supergenres and {} subgenres from {}",
            taxonomy.groups.len(),
            taxonomy.index.len(),
            path.display()
        );
        Ok(taxonomy)
    }

    /// First supergenre (in file order) that lists `subgenre`.
    #[must_use]
    pub fn resolve_supergenre(&self, subgenre: &str) -> Option<&str> {
        self.index.get(subgenre).map(|&pos| self.groups[pos].0.as_str())
    }

    /// Fold subgenre counts into supergenre counts.
    ///
    /// Returns `(supergenre_counts, unknown_counts)`. Counts are preserved:
    /// the sum of both outputs equals the sum of the input.
    #[must_use]
    pub fn aggregate_to_supergenre(&self, subgenre_counts: &GenreCounts) -> (GenreCounts, GenreCounts) {
        let mut supers = GenreCounts::new();
        let mut unknown = GenreCounts::new();

        for (genre, &count) in subgenre_counts {
            match self.resolve_supergenre(genre) {
                Some(sup) => *supers.entry(sup.to_string()).or_insert(0) += count,
                None => {
                    trace!("No supergenre for `{genre}'");
                    *unknown.entry(genre.clone()).or_insert(0) += count;
                }
            }
        }

        (supers, unknown)
    }

    /// Supergenre names in file order.
    #[must_use]
    pub fn supergenres(&self) -> Vec<String> {
        self.groups.iter().map(|(sup, _)| sup.clone()).collect()
    }

    /// Every distinct subgenre, in file order.
    #[must_use]
    pub fn subgenres(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.groups
            .iter()
            .flat_map(|(_, subs)| subs.iter())
            .filter(|sub| seen.insert(sub.as_str()))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
