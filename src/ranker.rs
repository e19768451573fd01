//! User-to-user similarity ranking.
//!
//! Candidates are scored by cosine similarity against a reference vector and
//! returned most similar first. A candidate whose vector is exactly the
//! reference is treated as the reference itself and left out, since the
//! caller may not know the reference's identifier.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::vector::{cosine_similarity, TasteVector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedUser {
    pub user_id: String,
    pub similarity: f64,
}

/// Rank `pool` against `reference`, descending, without self-matches.
#[must_use]
pub fn rank_users_by_similarity(reference: &[f64], pool: &[(String, TasteVector)]) -> Vec<RankedUser> {
    rank_users_excluding(reference, pool, true)
}

/// Rank `pool` against `reference`, descending. Equal scores order by id.
///
/// With `exclude_self`, candidates whose vector equals `reference` exactly
/// are dropped, however many ids share that vector.
#[must_use]
pub fn rank_users_excluding(reference: &[f64], pool: &[(String, TasteVector)], exclude_self: bool) -> Vec<RankedUser> {
    let mut ranked: Vec<RankedUser> = pool
        .par_iter()
        .filter(|(_, v)| !(exclude_self && v.as_slice() == reference))
        .map(|(id, v)| RankedUser { user_id: id.clone(), similarity: cosine_similarity(reference, v) })
        .collect();

    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.user_id.cmp(&b.user_id)));
    ranked
}

/// First `n` entries, or all of them when `n >= len`.
#[must_use]
pub fn top_n<T>(seq: &[T], n: usize) -> &[T] {
    &seq[..n.min(seq.len())]
}

/// Last `n` entries, or all of them when `n >= len`.
#[must_use]
pub fn bottom_n<T>(seq: &[T], n: usize) -> &[T] {
    &seq[seq.len() - n.min(seq.len())..]
}
