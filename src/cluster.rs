//! # Listener Clustering
//!
//! Partitions a population of taste vectors into K behavioral clusters and
//! ranks clusters against a query vector.
//!
//! Two backends answer the same question ("which clusters is this listener
//! close to?") through the [`ClusterRanker`] trait:
//!
//! - [`ClusterModel`]: K-means fitted on real profiles, ranked by Euclidean
//!   distance to each centroid (ascending).
//! - [`ArchetypeRanker`]: a handful of hand-authored archetype vectors, ranked
//!   by cosine similarity (descending). Used to bootstrap before any model
//!   has been trained.
//!
//! ## Fitting
//!
//! Lloyd's algorithm with random-observation initialization, repeated
//! `n_init` times from seeds `seed, seed + 1, …`; the run with the lowest
//! inertia wins. The seed is always supplied by the caller. Two different
//! seeds may legitimately label the same population differently; only a
//! fixed seed gives reproducible labels.
//!
//! ## Sharing
//!
//! A fitted model is immutable. Readers share it through [`ModelHandle`];
//! a re-fit builds a fresh model and installs it in one swap, so readers
//! see either the old centroid set or the new one, never a mix.

use anyhow::{Context, Result};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::distribution::FrequencyMap;
use crate::error::TasteError;
use crate::ranker::{bottom_n, top_n};
use crate::vector::{cosine_similarity, euclidean_distance, squared_distance, GenreSpace, TasteVector};

/// Cluster count the product runs with; picked empirically.
pub const DEFAULT_CLUSTERS: usize = 12;

/// K-means parameters. There is deliberately no `Default`: the seed must
/// come from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub k: usize,
    pub max_iterations: usize,
    /// Independent restarts; the lowest-inertia run is kept.
    pub n_init: usize,
    /// Stop once total squared centroid movement falls below this.
    pub tolerance: f64,
    pub seed: u64,
}

impl ClusterConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            k: DEFAULT_CLUSTERS,
            max_iterations: 300,
            n_init: 20,
            tolerance: 1e-4,
            seed,
        }
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }
}

/// How a ranking's scores should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    /// Lower is closer; rankings ascend.
    Distance,
    /// Higher is closer; rankings descend.
    Similarity,
}

/// One entry of a cluster ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedCluster {
    pub label: i32,
    pub score: f64,
}

/// Anything that can order clusters by closeness to a taste vector.
pub trait ClusterRanker {
    fn metric(&self) -> RankMetric;

    /// Every cluster, closest first. Equal scores order by label.
    ///
    /// # Errors
    ///
    /// Fails on a vector from the wrong genre space, or when no model is
    /// available.
    fn rank_clusters(&self, vector: &[f64]) -> Result<Vec<RankedCluster>>;

    /// Label of the closest cluster.
    fn assign(&self, vector: &[f64]) -> Result<i32> {
        self.rank_clusters(vector)?
            .first()
            .map(|c| c.label)
            .ok_or_else(|| TasteError::ModelNotFitted.into())
    }

    fn most_similar(&self, vector: &[f64], n: usize) -> Result<Vec<RankedCluster>> {
        Ok(top_n(&self.rank_clusters(vector)?, n).to_vec())
    }

    fn least_similar(&self, vector: &[f64], n: usize) -> Result<Vec<RankedCluster>> {
        Ok(bottom_n(&self.rank_clusters(vector)?, n).to_vec())
    }

    /// `(n closest, n farthest)` from a single ranking pass.
    fn similar_clusters(&self, vector: &[f64], n: usize) -> Result<(Vec<RankedCluster>, Vec<RankedCluster>)> {
        let ranked = self.rank_clusters(vector)?;
        Ok((top_n(&ranked, n).to_vec(), bottom_n(&ranked, n).to_vec()))
    }
}

/// Fitted K-means state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    space: GenreSpace,
    centroids: Vec<TasteVector>,
    /// Training member ids, aligned with `labels`.
    member_ids: Vec<String>,
    labels: Vec<i32>,
    inertia: f64,
    iterations: usize,
    /// Seed of the winning restart.
    seed: u64,
}

/// Outcome of a single Lloyd run.
struct Run {
    centroids: Vec<TasteVector>,
    assignments: Vec<usize>,
    inertia: f64,
    iterations: usize,
    seed: u64,
}

impl ClusterModel {
    /// Fit K-means on `population`.
    ///
    /// # Errors
    ///
    /// Fails fast on an empty population, `k == 0`, `k` larger than the
    /// population, or rows whose length differs from `space`.
    pub fn fit(population: &[(String, TasteVector)], space: GenreSpace, config: &ClusterConfig) -> Result<Self> {
        if population.is_empty() {
            return Err(TasteError::EmptyPopulation.into());
        }
        if config.k == 0 || config.k > population.len() {
            return Err(TasteError::InvalidClusterCount { k: config.k, population: population.len() }.into());
        }
        for (_, row) in population {
            check_dims(space.dims(), row)?;
        }

        let rows: Vec<&[f64]> = population.iter().map(|(_, v)| v.as_slice()).collect();
        info!(
            "Fitting {} clusters on {} profiles ({} restarts, seed {})",
            config.k,
            rows.len(),
            config.n_init,
            config.seed
        );

        let mut best: Option<Run> = None;
        for restart in 0..config.n_init.max(1) {
            let seed = config.seed.wrapping_add(restart as u64);
            let run = lloyd(&rows, config, seed);
            debug!("Restart {restart}: inertia {:.6} after {} iterations", run.inertia, run.iterations);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        // n_init >= 1, so at least one run exists
        let best = best.ok_or(TasteError::EmptyPopulation)?;

        info!("Best fit: inertia {:.6} (seed {})", best.inertia, best.seed);
        Ok(Self {
            space,
            centroids: best.centroids,
            member_ids: population.iter().map(|(id, _)| id.clone()).collect(),
            labels: best.assignments.iter().map(|&c| label_of(c)).collect(),
            inertia: best.inertia,
            iterations: best.iterations,
            seed: best.seed,
        })
    }

    /// Model from known centroids, with no training members.
    ///
    /// # Errors
    ///
    /// Fails when there are no centroids or one has the wrong length.
    pub fn from_centroids(space: GenreSpace, centroids: Vec<TasteVector>) -> Result<Self> {
        check_centroids(&space, &centroids)?;
        Ok(Self {
            space,
            centroids,
            member_ids: Vec::new(),
            labels: Vec::new(),
            inertia: 0.0,
            iterations: 0,
            seed: 0,
        })
    }

    /// Read a model written by [`ClusterModel::save`].
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed JSON, and on a model whose centroids
    /// are missing or do not match its genre space.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster model at {}", path.display()))?;
        let model: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Cluster model at {} is not valid", path.display()))?;
        check_centroids(&model.space, &model.centroids)
            .with_context(|| format!("Cluster model at {} is inconsistent", path.display()))?;
        if model.labels.len() != model.member_ids.len() {
            anyhow::bail!(
                "Cluster model at {} has {} labels for {} members",
                path.display(),
                model.labels.len(),
                model.member_ids.len()
            );
        }
        debug!("Loaded {}-cluster model from {}", model.k(), path.display());
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize cluster model")?;
        fs::write(path, json).with_context(|| format!("Failed to write cluster model to {}", path.display()))
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn space(&self) -> &GenreSpace {
        &self.space
    }

    #[must_use]
    pub fn centroids(&self) -> &[TasteVector] {
        &self.centroids
    }

    /// Training labels, aligned with [`ClusterModel::member_ids`].
    #[must_use]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    #[must_use]
    pub fn member_ids(&self) -> &[String] {
        &self.member_ids
    }

    #[must_use]
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Training label of `user_id`, if it was part of the fit.
    #[must_use]
    pub fn label_for(&self, user_id: &str) -> Option<i32> {
        self.member_ids.iter().position(|id| id == user_id).map(|i| self.labels[i])
    }

    /// Number of training members per cluster.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &label in &self.labels {
            if let Some(size) = usize::try_from(label).ok().and_then(|l| sizes.get_mut(l)) {
                *size += 1;
            }
        }
        sizes
    }

    /// Label of the nearest centroid.
    pub fn predict(&self, vector: &[f64]) -> Result<i32> {
        check_dims(self.space.dims(), vector)?;
        Ok(label_of(nearest_centroid(vector, &self.centroids).0))
    }

    /// Labels for many vectors at once.
    pub fn predict_many(&self, vectors: &[TasteVector]) -> Result<Vec<i32>> {
        for v in vectors {
            check_dims(self.space.dims(), v)?;
        }
        Ok(vectors
            .par_iter()
            .map(|v| label_of(nearest_centroid(v, &self.centroids).0))
            .collect())
    }

    /// Distance from `vector` to every centroid, by label.
    pub fn transform(&self, vector: &[f64]) -> Result<Vec<f64>> {
        check_dims(self.space.dims(), vector)?;
        Ok(self.centroids.iter().map(|c| euclidean_distance(vector, c)).collect())
    }

    /// `(distance, label)` pairs, ascending by distance then label.
    pub fn rank_clusters_by_distance(&self, vector: &[f64]) -> Result<Vec<RankedCluster>> {
        let mut ranked: Vec<RankedCluster> = self
            .transform(vector)?
            .into_iter()
            .enumerate()
            .map(|(c, distance)| RankedCluster { label: label_of(c), score: distance })
            .collect();
        ranked.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.label.cmp(&b.label)));
        Ok(ranked)
    }
}

impl ClusterRanker for ClusterModel {
    fn metric(&self) -> RankMetric {
        RankMetric::Distance
    }

    fn rank_clusters(&self, vector: &[f64]) -> Result<Vec<RankedCluster>> {
        self.rank_clusters_by_distance(vector)
    }

    fn assign(&self, vector: &[f64]) -> Result<i32> {
        self.predict(vector)
    }
}

/// Shared slot for the active model.
///
/// Cheap to clone; all clones see the same slot.
#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<Arc<ClusterModel>>>>,
}

impl ModelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(model: ClusterModel) -> Self {
        let handle = Self::new();
        handle.install(model);
        handle
    }

    /// Snapshot of the active model.
    ///
    /// # Errors
    ///
    /// [`TasteError::ModelNotFitted`] until a model has been installed.
    pub fn current(&self) -> Result<Arc<ClusterModel>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TasteError::ModelNotFitted.into())
    }

    /// Replace the active model, returning the previous one.
    pub fn install(&self, model: ClusterModel) -> Option<Arc<ClusterModel>> {
        let model = Arc::new(model);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        info!("Installing {}-cluster model", model.k());
        slot.replace(model)
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl ClusterRanker for ModelHandle {
    fn metric(&self) -> RankMetric {
        RankMetric::Distance
    }

    fn rank_clusters(&self, vector: &[f64]) -> Result<Vec<RankedCluster>> {
        self.current()?.rank_clusters_by_distance(vector)
    }

    fn assign(&self, vector: &[f64]) -> Result<i32> {
        self.current()?.predict(vector)
    }
}

/// Hand-authored archetype profiles scored by cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeRanker {
    space: GenreSpace,
    archetypes: Vec<(i32, TasteVector)>,
}

impl ArchetypeRanker {
    /// Archetypes given as sparse maps, encoded over `space`.
    #[must_use]
    pub fn from_maps(space: GenreSpace, archetypes: Vec<(i32, FrequencyMap)>) -> Self {
        let archetypes = archetypes
            .into_iter()
            .map(|(label, map)| (label, space.encode(&map)))
            .collect();
        Self { space, archetypes }
    }

    /// The five starter archetypes over the canonical supergenre space.
    #[must_use]
    pub fn builtin() -> Self {
        let archetype = |pairs: &[(&str, f64)]| -> FrequencyMap {
            pairs.iter().map(|(g, w)| ((*g).to_string(), *w)).collect()
        };
        Self::from_maps(
            GenreSpace::supergenres(),
            vec![
                (0, archetype(&[("Pop", 0.7), ("Hip Hop", 0.1), ("Electronic", 0.1), ("Latin", 0.1)])),
                (1, archetype(&[("Rock", 0.5), ("Indie", 0.3), ("Punk", 0.1), ("Folk", 0.1)])),
                (2, archetype(&[("Hip Hop", 0.7), ("R&B", 0.2), ("Electronic", 0.1)])),
                (3, archetype(&[("Jazz", 0.4), ("Classical", 0.3), ("World", 0.3)])),
                (4, archetype(&[("Metal", 0.5), ("Rock", 0.3), ("Punk", 0.2)])),
            ],
        )
    }

    #[must_use]
    pub fn space(&self) -> &GenreSpace {
        &self.space
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }
}

impl ClusterRanker for ArchetypeRanker {
    fn metric(&self) -> RankMetric {
        RankMetric::Similarity
    }

    fn rank_clusters(&self, vector: &[f64]) -> Result<Vec<RankedCluster>> {
        check_dims(self.space.dims(), vector)?;
        let mut ranked: Vec<RankedCluster> = self
            .archetypes
            .iter()
            .map(|(label, archetype)| RankedCluster { label: *label, score: cosine_similarity(vector, archetype) })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.label.cmp(&b.label)));
        Ok(ranked)
    }
}

fn check_centroids(space: &GenreSpace, centroids: &[TasteVector]) -> Result<(), TasteError> {
    if centroids.is_empty() {
        return Err(TasteError::InvalidClusterCount { k: 0, population: 0 });
    }
    centroids.iter().try_for_each(|c| check_dims(space.dims(), c))
}

fn check_dims(expected: usize, vector: &[f64]) -> Result<(), TasteError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(TasteError::DimensionMismatch { expected, actual: vector.len() })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn label_of(cluster: usize) -> i32 {
    cluster as i32
}

/// Index and squared distance of the nearest centroid; ties go to the lower index.
fn nearest_centroid(vector: &[f64], centroids: &[TasteVector]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(vector, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// One K-means run from a seeded random initialization.
fn lloyd(rows: &[&[f64]], config: &ClusterConfig, seed: u64) -> Run {
    let mut rng = StdRng::seed_from_u64(seed);
    let dims = rows[0].len();
    let k = config.k;

    let mut centroids: Vec<TasteVector> = rand::seq::index::sample(&mut rng, rows.len(), k)
        .into_iter()
        .map(|i| rows[i].to_vec())
        .collect();

    let mut iterations = 0;
    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        let nearest: Vec<(usize, f64)> = rows.par_iter().map(|v| nearest_centroid(v, &centroids)).collect();

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (row, &(c, _)) in rows.iter().zip(&nearest) {
            counts[c] += 1;
            for (acc, x) in sums[c].iter_mut().zip(row.iter()) {
                *acc += x;
            }
        }

        // Empty clusters take the points currently worst served by their centroid.
        let mut far_points: Vec<usize> = (0..rows.len()).collect();
        far_points.sort_by(|&a, &b| nearest[b].1.total_cmp(&nearest[a].1).then(a.cmp(&b)));
        let mut far_points = far_points.into_iter();

        let mut shift = 0.0;
        for (c, (sum, &count)) in sums.into_iter().zip(&counts).enumerate() {
            let updated = if count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f64;
                sum.into_iter().map(|x| x / n).collect()
            } else if let Some(p) = far_points.next() {
                trace!("Cluster {c} empty at iteration {iterations}; reseeding from row {p}");
                rows[p].to_vec()
            } else {
                centroids[c].clone()
            };
            shift += squared_distance(&centroids[c], &updated);
            centroids[c] = updated;
        }

        trace!("Iteration {iterations}: centroid shift {shift:.8}");
        if shift <= config.tolerance {
            break;
        }
    }

    let nearest: Vec<(usize, f64)> = rows.par_iter().map(|v| nearest_centroid(v, &centroids)).collect();
    Run {
        centroids,
        assignments: nearest.iter().map(|&(c, _)| c).collect(),
        inertia: nearest.iter().map(|&(_, d)| d).sum(),
        iterations,
        seed,
    }
}

/// Fit-quality measures for choosing K offline.
pub mod evaluation {
    use super::*;
    use std::ops::RangeInclusive;

    /// Sum of squared distances from each row to its cluster's centroid.
    #[must_use]
    pub fn inertia(rows: &[TasteVector], labels: &[i32], centroids: &[TasteVector]) -> f64 {
        rows.iter()
            .zip(labels)
            .filter_map(|(row, &label)| {
                let c = centroids.get(usize::try_from(label).ok()?)?;
                Some(squared_distance(row, c))
            })
            .sum()
    }

    /// Mean silhouette coefficient, in `[-1, 1]`.
    ///
    /// `None` unless there are at least two clusters and fewer clusters than
    /// rows; the score is undefined otherwise.
    #[must_use]
    pub fn silhouette_score(rows: &[TasteVector], labels: &[i32]) -> Option<f64> {
        let n = rows.len();
        let mut distinct: Vec<i32> = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if n != labels.len() || distinct.len() < 2 || distinct.len() >= n {
            return None;
        }

        let total: f64 = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut sums = vec![0.0; distinct.len()];
                let mut counts = vec![0usize; distinct.len()];
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let slot = distinct.binary_search(&labels[j]).unwrap_or(0);
                    sums[slot] += euclidean_distance(&rows[i], &rows[j]);
                    counts[slot] += 1;
                }

                let own = distinct.binary_search(&labels[i]).unwrap_or(0);
                if counts[own] == 0 {
                    return 0.0;
                }
                #[allow(clippy::cast_precision_loss)]
                let a = sums[own] / counts[own] as f64;
                #[allow(clippy::cast_precision_loss)]
                let b = (0..distinct.len())
                    .filter(|&s| s != own && counts[s] > 0)
                    .map(|s| sums[s] / counts[s] as f64)
                    .fold(f64::INFINITY, f64::min);

                let denom = a.max(b);
                if denom == 0.0 || !b.is_finite() { 0.0 } else { (b - a) / denom }
            })
            .sum();

        #[allow(clippy::cast_precision_loss)]
        Some(total / n as f64)
    }

    /// Fit quality for one K.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SweepResult {
        pub k: usize,
        pub inertia: f64,
        pub silhouette: Option<f64>,
        pub iterations: usize,
    }

    /// Fit once per K in `k_range` and report each fit's quality.
    ///
    /// K values larger than the population are skipped.
    pub fn sweep(
        population: &[(String, TasteVector)],
        space: &GenreSpace,
        k_range: RangeInclusive<usize>,
        config: &ClusterConfig,
    ) -> Result<Vec<SweepResult>> {
        let rows: Vec<TasteVector> = population.iter().map(|(_, v)| v.clone()).collect();
        let mut results = Vec::new();

        for k in k_range {
            if k == 0 || k > population.len() {
                debug!("Skipping k={k} for a population of {}", population.len());
                continue;
            }
            let model = ClusterModel::fit(population, space.clone(), &config.clone().with_k(k))?;
            results.push(SweepResult {
                k,
                inertia: model.inertia(),
                silhouette: silhouette_score(&rows, model.labels()),
                iterations: model.iterations(),
            });
        }

        Ok(results)
    }
}
