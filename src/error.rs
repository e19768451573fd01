//! Typed precondition errors.
//!
//! Data-absence conditions never show up here: an empty track list or an
//! empty candidate pool yields an empty result. These variants cover the
//! cases where the caller asked for something that cannot be answered, and
//! the library fails fast instead of guessing a default.
//!
//! Library functions still return `anyhow::Result`; a `TasteError` converts
//! into it and callers can `downcast_ref::<TasteError>()` when they need to
//! branch on the cause.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TasteError {
    /// `predict`/`rank` was called before any model was fitted or installed.
    #[error("cluster model has not been fitted; run `genre-distro fit` or install a model first")]
    ModelNotFitted,

    #[error("invalid cluster count k={k} for a population of {population}")]
    InvalidClusterCount { k: usize, population: usize },

    #[error("cannot fit a cluster model on an empty population")]
    EmptyPopulation,

    #[error("vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("track count must be a positive integer, got {0}")]
    InvalidTrackCount(usize),

    #[error("invalid time range `{0}`; must be one of short_term, medium_term, long_term")]
    InvalidTimeRange(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("artist batch of {size} exceeds the catalog limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}
