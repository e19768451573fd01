//! Taste profiles, listener clusters and similarity playlists.
//!
//! Raw per-track genre tags become normalized genre distributions; those
//! become dense taste vectors; the vectors are clustered and ranked to
//! decide which listeners to draw playlist tracks from.
//!
//! Core modules:
//! - [`taxonomy`] - Subgenre → supergenre resolution
//! - [`distribution`] - Genre frequency maps from tagged tracks
//! - [`vector`] - Dense encodings and similarity measures
//! - [`cluster`] - K-means, archetypes and cluster ranking
//! - [`ranker`] - User-to-user similarity ranking
//! - [`playlist`] - Playlist assembly from ranked clusters
//!
//! ### Supporting Modules
//!
//! - [`catalog`] - Catalog track shapes and artist genre lookup
//! - [`cache`] - Artist genre cache and unknown-genre ledger
//! - [`profile`] - The stored user profile record
//! - [`db`] - Profile persistence (SQLite)
//! - [`bootstrap`] - Synthetic profiles and bulk loading
//! - [`config`] - Data directory and runtime settings
//! - [`error`] - Typed precondition errors
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```
//! use genre_distro::cluster::{ClusterConfig, ClusterModel, ClusterRanker};
//! use genre_distro::distribution::build_distributions;
//! use genre_distro::taxonomy::GenreTaxonomy;
//! use genre_distro::vector::GenreSpace;
//!
//! let taxonomy = GenreTaxonomy::from_pairs(vec![
//!     ("Folk", vec!["indie folk"]),
//!     ("Hip Hop", vec!["trap"]),
//! ]);
//! let listens = vec![vec!["indie folk"], vec!["indie folk"], vec!["trap"]];
//! let distros = build_distributions(&listens, &taxonomy);
//! assert!((distros.supergenres["Folk"] - 2.0 / 3.0).abs() < 1e-9);
//!
//! let space = GenreSpace::supergenres();
//! let population: Vec<(String, Vec<f64>)> = (0..4)
//!     .map(|i| (format!("u{i}"), space.encode(&[(space.genres[i].clone(), 1.0)].into())))
//!     .collect();
//! let model = ClusterModel::fit(&population, space.clone(), &ClusterConfig::new(4825).with_k(2))?;
//!
//! let (close, far) = model.similar_clusters(&space.encode(&distros.supergenres), 1)?;
//! assert_ne!(close[0].label, far[0].label);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Public functions return `anyhow::Result`. Missing data (no tags, an empty
//! pool) yields empty results rather than errors; asking for something that
//! cannot be answered, such as ranking before a model exists, yields an
//! [`error::TasteError`] that callers can recover with `downcast_ref`.

pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod cluster;
pub mod completion;
pub mod config;
pub mod db;
pub mod distribution;
pub mod error;
pub mod playlist;
pub mod profile;
pub mod ranker;
pub mod taxonomy;
pub mod vector;
