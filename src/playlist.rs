//! Playlist assembly from cluster rankings.
//!
//! A listener's closest and farthest clusters each contribute tracks drawn
//! from the top tracks of a few of their members. Publishing the result to a
//! catalog is left to the caller; this module only produces URI lists.

use anyhow::Result;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterRanker, RankedCluster};
use crate::db::ProfileStore;
use crate::error::TasteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRequest {
    /// Upper bound on each playlist's length.
    pub total_songs: usize,
    /// Clusters drawn from at each end of the ranking.
    pub clusters_to_use: usize,
    /// Members sampled per cluster.
    pub users_per_cluster: usize,
}

impl Default for PlaylistRequest {
    fn default() -> Self {
        Self { total_songs: 100, clusters_to_use: 2, users_per_cluster: 5 }
    }
}

impl PlaylistRequest {
    pub fn new(total_songs: usize, clusters_to_use: usize, users_per_cluster: usize) -> Result<Self, TasteError> {
        let request = Self { total_songs, clusters_to_use, users_per_cluster };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), TasteError> {
        if self.total_songs == 0 {
            return Err(TasteError::InvalidRequest("total_songs must be positive".to_string()));
        }
        if self.clusters_to_use == 0 {
            return Err(TasteError::InvalidRequest("clusters_to_use must be positive".to_string()));
        }
        if self.users_per_cluster == 0 {
            return Err(TasteError::InvalidRequest("users_per_cluster must be positive".to_string()));
        }
        Ok(())
    }

    /// Share of the playlist each cluster contributes.
    #[must_use]
    pub fn songs_per_cluster(&self) -> usize {
        self.total_songs / self.clusters_to_use
    }
}

/// Track URIs for the "more of the same" and "something different" playlists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPlaylists {
    pub most_similar: Vec<String>,
    pub least_similar: Vec<String>,
    pub close_clusters: Vec<RankedCluster>,
    pub far_clusters: Vec<RankedCluster>,
}

/// Up to `total_songs` URIs taken from members of `cluster_id`.
///
/// Each of up to `users_per_cluster` members contributes
/// `max(1, total_songs / members)` of their top tracks, picked at random.
pub fn tracks_from_cluster_users<S, R>(
    store: &S,
    cluster_id: i32,
    total_songs: usize,
    users_per_cluster: usize,
    rng: &mut R,
) -> Result<Vec<String>>
where
    S: ProfileStore + ?Sized,
    R: Rng + ?Sized,
{
    let users = store.users_in_cluster(cluster_id, users_per_cluster)?;
    if users.is_empty() {
        debug!("Cluster {cluster_id} has no members to draw from");
        return Ok(Vec::new());
    }

    let songs_per_user = (total_songs / users.len()).max(1);
    let mut uris = Vec::with_capacity(total_songs);
    for user in users {
        let mut tracks = user.top_tracks;
        tracks.shuffle(rng);
        uris.extend(tracks.into_iter().take(songs_per_user));
    }

    uris.truncate(total_songs);
    Ok(uris)
}

/// Build both playlists for `vector`.
///
/// A cluster whose members cannot be read contributes nothing; ranking
/// failures (no model, wrong dimensions) are returned.
pub fn generate_similarity_playlists<C, S, R>(
    ranker: &C,
    store: &S,
    vector: &[f64],
    request: &PlaylistRequest,
    rng: &mut R,
) -> Result<SimilarityPlaylists>
where
    C: ClusterRanker + ?Sized,
    S: ProfileStore + ?Sized,
    R: Rng + ?Sized,
{
    request.validate()?;
    let (close, far) = ranker.similar_clusters(vector, request.clusters_to_use)?;

    let mut collect = |clusters: &[RankedCluster]| -> Vec<String> {
        let mut uris = Vec::new();
        for cluster in clusters {
            match tracks_from_cluster_users(
                store,
                cluster.label,
                request.songs_per_cluster(),
                request.users_per_cluster,
                rng,
            ) {
                Ok(tracks) => uris.extend(tracks),
                Err(e) => warn!("Skipping cluster {}: {e:#}", cluster.label),
            }
        }
        uris.truncate(request.total_songs);
        uris
    };

    let most_similar = collect(&close);
    let least_similar = collect(&far);
    debug!("Assembled {} similar and {} contrasting tracks", most_similar.len(), least_similar.len());

    Ok(SimilarityPlaylists { most_similar, least_similar, close_clusters: close, far_clusters: far })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterModel;
    use crate::db::SqliteStore;
    use crate::profile::UserProfile;
    use crate::vector::GenreSpace;
    use anyhow::bail;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn member(id: &str, cluster: i32, tracks: usize) -> UserProfile {
        let mut p = UserProfile::new(id);
        p.cluster_id = cluster;
        p.top_tracks = (0..tracks).map(|i| format!("spotify:track:{id}-{i}")).collect();
        p
    }

    fn seeded_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open_in_memory()?;
        for cluster in 0..4 {
            for u in 0..3 {
                store.save_profile(&member(&format!("c{cluster}u{u}"), cluster, 20))?;
            }
        }
        Ok(store)
    }

    /// Store whose cluster lookups always fail.
    struct BrokenStore;

    impl ProfileStore for BrokenStore {
        fn save_profile(&mut self, _: &UserProfile) -> Result<()> {
            bail!("read-only")
        }
        fn get_profile(&self, _: &str) -> Result<Option<UserProfile>> {
            Ok(None)
        }
        fn users_in_cluster(&self, cluster_id: i32, _: usize) -> Result<Vec<UserProfile>> {
            bail!("cluster {cluster_id} unavailable")
        }
        fn all_profiles(&self) -> Result<Vec<UserProfile>> {
            Ok(Vec::new())
        }
        fn set_cluster(&mut self, _: &str, _: i32) -> Result<bool> {
            Ok(false)
        }
        fn delete_profile(&mut self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(PlaylistRequest::new(0, 2, 5).is_err());
        assert!(matches!(PlaylistRequest::new(10, 0, 5), Err(TasteError::InvalidRequest(_))));
        assert_eq!(PlaylistRequest::new(100, 2, 5).map(|r| r.songs_per_cluster()), Ok(50));
    }

    #[test]
    fn test_tracks_are_split_and_trimmed() -> Result<()> {
        let store = seeded_store()?;
        let mut rng = StdRng::seed_from_u64(1);

        let tracks = tracks_from_cluster_users(&store, 0, 10, 3, &mut rng)?;
        assert_eq!(tracks.len(), 9);
        for u in 0..3 {
            let prefix = format!("spotify:track:c0u{u}-");
            assert_eq!(tracks.iter().filter(|t| t.starts_with(&prefix)).count(), 3);
        }

        // More users than songs: everyone gives one, then the list is trimmed.
        assert_eq!(tracks_from_cluster_users(&store, 1, 2, 3, &mut rng)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_empty_cluster_gives_no_tracks() -> Result<()> {
        let store = seeded_store()?;
        let tracks = tracks_from_cluster_users(&store, 42, 10, 5, &mut StdRng::seed_from_u64(0))?;
        assert!(tracks.is_empty());
        Ok(())
    }

    #[test]
    fn test_playlists_draw_from_opposite_ends() -> Result<()> {
        let store = seeded_store()?;
        let model = ClusterModel::from_centroids(
            GenreSpace::supergenres(),
            (0..4).map(|c| vec![f64::from(c); 15]).collect(),
        )?;
        let request = PlaylistRequest::new(12, 1, 3)?;

        let playlists =
            generate_similarity_playlists(&model, &store, &[0.0; 15], &request, &mut StdRng::seed_from_u64(9))?;

        assert_eq!(playlists.close_clusters[0].label, 0);
        assert_eq!(playlists.far_clusters[0].label, 3);
        assert_eq!(playlists.most_similar.len(), 12);
        assert!(playlists.most_similar.iter().all(|t| t.contains(":c0u")));
        assert!(playlists.least_similar.iter().all(|t| t.contains(":c3u")));
        Ok(())
    }

    #[test]
    fn test_store_failures_degrade_to_empty() -> Result<()> {
        let model = ClusterModel::from_centroids(GenreSpace::supergenres(), vec![vec![0.0; 15], vec![1.0; 15]])?;
        let playlists = generate_similarity_playlists(
            &model,
            &BrokenStore,
            &[0.0; 15],
            &PlaylistRequest::default(),
            &mut StdRng::seed_from_u64(0),
        )?;
        assert!(playlists.most_similar.is_empty());
        assert!(playlists.least_similar.is_empty());
        Ok(())
    }

    #[test]
    fn test_unfitted_ranker_is_an_error() -> Result<()> {
        let store = seeded_store()?;
        let handle = crate::cluster::ModelHandle::new();
        let result = generate_similarity_playlists(
            &handle,
            &store,
            &[0.0; 15],
            &PlaylistRequest::default(),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(result.is_err());
        Ok(())
    }
}
