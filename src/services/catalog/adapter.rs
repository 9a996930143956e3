use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use super::retry::RetryPolicy;
use crate::ports::catalog::{
    CatalogApi, CatalogPlaylist, CatalogTrack, MAX_ADD_ITEMS, MatchCandidate, SearchPage,
    track_uri,
};

/// Outcome of [`CatalogAdapter::add_to_playlist`], one bucket per track id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistAddResult {
    /// Submitted and present in the playlist afterwards.
    pub added: Vec<String>,
    /// Already in the playlist, not submitted.
    pub duplicate: Vec<String>,
    /// Submitted but missing from the playlist afterwards.
    pub failed: Vec<String>,
}

/// The catalog operations the engine uses, each wrapped in the same
/// [`RetryPolicy`]. Every operation returns `None` instead of an error once the
/// policy gives up.
pub struct CatalogAdapter<C: CatalogApi> {
    api: C,
    retry: RetryPolicy,
}

pub fn search_query(name: &str, primary_artist: &str) -> String {
    format!("{} artist:{}", name, primary_artist)
}

/// Playlists whose name contains `keyword`, ignoring case, in catalog order.
pub fn matching_playlists(playlists: Vec<CatalogPlaylist>, keyword: &str) -> Vec<CatalogPlaylist> {
    let keyword = keyword.to_lowercase();
    playlists
        .into_iter()
        .filter(|playlist| playlist.name.to_lowercase().contains(&keyword))
        .collect()
}

impl<C: CatalogApi> CatalogAdapter<C> {
    pub fn new(api: C, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub async fn search_page(
        &self,
        name: &str,
        primary_artist: &str,
        offset: u32,
    ) -> Option<SearchPage> {
        let query = search_query(name, primary_artist);
        let query = query.as_str();
        self.retry
            .run("search", || self.api.search_tracks(query, offset))
            .await
    }

    /// First page of search results, in catalog relevance order.
    pub async fn search(&self, name: &str, primary_artist: &str) -> Option<Vec<MatchCandidate>> {
        self.search_page(name, primary_artist, 0)
            .await
            .map(|page| page.candidates)
    }

    pub async fn get_track(&self, track_id: &str) -> Option<CatalogTrack> {
        self.retry
            .run("get_track", || self.api.track(track_id))
            .await
    }

    async fn playlist_membership(&self, playlist_id: &str) -> Option<HashSet<String>> {
        self.retry
            .run("playlist_track_ids", || {
                self.api.playlist_track_ids(playlist_id)
            })
            .await
    }

    /// Add tracks to a playlist without creating duplicates.
    ///
    /// Ids already in the playlist are reported as duplicates and not sent.
    /// When nothing is left to send, no write is made. After a write the
    /// playlist is read back and each submitted id lands in `added` or
    /// `failed` depending on whether it is now present.
    pub async fn add_to_playlist(
        &self,
        playlist_id: &str,
        track_ids: &BTreeSet<String>,
    ) -> Option<PlaylistAddResult> {
        let current = self.playlist_membership(playlist_id).await?;

        let (duplicate, to_add): (Vec<String>, Vec<String>) = track_ids
            .iter()
            .cloned()
            .partition(|id| current.contains(id));

        for id in &duplicate {
            tracing::warn!("Skipping duplicate track {} for playlist {}", id, playlist_id);
        }

        if to_add.is_empty() {
            return Some(PlaylistAddResult {
                duplicate,
                ..Default::default()
            });
        }

        let uris: Vec<String> = to_add.iter().map(|id| track_uri(id)).collect();
        // Each batch retries on its own so a rate limit never resends a batch
        // that already went through
        for batch in uris.chunks(MAX_ADD_ITEMS) {
            match self
                .retry
                .run("add_playlist_items", || {
                    self.api.add_playlist_items(playlist_id, batch)
                })
                .await
            {
                Some(snapshot_id) => tracing::info!(
                    "Updated playlist {} with {} tracks (snapshot {})",
                    playlist_id,
                    batch.len(),
                    snapshot_id
                ),
                None => tracing::warn!(
                    "Adding {} tracks to playlist {} failed",
                    batch.len(),
                    playlist_id
                ),
            }
        }

        // Without a readable playlist nothing can be confirmed
        let after = self
            .playlist_membership(playlist_id)
            .await
            .unwrap_or_default();

        let (added, failed) = to_add.into_iter().partition(|id| after.contains(id));
        Some(PlaylistAddResult {
            added,
            duplicate,
            failed,
        })
    }

    /// The user's playlists whose name contains `keyword`.
    pub async fn playlists(&self, keyword: &str) -> Option<Vec<CatalogPlaylist>> {
        let playlists = self
            .retry
            .run("user_playlists", || self.api.user_playlists())
            .await?;
        Some(matching_playlists(playlists, keyword))
    }

    /// First of the user's playlists whose name contains `keyword`
    /// (case-insensitive), otherwise a newly created private playlist.
    pub async fn find_or_create_playlist(
        &self,
        keyword: &str,
        name: &str,
        description: &str,
    ) -> Option<CatalogPlaylist> {
        if let Some(existing) = self.playlists(keyword).await?.into_iter().next() {
            tracing::debug!("Using existing playlist {} ({})", existing.name, existing.id);
            return Some(existing);
        }

        let user_id = self
            .retry
            .run("current_user_id", || self.api.current_user_id())
            .await?;
        let user_id = user_id.as_str();

        let created = self
            .retry
            .run("create_playlist", || {
                self.api.create_playlist(user_id, name, description)
            })
            .await?;
        tracing::info!("Created playlist {} ({})", created.name, created.id);
        Some(created)
    }
}
