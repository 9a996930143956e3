use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;

/// A catalog search result, as consumed by the match engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub catalog_id: String,
    pub name: String,
    /// Catalog order.
    pub artists: Vec<String>,
    pub preview_url: Option<String>,
}

/// One page of track search results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage {
    pub candidates: Vec<MatchCandidate>,
    /// Offset of the next page, `None` on the last page.
    pub next_offset: Option<u32>,
}

/// Decoupled representation of a catalog track lookup.
#[derive(Debug, Clone)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub preview_url: Option<String>,
}

/// Decoupled representation of a catalog playlist.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogPlaylist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Rate limited by catalog (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to send catalog request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Catalog authorization failed: {0}")]
    Auth(String),
}

impl CatalogError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CatalogError::RateLimited { .. })
    }
}

/// Port trait wrapping the catalog API calls the engine needs. Raw calls: no
/// retrying here, that is layered on by `services::catalog::CatalogAdapter`.
///
/// Implementations live in `services::catalog::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search_tracks(&self, query: &str, offset: u32) -> Result<SearchPage, CatalogError>;
    async fn track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError>;
    /// Every track id currently in the playlist.
    async fn playlist_track_ids(&self, playlist_id: &str)
    -> Result<HashSet<String>, CatalogError>;
    /// Append items in one request, returning the new snapshot id. At most
    /// [`MAX_ADD_ITEMS`] uris per call. The catalog accepts duplicates.
    async fn add_playlist_items(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String, CatalogError>;
    async fn current_user_id(&self) -> Result<String, CatalogError>;
    async fn user_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError>;
    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CatalogPlaylist, CatalogError>;
}

/// Largest batch the playlist add endpoint accepts.
pub const MAX_ADD_ITEMS: usize = 100;

pub fn track_uri(track_id: &str) -> String {
    format!("spotify:track:{}", track_id)
}
