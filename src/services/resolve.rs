use std::sync::Arc;

use color_eyre::{
    Result,
    eyre::{OptionExt, bail},
};

use crate::database::Database;
use crate::matching::{MatchTarget, find_match};
use crate::ports::catalog::{CatalogApi, MatchCandidate};
use crate::services::catalog::CatalogAdapter;
use crate::services::track::{StoredTrack, TrackService};

/// Links stored tracks to catalog ids using the exact-match policy.
pub struct TrackResolver<C: CatalogApi> {
    tracks: TrackService,
    catalog: Arc<CatalogAdapter<C>>,
    search_pages: u32,
}

impl<C: CatalogApi> TrackResolver<C> {
    pub fn new(db: Arc<Database>, catalog: Arc<CatalogAdapter<C>>, search_pages: u32) -> Self {
        Self {
            tracks: TrackService::new(db),
            catalog,
            search_pages: search_pages.max(1),
        }
    }

    /// Search the catalog for the track and store the first exact match.
    ///
    /// Returns the catalog id, or `None` when nothing matched or the catalog
    /// could not be reached. Unmatched tracks stay unresolved for a later run.
    pub async fn resolve(&self, track: &StoredTrack) -> Result<Option<String>> {
        let target = MatchTarget::new(&track.name, track.artists.clone());

        let mut found = None;
        self.walk_search(track, |candidates| {
            found = find_match(&target, candidates).cloned();
            found.is_some()
        })
        .await;

        let Some(candidate) = found else {
            tracing::info!(
                "No catalog match for track {} '{}' by {}",
                track.id,
                track.name,
                track.artists.join(", ")
            );
            return Ok(None);
        };

        self.store(track.id, candidate).await.map(Some)
    }

    pub async fn resolve_by_id(&self, track_id: i64) -> Result<Option<String>> {
        let track = self
            .tracks
            .get_track(track_id)
            .await?
            .ok_or_eyre(format!("Track {} not found", track_id))?;
        self.resolve(&track).await
    }

    /// Retry every unresolved track, oldest first. Returns how many were
    /// resolved. A failure on one track is logged and does not stop the rest.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_unresolved(&self, limit: Option<u64>) -> Result<usize> {
        let pending = self.tracks.list_unresolved(limit).await?;
        tracing::info!("Resolving {} unresolved tracks", pending.len());

        let mut resolved = 0;
        for track in &pending {
            match self.resolve(track).await {
                Ok(Some(_)) => resolved += 1,
                Ok(None) => {}
                Err(e) => tracing::error!("Failed to resolve track {}: {:?}", track.id, e),
            }
        }

        tracing::info!("Resolved {} of {} tracks", resolved, pending.len());
        Ok(resolved)
    }

    /// Set a track's catalog id by hand. The id must show up in the catalog
    /// search results for the track's name and primary artist.
    pub async fn assign_manual(&self, track_id: i64, catalog_id: &str) -> Result<()> {
        let track = self
            .tracks
            .get_track(track_id)
            .await?
            .ok_or_eyre(format!("Track {} not found", track_id))?;

        let mut found = None;
        self.walk_search(&track, |candidates| {
            found = candidates
                .iter()
                .find(|candidate| candidate.catalog_id == catalog_id)
                .cloned();
            found.is_some()
        })
        .await;

        let Some(candidate) = found else {
            bail!(
                "Catalog id {} is not among the search results for '{}'",
                catalog_id,
                track.name
            );
        };

        self.store(track.id, candidate).await?;
        Ok(())
    }

    /// Page through search results until `visit` returns true, the results
    /// run out, `search_pages` pages were read, or the catalog gives up.
    async fn walk_search<F>(&self, track: &StoredTrack, mut visit: F)
    where
        F: FnMut(&[MatchCandidate]) -> bool,
    {
        let Some(primary_artist) = track.primary_artist() else {
            tracing::warn!("Track {} has no artists, skipping search", track.id);
            return;
        };

        let mut offset = 0;
        for _ in 0..self.search_pages {
            let Some(page) = self
                .catalog
                .search_page(&track.name, primary_artist, offset)
                .await
            else {
                return;
            };

            if visit(&page.candidates) {
                return;
            }

            match page.next_offset {
                Some(next) => offset = next,
                None => return,
            }
        }
    }

    async fn store(&self, track_id: i64, candidate: MatchCandidate) -> Result<String> {
        // Search results may omit the preview, the track lookup has it
        let preview_url = self
            .catalog
            .get_track(&candidate.catalog_id)
            .await
            .and_then(|found| found.preview_url)
            .or(candidate.preview_url);

        self.tracks
            .set_resolved(track_id, &candidate.catalog_id, preview_url.as_deref())
            .await?;
        tracing::info!("Track {} resolved to {}", track_id, candidate.catalog_id);
        Ok(candidate.catalog_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::catalog::{CatalogTrack, MockCatalogApi, SearchPage};
    use crate::services::catalog::RetryPolicy;
    use crate::test_utils::{scraped, test_db};
    use std::time::Duration;

    fn candidate(id: &str, name: &str, artists: &[&str]) -> MatchCandidate {
        MatchCandidate {
            catalog_id: id.to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            preview_url: None,
        }
    }

    fn lookup(id: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            name: "Song".into(),
            artists: vec![],
            preview_url: Some(format!("https://preview/{}", id)),
        }
    }

    fn resolver(db: Arc<Database>, api: MockCatalogApi) -> TrackResolver<MockCatalogApi> {
        let adapter = CatalogAdapter::new(api, RetryPolicy::new(2, Duration::ZERO));
        TrackResolver::new(db, Arc::new(adapter), 3)
    }

    async fn saved(db: &Arc<Database>, name: &str, artists: &[&str]) -> i64 {
        TrackService::new(db.clone())
            .save_if_new(&scraped(name, artists, &[]), "Pitchfork")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_stores_first_exact_match() {
        let db = test_db().await;
        let id = saved(&db, "Song", &["B Artist", "A Artist"]).await;

        let mut api = MockCatalogApi::new();
        api.expect_search_tracks()
            .withf(|query, offset| query == "Song artist:A Artist" && *offset == 0)
            .returning(|_, _| {
                Ok(SearchPage {
                    candidates: vec![
                        candidate("remix", "Song (Remix)", &["A Artist"]),
                        candidate("hit", "Song", &["b artist", "a artist"]),
                    ],
                    next_offset: Some(50),
                })
            });
        api.expect_track()
            .times(1)
            .returning(|id| Ok(lookup(id)));

        let resolved = resolver(db.clone(), api).resolve_by_id(id).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("hit"));

        let stored = TrackService::new(db).get_track(id).await.unwrap().unwrap();
        assert_eq!(stored.resolved_catalog_id.as_deref(), Some("hit"));
        assert_eq!(stored.preview_url.as_deref(), Some("https://preview/hit"));
    }

    #[tokio::test]
    async fn test_resolve_follows_pages_until_match() {
        let db = test_db().await;
        let id = saved(&db, "Song", &["A"]).await;

        let mut api = MockCatalogApi::new();
        api.expect_search_tracks().times(2).returning(|_, offset| {
            if offset == 0 {
                Ok(SearchPage {
                    candidates: vec![candidate("cover", "Song", &["A", "Choir"])],
                    next_offset: Some(50),
                })
            } else {
                Ok(SearchPage {
                    candidates: vec![candidate("orig", "Song", &["A"])],
                    next_offset: Some(100),
                })
            }
        });
        api.expect_track().returning(|id| Ok(lookup(id)));

        let resolved = resolver(db, api).resolve_by_id(id).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("orig"));
    }

    #[tokio::test]
    async fn test_resolve_no_match_leaves_track_unresolved() {
        let db = test_db().await;
        let id = saved(&db, "Song", &["A"]).await;

        let mut api = MockCatalogApi::new();
        // Stops after three pages even though more are offered
        api.expect_search_tracks().times(3).returning(|_, offset| {
            Ok(SearchPage {
                candidates: vec![candidate("x", "Other Song", &["A"])],
                next_offset: Some(offset + 50),
            })
        });
        api.expect_track().never();

        let resolved = resolver(db.clone(), api).resolve_by_id(id).await.unwrap();
        assert_eq!(resolved, None);

        let stored = TrackService::new(db).get_track(id).await.unwrap().unwrap();
        assert_eq!(stored.resolved_catalog_id, None);
    }

    #[tokio::test]
    async fn test_resolve_unresolved_skips_catalog_failures() {
        let db = test_db().await;
        let first = saved(&db, "First", &["A"]).await;
        let second = saved(&db, "Second", &["A"]).await;

        let mut api = MockCatalogApi::new();
        api.expect_search_tracks().returning(|query, _| {
            if query.starts_with("First") {
                Err(crate::ports::catalog::CatalogError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(SearchPage {
                    candidates: vec![candidate("second", "Second", &["A"])],
                    next_offset: None,
                })
            }
        });
        api.expect_track().returning(|id| Ok(lookup(id)));

        let resolved = resolver(db.clone(), api)
            .resolve_unresolved(None)
            .await
            .unwrap();
        assert_eq!(resolved, 1);

        let tracks = TrackService::new(db);
        assert_eq!(
            tracks.get_track(first).await.unwrap().unwrap().resolved_catalog_id,
            None
        );
        assert_eq!(
            tracks
                .get_track(second)
                .await
                .unwrap()
                .unwrap()
                .resolved_catalog_id
                .as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_assign_manual_requires_search_hit() {
        let db = test_db().await;
        let id = saved(&db, "Song", &["A"]).await;

        let mut api = MockCatalogApi::new();
        api.expect_search_tracks().returning(|_, _| {
            Ok(SearchPage {
                candidates: vec![candidate("live", "Song - Live", &["A"])],
                next_offset: None,
            })
        });
        api.expect_track().returning(|id| Ok(lookup(id)));
        let resolver = resolver(db.clone(), api);

        assert!(resolver.assign_manual(id, "unknown").await.is_err());
        resolver.assign_manual(id, "live").await.unwrap();

        let stored = TrackService::new(db).get_track(id).await.unwrap().unwrap();
        assert_eq!(stored.resolved_catalog_id.as_deref(), Some("live"));
    }
}
