use std::sync::Arc;

use color_eyre::eyre::{OptionExt, Result};

use crate::database::Database;
use crate::entities;
use crate::ports::catalog::CatalogApi;
use crate::services::account::AccountService;
use crate::services::catalog::{CatalogAdapter, PlaylistAddResult};
use crate::services::track::TrackService;

/// Pushes resolved tracks onto an account's playlist. Built per account since
/// the catalog client carries that account's credentials.
pub struct PlaylistPublisher<C: CatalogApi> {
    tracks: TrackService,
    accounts: AccountService,
    catalog: Arc<CatalogAdapter<C>>,
    playlist_keyword: String,
    playlist_name: String,
}

impl<C: CatalogApi> PlaylistPublisher<C> {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<CatalogAdapter<C>>,
        playlist_keyword: impl Into<String>,
        playlist_name: impl Into<String>,
    ) -> Self {
        Self {
            tracks: TrackService::new(db.clone()),
            accounts: AccountService::new(db),
            catalog,
            playlist_keyword: playlist_keyword.into(),
            playlist_name: playlist_name.into(),
        }
    }

    /// The account's playlist id, finding or creating the playlist and
    /// remembering it on first use.
    pub async fn playlist_for(&self, account: &entities::catalog_account::Model) -> Result<String> {
        if let Some(playlist_id) = &account.playlist_id {
            return Ok(playlist_id.clone());
        }

        let description = format!("Best new tracks from {}", self.playlist_keyword);
        let playlist = self
            .catalog
            .find_or_create_playlist(&self.playlist_keyword, &self.playlist_name, &description)
            .await
            .ok_or_eyre("Could not find or create a playlist in the catalog")?;

        self.accounts.set_playlist(account.id, &playlist.id).await?;
        Ok(playlist.id)
    }

    /// Add the given tracks, or every resolved track when none are given, to
    /// `playlist_id` or else the account's playlist. An explicit playlist is
    /// not remembered on the account.
    pub async fn publish(
        &self,
        account: &entities::catalog_account::Model,
        track_ids: &[i64],
        playlist_id: Option<&str>,
    ) -> Result<PlaylistAddResult> {
        let catalog_ids = self.tracks.resolved_catalog_ids(track_ids).await?;
        if catalog_ids.is_empty() {
            tracing::info!("No resolved tracks to publish");
            return Ok(PlaylistAddResult::default());
        }

        let playlist_id = match playlist_id {
            Some(playlist_id) => playlist_id.to_string(),
            None => self.playlist_for(account).await?,
        };
        let result = self
            .catalog
            .add_to_playlist(&playlist_id, &catalog_ids)
            .await
            .ok_or_eyre("Could not read the playlist from the catalog")?;

        tracing::info!(
            "Published to {}: {} added, {} duplicate, {} failed",
            playlist_id,
            result.added.len(),
            result.duplicate.len(),
            result.failed.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::catalog::{CatalogPlaylist, MockCatalogApi};
    use crate::services::catalog::RetryPolicy;
    use crate::test_utils::{scraped, test_db};
    use std::collections::HashSet;
    use std::time::Duration;

    async fn setup() -> (Arc<Database>, entities::catalog_account::Model, i64) {
        let db = test_db().await;
        let tracks = TrackService::new(db.clone());
        let id = tracks
            .save_if_new(&scraped("Song", &["A"], &[]), "Pitchfork")
            .await
            .unwrap()
            .unwrap();
        tracks.set_resolved(id, "cat-1", None).await.unwrap();
        tracks
            .save_if_new(&scraped("Unresolved", &["A"], &[]), "Pitchfork")
            .await
            .unwrap();

        let account = AccountService::new(db.clone())
            .upsert_account("user-1", None, "token")
            .await
            .unwrap();
        (db, account, id)
    }

    fn publisher(db: Arc<Database>, api: MockCatalogApi) -> PlaylistPublisher<MockCatalogApi> {
        let adapter = CatalogAdapter::new(api, RetryPolicy::new(1, Duration::ZERO));
        PlaylistPublisher::new(db, Arc::new(adapter), "Pitchfork", "Pitchfork Top Tracks")
    }

    #[tokio::test]
    async fn test_publish_creates_and_remembers_playlist() {
        let (db, account, _) = setup().await;

        let mut api = MockCatalogApi::new();
        api.expect_user_playlists().times(1).returning(|| Ok(vec![]));
        api.expect_current_user_id()
            .returning(|| Ok("user-1".into()));
        api.expect_create_playlist().times(1).returning(|_, name, _| {
            Ok(CatalogPlaylist {
                id: "pl".into(),
                name: name.to_string(),
            })
        });
        let mut reads = 0;
        api.expect_playlist_track_ids().times(2).returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(HashSet::new())
            } else {
                Ok(HashSet::from(["cat-1".to_string()]))
            }
        });
        api.expect_add_playlist_items()
            .times(1)
            .returning(|_, _| Ok("snap".into()));

        let result = publisher(db.clone(), api)
            .publish(&account, &[], None)
            .await
            .unwrap();
        assert_eq!(result.added, vec!["cat-1"]);

        let account = AccountService::new(db).resolve(None).await.unwrap();
        assert_eq!(account.playlist_id.as_deref(), Some("pl"));
    }

    #[tokio::test]
    async fn test_publish_existing_playlist_reports_duplicates() {
        let (db, account, id) = setup().await;
        AccountService::new(db.clone())
            .set_playlist(account.id, "pl")
            .await
            .unwrap();
        let account = AccountService::new(db.clone()).resolve(None).await.unwrap();

        let mut api = MockCatalogApi::new();
        api.expect_user_playlists().never();
        api.expect_playlist_track_ids()
            .times(1)
            .returning(|_| Ok(HashSet::from(["cat-1".to_string()])));
        api.expect_add_playlist_items().never();

        let result = publisher(db, api).publish(&account, &[id], None).await.unwrap();
        assert_eq!(result.duplicate, vec!["cat-1"]);
        assert!(result.added.is_empty());
    }

    #[tokio::test]
    async fn test_publish_to_explicit_playlist_skips_lookup() {
        let (db, account, id) = setup().await;

        let mut api = MockCatalogApi::new();
        api.expect_user_playlists().never();
        api.expect_create_playlist().never();
        let mut reads = 0;
        api.expect_playlist_track_ids()
            .withf(|playlist_id| playlist_id == "other")
            .times(2)
            .returning(move |_| {
                reads += 1;
                if reads == 1 {
                    Ok(HashSet::new())
                } else {
                    Ok(HashSet::from(["cat-1".to_string()]))
                }
            });
        api.expect_add_playlist_items()
            .withf(|playlist_id, uris| {
                playlist_id == "other" && uris.to_vec() == vec!["spotify:track:cat-1"]
            })
            .times(1)
            .returning(|_, _| Ok("snap".into()));

        let result = publisher(db.clone(), api)
            .publish(&account, &[id], Some("other"))
            .await
            .unwrap();
        assert_eq!(result.added, vec!["cat-1"]);

        let account = AccountService::new(db).resolve(None).await.unwrap();
        assert!(account.playlist_id.is_none());
    }

    #[tokio::test]
    async fn test_publish_nothing_resolved_is_noop() {
        let (db, account, _) = setup().await;
        let mut api = MockCatalogApi::new();
        api.expect_playlist_track_ids().never();

        // Track 2 exists but has no catalog id
        let result = publisher(db, api).publish(&account, &[2], None).await.unwrap();
        assert_eq!(result, PlaylistAddResult::default());
    }
}
