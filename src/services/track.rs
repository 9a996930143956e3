use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use color_eyre::{
    Result,
    eyre::{OptionExt, WrapErr},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
    sea_query::{Expr, ExprTrait, Func, LikeExpr, Query},
};
use serde::Serialize;

use crate::database::Database;
use crate::entities;
use crate::scrape::{ScrapedTrack, normalize_track_name};

const KEY_FIELD_SEPARATOR: char = '\u{1f}';
const KEY_ITEM_SEPARATOR: char = '\u{1e}';

/// A persisted track with its artist and genre names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredTrack {
    pub id: i64,
    pub name: String,
    pub site: String,
    /// Sorted ascending.
    pub artists: Vec<String>,
    /// Sorted ascending.
    pub genres: Vec<String>,
    pub source_link: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub resolved_catalog_id: Option<String>,
    pub preview_url: Option<String>,
}

impl StoredTrack {
    /// First artist in sorted order, used as the catalog search hint.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// Lowercased, normalized form of a name search.
fn name_needle(name: &str) -> String {
    normalize_track_name(name).to_lowercase()
}

/// `%needle%` with LIKE wildcards in the needle escaped by `\`.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Filter for [`TrackService::query_tracks`]. Artist and genre filters require
/// every listed name to be attached to the track.
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub site: Option<String>,
    /// Case-insensitive substring of the normalized name.
    pub name: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Identity of a scraped track: site, name, artist set and genre set.
///
/// Artists and genres are sorted and deduplicated so ordering on the page does
/// not matter.
pub fn dedup_key(site: &str, track: &ScrapedTrack) -> String {
    let join = |items: &[String]| {
        let set: BTreeSet<&str> = items.iter().map(String::as_str).collect();
        set.into_iter()
            .collect::<Vec<_>>()
            .join(&KEY_ITEM_SEPARATOR.to_string())
    };

    [
        site.to_string(),
        track.track_name.clone(),
        join(&track.artists),
        join(&track.genres),
    ]
    .join(&KEY_FIELD_SEPARATOR.to_string())
}

pub struct TrackService {
    db: Arc<Database>,
}

impl TrackService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn ensure_site(&self, site: &str) -> Result<()> {
        insert_site_if_missing(&self.db.conn, site).await
    }

    /// Persist a scraped track unless an identical one is already stored.
    ///
    /// Returns the new track id, or `None` when the track is a duplicate. The
    /// check, the lazily created artists/genres, the track and its join rows
    /// are written in one transaction.
    pub async fn save_if_new(&self, track: &ScrapedTrack, site: &str) -> Result<Option<i64>> {
        let key = dedup_key(site, track);

        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to begin transaction")?;

        if let Some(existing) = entities::track::Entity::find()
            .filter(entities::track::Column::DedupKey.eq(&key))
            .one(&txn)
            .await
            .wrap_err("Failed to look up track")?
        {
            tracing::debug!(
                "Track '{}' already stored as {}",
                track.track_name,
                existing.id
            );
            return Ok(None);
        }

        insert_site_if_missing(&txn, site).await?;

        let artists: BTreeSet<&str> = track.artists.iter().map(String::as_str).collect();
        let genres: BTreeSet<&str> = track.genres.iter().map(String::as_str).collect();

        for artist in &artists {
            insert_artist_if_missing(&txn, artist).await?;
        }
        for genre in &genres {
            insert_genre_if_missing(&txn, genre).await?;
        }

        let model = entities::track::ActiveModel {
            name: Set(track.track_name.clone()),
            site_name: Set(site.to_string()),
            source_link: Set(track.source_link.clone()),
            published_date: Set(track.published_date),
            resolved_catalog_id: Set(None),
            preview_url: Set(None),
            dedup_key: Set(key),
            created_at: Set(chrono::Utc::now().timestamp()),
            ..Default::default()
        };

        let saved = match model.insert(&txn).await {
            Ok(saved) => saved,
            // Another writer stored the same track since the lookup
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                tracing::debug!("Track '{}' stored concurrently", track.track_name);
                return Ok(None);
            }
            Err(e) => return Err(e).wrap_err("Failed to insert track"),
        };

        for artist in artists {
            entities::track_artist::Entity::insert(entities::track_artist::ActiveModel {
                track_id: Set(saved.id),
                artist_name: Set(artist.to_string()),
            })
            .exec_without_returning(&txn)
            .await
            .wrap_err("Failed to link track artist")?;
        }
        for genre in genres {
            entities::track_genre::Entity::insert(entities::track_genre::ActiveModel {
                track_id: Set(saved.id),
                genre_name: Set(genre.to_string()),
            })
            .exec_without_returning(&txn)
            .await
            .wrap_err("Failed to link track genre")?;
        }

        txn.commit()
            .await
            .wrap_err("Failed to commit transaction")?;

        tracing::info!(
            "Saved track '{}' by {} as {}",
            saved.name,
            track.artists.join(", "),
            saved.id
        );
        Ok(Some(saved.id))
    }

    pub async fn get_track(&self, track_id: i64) -> Result<Option<StoredTrack>> {
        let Some(track) = entities::track::Entity::find_by_id(track_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch track")?
        else {
            return Ok(None);
        };

        Ok(Some(self.hydrate(track).await?))
    }

    /// Stored tracks matching the filter, newest first.
    pub async fn query_tracks(&self, filter: &TrackFilter) -> Result<Vec<StoredTrack>> {
        let mut query = entities::track::Entity::find();

        if let Some(site) = &filter.site {
            query = query.filter(entities::track::Column::SiteName.eq(site.as_str()));
        }
        if let Some(name) = &filter.name {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(entities::track::Column::Name)))
                    .like(LikeExpr::new(contains_pattern(&name_needle(name))).escape('\\')),
            );
        }
        for artist in &filter.artists {
            query = query.filter(
                entities::track::Column::Id.in_subquery(
                    Query::select()
                        .column(entities::track_artist::Column::TrackId)
                        .from(entities::track_artist::Entity)
                        .and_where(entities::track_artist::Column::ArtistName.eq(artist.as_str()))
                        .to_owned(),
                ),
            );
        }
        for genre in &filter.genres {
            query = query.filter(
                entities::track::Column::Id.in_subquery(
                    Query::select()
                        .column(entities::track_genre::Column::TrackId)
                        .from(entities::track_genre::Entity)
                        .and_where(entities::track_genre::Column::GenreName.eq(genre.as_str()))
                        .to_owned(),
                ),
            );
        }

        let tracks = query
            .order_by_desc(entities::track::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to query tracks")?;

        self.hydrate_all(tracks).await
    }

    /// Tracks without a catalog id, oldest first.
    pub async fn list_unresolved(&self, limit: Option<u64>) -> Result<Vec<StoredTrack>> {
        let tracks = entities::track::Entity::find()
            .filter(entities::track::Column::ResolvedCatalogId.is_null())
            .order_by_asc(entities::track::Column::Id)
            .limit(limit)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to list unresolved tracks")?;

        self.hydrate_all(tracks).await
    }

    pub async fn set_resolved(
        &self,
        track_id: i64,
        catalog_id: &str,
        preview_url: Option<&str>,
    ) -> Result<()> {
        let track = entities::track::Entity::find_by_id(track_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch track")?
            .ok_or_eyre(format!("Track {} not found", track_id))?;

        let mut model: entities::track::ActiveModel = track.into();
        model.resolved_catalog_id = Set(Some(catalog_id.to_string()));
        model.preview_url = Set(preview_url.map(str::to_string));
        model
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update track catalog id")?;

        tracing::debug!("Track {} resolved to {}", track_id, catalog_id);
        Ok(())
    }

    /// Catalog ids of the given tracks, or of every resolved track when no ids
    /// are given. Unresolved tracks are skipped.
    pub async fn resolved_catalog_ids(&self, track_ids: &[i64]) -> Result<BTreeSet<String>> {
        let mut query = entities::track::Entity::find()
            .filter(entities::track::Column::ResolvedCatalogId.is_not_null());
        if !track_ids.is_empty() {
            query = query.filter(entities::track::Column::Id.is_in(track_ids.iter().copied()));
        }

        let tracks = query
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch resolved tracks")?;

        Ok(tracks
            .into_iter()
            .filter_map(|track| track.resolved_catalog_id)
            .collect())
    }

    async fn hydrate_all(&self, tracks: Vec<entities::track::Model>) -> Result<Vec<StoredTrack>> {
        let mut result = Vec::with_capacity(tracks.len());
        for track in tracks {
            result.push(self.hydrate(track).await?);
        }
        Ok(result)
    }

    async fn hydrate(&self, track: entities::track::Model) -> Result<StoredTrack> {
        let artists = entities::track_artist::Entity::find()
            .filter(entities::track_artist::Column::TrackId.eq(track.id))
            .order_by_asc(entities::track_artist::Column::ArtistName)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch track artists")?
            .into_iter()
            .map(|row| row.artist_name)
            .collect();

        let genres = entities::track_genre::Entity::find()
            .filter(entities::track_genre::Column::TrackId.eq(track.id))
            .order_by_asc(entities::track_genre::Column::GenreName)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch track genres")?
            .into_iter()
            .map(|row| row.genre_name)
            .collect();

        Ok(StoredTrack {
            id: track.id,
            name: track.name,
            site: track.site_name,
            artists,
            genres,
            source_link: track.source_link,
            published_date: track.published_date,
            resolved_catalog_id: track.resolved_catalog_id,
            preview_url: track.preview_url,
        })
    }
}

async fn insert_site_if_missing(conn: &impl ConnectionTrait, name: &str) -> Result<()> {
    if entities::site::Entity::find_by_id(name.to_string())
        .one(conn)
        .await
        .wrap_err("Failed to look up site")?
        .is_none()
    {
        entities::site::Entity::insert(entities::site::ActiveModel {
            name: Set(name.to_string()),
        })
        .exec_without_returning(conn)
        .await
        .wrap_err("Failed to create site")?;
    }
    Ok(())
}

async fn insert_artist_if_missing(conn: &impl ConnectionTrait, name: &str) -> Result<()> {
    if entities::artist::Entity::find_by_id(name.to_string())
        .one(conn)
        .await
        .wrap_err("Failed to look up artist")?
        .is_none()
    {
        tracing::debug!("Creating artist '{}'", name);
        entities::artist::Entity::insert(entities::artist::ActiveModel {
            name: Set(name.to_string()),
        })
        .exec_without_returning(conn)
        .await
        .wrap_err("Failed to create artist")?;
    }
    Ok(())
}

async fn insert_genre_if_missing(conn: &impl ConnectionTrait, name: &str) -> Result<()> {
    if entities::genre::Entity::find_by_id(name.to_string())
        .one(conn)
        .await
        .wrap_err("Failed to look up genre")?
        .is_none()
    {
        entities::genre::Entity::insert(entities::genre::ActiveModel {
            name: Set(name.to_string()),
        })
        .exec_without_returning(conn)
        .await
        .wrap_err("Failed to create genre")?;
    }
    Ok(())
}
