use std::sync::Arc;

use color_eyre::Result;
use futures::{StreamExt, stream};
use serde::Serialize;

use crate::database::Database;
use crate::ports::catalog::CatalogApi;
use crate::scrape::{ListingSource, ScrapedTrack, parse_listing};
use crate::services::resolve::TrackResolver;
use crate::services::track::{StoredTrack, TrackService};

/// Upper bound on pages per resync, the listing has nothing past it.
pub const MAX_PAGES: u32 = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub pages_scanned: u32,
    pub new_tracks: usize,
    pub resolved: usize,
}

/// Scrapes the listing, stores new tracks and, when a catalog account is
/// available, resolves them.
pub struct ResyncService<S: ListingSource, C: CatalogApi> {
    source: S,
    tracks: TrackService,
    resolver: Option<TrackResolver<C>>,
    site: String,
    fetch_workers: usize,
}

impl<S: ListingSource, C: CatalogApi> ResyncService<S, C> {
    pub fn new(
        db: Arc<Database>,
        source: S,
        resolver: Option<TrackResolver<C>>,
        site: impl Into<String>,
        fetch_workers: usize,
    ) -> Self {
        Self {
            source,
            tracks: TrackService::new(db),
            resolver,
            site: site.into(),
            fetch_workers: fetch_workers.clamp(1, MAX_PAGES as usize),
        }
    }

    /// Walk the listing from page 1 up to `max_pages`.
    ///
    /// Pages are fetched `fetch_workers` at a time and handled in page order,
    /// newest first. The first page that fails to load or has no tracks ends
    /// the walk. Errors on single tracks are logged and skipped.
    #[tracing::instrument(skip(self), fields(site = %self.site))]
    pub async fn resync(&self, max_pages: u32) -> Result<ResyncReport> {
        let max_pages = max_pages.min(MAX_PAGES);
        self.tracks.ensure_site(&self.site).await?;

        let mut report = ResyncReport::default();
        let mut next_page = 1;

        let window = u32::try_from(self.fetch_workers).unwrap_or(MAX_PAGES);

        'pages: while next_page <= max_pages {
            let window_end = next_page.saturating_add(window - 1).min(max_pages);

            let fetched: Vec<_> = stream::iter(next_page..=window_end)
                .map(|page| async move { (page, self.source.fetch_page(page).await) })
                .buffered(self.fetch_workers)
                .collect()
                .await;

            for (page, result) in fetched {
                let html = match result {
                    Ok(html) => html,
                    Err(e) => {
                        tracing::info!("Stopping at page {}: {}", page, e);
                        break 'pages;
                    }
                };

                let scraped = parse_listing(&html);
                if scraped.is_empty() {
                    tracing::info!("Page {} has no tracks, stopping", page);
                    break 'pages;
                }

                tracing::debug!("Page {} has {} tracks", page, scraped.len());
                report.pages_scanned += 1;
                for track in &scraped {
                    self.process(track, &mut report).await;
                }
            }

            next_page = window_end + 1;
        }

        tracing::info!(
            "Resync finished: {} pages, {} new tracks, {} resolved",
            report.pages_scanned,
            report.new_tracks,
            report.resolved
        );
        Ok(report)
    }

    /// Only look at the newest listing entry. Returns the stored track when
    /// it was new, after a resolution attempt.
    #[tracing::instrument(skip(self), fields(site = %self.site))]
    pub async fn check_newest(&self) -> Result<Option<StoredTrack>> {
        self.tracks.ensure_site(&self.site).await?;

        let html = match self.source.fetch_page(1).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Could not load the newest listing page: {}", e);
                return Ok(None);
            }
        };

        let Some(newest) = parse_listing(&html).into_iter().next() else {
            tracing::warn!("Newest listing page has no tracks");
            return Ok(None);
        };

        let Some(track_id) = self.tracks.save_if_new(&newest, &self.site).await? else {
            tracing::info!("Newest track '{}' is already stored", newest.track_name);
            return Ok(None);
        };

        self.resolve(track_id).await;
        self.tracks.get_track(track_id).await
    }

    async fn process(&self, track: &ScrapedTrack, report: &mut ResyncReport) {
        let track_id = match self.tracks.save_if_new(track, &self.site).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Failed to save track '{}': {:?}", track.track_name, e);
                return;
            }
        };
        report.new_tracks += 1;

        if self.resolve(track_id).await {
            report.resolved += 1;
        }
    }

    async fn resolve(&self, track_id: i64) -> bool {
        let Some(resolver) = &self.resolver else {
            return false;
        };
        match resolver.resolve_by_id(track_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::error!("Failed to resolve track {}: {:?}", track_id, e);
                false
            }
        }
    }
}
