use std::sync::LazyLock;

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};

use super::{ParseError, ScrapedTrack, normalize_track_name};

const PUBLISHED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

// The newest pick is rendered as a hero, every other entry as a collection
// item. Both carry the same fields under different class names.
static HERO: LazyLock<Selector> = LazyLock::new(|| selector("div.track-hero"));
static COLLECTION_ITEM: LazyLock<Selector> =
    LazyLock::new(|| selector("div.track-collection-item"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector("h2.track-collection-item__title, h2.title"));
static ARTIST: LazyLock<Selector> = LazyLock::new(|| selector("ul.artist-list li"));
static GENRE: LazyLock<Selector> = LazyLock::new(|| selector("li.genre-list__item a"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("a.track-collection-item__track-link, a.artwork"));
static PUBLISHED: LazyLock<Selector> = LazyLock::new(|| selector("time.pub-date"));

/// Parse one listing page. The hero entry (if any) comes first, then the
/// collection items in page order. Elements without a title are skipped.
///
/// A page with no listing elements yields an empty vec, which callers treat as
/// the end of pagination.
pub fn parse_listing(page_html: &[u8]) -> Vec<ScrapedTrack> {
    let html = String::from_utf8_lossy(page_html);
    let document = Html::parse_document(&html);

    let elements = document
        .select(&HERO)
        .chain(document.select(&COLLECTION_ITEM));

    let mut tracks = Vec::new();
    for element in elements {
        match parse_element(element) {
            Ok(track) => tracks.push(track),
            Err(e) => tracing::debug!("Skipping listing element: {}", e),
        }
    }

    tracing::debug!("Parsed {} tracks from listing page", tracks.len());
    tracks
}

fn parse_element(element: ElementRef<'_>) -> Result<ScrapedTrack, ParseError> {
    let title = element
        .select(&TITLE)
        .next()
        .ok_or(ParseError::MissingTitle)?;
    let track_name = normalize_track_name(&element_text(title));

    let mut artists: Vec<String> = element
        .select(&ARTIST)
        .map(element_text)
        .map(|artist| artist.trim().to_string())
        .filter(|artist| !artist.is_empty())
        .collect();
    artists.sort();
    artists.dedup();

    let genres = element
        .select(&GENRE)
        .map(element_text)
        .map(|genre| genre.trim().to_string())
        .filter(|genre| !genre.is_empty())
        .collect();

    let source_link = element
        .select(&LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);

    let published_date = element
        .select(&PUBLISHED)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .and_then(|datetime| match NaiveDateTime::parse_from_str(datetime, PUBLISHED_FORMAT) {
            Ok(parsed) => Some(parsed.date()),
            Err(e) => {
                tracing::warn!("Unparseable publish date {:?}: {}", datetime, e);
                None
            }
        });

    Ok(ScrapedTrack {
        track_name,
        artists,
        genres,
        source_link,
        published_date,
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}
