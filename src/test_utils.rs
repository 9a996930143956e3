use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database as SeaDatabase};

use crate::database::Database;
use crate::scrape::ScrapedTrack;

pub async fn test_db() -> Arc<Database> {
    let conn = SeaDatabase::connect("sqlite::memory:?mode=rwc")
        .await
        .unwrap();

    conn.execute_unprepared("PRAGMA foreign_keys = ON")
        .await
        .unwrap();

    let schema = include_str!("../schema.sql");
    for stmt in schema.split(';') {
        // Strip comment-only lines
        let sql = stmt
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let sql = sql.trim();
        if sql.is_empty() {
            continue;
        }
        conn.execute_unprepared(sql)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute SQL: {}\nStatement: {}", e, sql));
    }

    Arc::new(Database { conn })
}

/// A scraped track with sorted artists, no link and no date.
pub fn scraped(name: &str, artists: &[&str], genres: &[&str]) -> ScrapedTrack {
    let mut artists: Vec<String> = artists.iter().map(|a| a.to_string()).collect();
    artists.sort();
    artists.dedup();
    ScrapedTrack {
        track_name: name.to_string(),
        artists,
        genres: genres.iter().map(|g| g.to_string()).collect(),
        source_link: None,
        published_date: None,
    }
}

/// A listing page of collection items, each `(title, artists)`.
pub fn listing_page(items: &[(&str, &[&str])]) -> Vec<u8> {
    let body: String = items
        .iter()
        .map(|(title, artists)| {
            let artists: String = artists.iter().map(|a| format!("<li>{a}</li>")).collect();
            format!(
                r#"<div class="track-collection-item">
                    <ul class="artist-list">{artists}</ul>
                    <h2 class="track-collection-item__title">{title}</h2>
                </div>"#
            )
        })
        .collect();
    format!("<html><body>{body}</body></html>").into_bytes()
}
