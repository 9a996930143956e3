//! Scraping the "best new tracks" listing: fetching pages, parsing them into
//! [`ScrapedTrack`] records, and normalizing titles.

pub mod normalize;
pub mod parser;
pub mod source;

use chrono::NaiveDate;
use serde::Serialize;

pub use normalize::normalize_track_name;
pub use parser::parse_listing;
pub use source::{HttpListingSource, ListingSource};

/// One listing entry as it appears on the page, after title normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedTrack {
    pub track_name: String,
    /// Sorted ascending, without duplicates.
    pub artists: Vec<String>,
    /// Page order. Compared as a set.
    pub genres: Vec<String>,
    pub source_link: Option<String>,
    pub published_date: Option<NaiveDate>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Listing element has no title")]
    MissingTitle,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Listing page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },
    #[error("Failed to fetch listing page {page}: {source}")]
    Request {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}
