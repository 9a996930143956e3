use std::time::Duration;

use url::Url;

use super::FetchError;

/// Where listing pages come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one listing page (1-indexed) and return its raw HTML.
    async fn fetch_page(&self, page: u32) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `<listing_url>?page=<n>` over HTTP.
pub struct HttpListingSource {
    client: reqwest::Client,
    listing_url: Url,
    timeout: Duration,
}

impl HttpListingSource {
    pub fn new(listing_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            listing_url: Url::parse(listing_url)?,
            timeout,
        })
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.listing_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }
}

#[async_trait::async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<u8>, FetchError> {
        let url = self.page_url(page);
        tracing::debug!("Fetching listing page {}: {}", page, url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Request { page, source })?;

        // Anything other than a plain 200 means the listing has run out
        if response.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                page,
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request { page, source })?;
        Ok(body.to_vec())
    }
}
