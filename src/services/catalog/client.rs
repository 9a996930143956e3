use std::collections::HashSet;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::ports::catalog::{
    CatalogApi, CatalogError, CatalogPlaylist, CatalogTrack, MatchCandidate, SearchPage,
};

const API_BASE: &str = "https://api.spotify.com/v1";
const ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

pub const CATALOG_SCOPES: [&str; 4] = [
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
];

const SEARCH_LIMIT: u32 = 50;
/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CatalogCredentials {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl CatalogCredentials {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }
}

/// URL the user visits to grant access. `state` comes back on the callback.
pub fn authorize_url(credentials: &CatalogCredentials, state: &str) -> String {
    format!(
        "{}/authorize?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}&show_dialog=true",
        ACCOUNTS_BASE,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(&credentials.redirect_uri),
        urlencoding::encode(state),
        urlencoding::encode(&CATALOG_SCOPES.join(" "))
    )
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

/// Exchange an authorization code for tokens.
/// https://developer.spotify.com/documentation/web-api/tutorials/code-flow
pub async fn exchange_code(
    http: &reqwest::Client,
    credentials: &CatalogCredentials,
    code: &str,
) -> Result<TokenResponse, CatalogError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", credentials.redirect_uri.as_str()),
    ];
    let response = http
        .post(format!("{}/api/token", ACCOUNTS_BASE))
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&params)
        .send()
        .await?;

    Ok(check_status(response).await?.json().await?)
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn check_status(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CatalogError::RateLimited {
            retry_after: retry_after(response.headers()),
        });
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error text".to_string());
        return Err(CatalogError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Catalog client bound to one account's refresh token.
///
/// The access token is not safe to refresh concurrently, so it sits behind a
/// mutex that is held for the refresh and the request it authorizes.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    credentials: CatalogCredentials,
    refresh_token: String,
    token: Mutex<Option<AccessToken>>,
    timeout: Duration,
}

impl HttpCatalogClient {
    pub fn new(credentials: CatalogCredentials, refresh_token: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            refresh_token,
            token: Mutex::new(None),
            timeout,
        }
    }

    async fn refresh(&self) -> Result<AccessToken, CatalogError> {
        tracing::debug!("Refreshing catalog access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
        ];
        let response = self
            .http
            .post(format!("{}/api/token", ACCOUNTS_BASE))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&params)
            .timeout(self.timeout)
            .send()
            .await?;

        let token: TokenResponse = check_status(response)
            .await
            .map_err(|e| match e {
                CatalogError::Status { status, body } => {
                    CatalogError::Auth(format!("token refresh returned {}: {}", status, body))
                }
                other => other,
            })?
            .json()
            .await?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CatalogError> {
        let response = {
            let mut token = self.token.lock().await;
            let stale = token
                .as_ref()
                .is_none_or(|t| t.expires_at <= Instant::now() + TOKEN_EXPIRY_MARGIN);
            if stale {
                *token = Some(self.refresh().await?);
            }
            let access_token = token
                .as_ref()
                .map(|t| t.value.clone())
                .ok_or_else(|| CatalogError::Auth("no access token".to_string()))?;

            request
                .bearer_auth(access_token)
                .timeout(self.timeout)
                .send()
                .await?
        };

        check_status(response).await
    }

    pub async fn current_profile(&self) -> Result<UserProfile, CatalogError> {
        let response = self.send(self.http.get(format!("{}/me", API_BASE))).await?;
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    // Local files in playlists have no id
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackPaging {
    items: Vec<TrackObject>,
    next: Option<String>,
    offset: u32,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPaging,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemTrack {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<PlaylistItemTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistsResponse {
    items: Vec<PlaylistObject>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    snapshot_id: String,
}

fn match_candidate(track: TrackObject) -> Option<MatchCandidate> {
    Some(MatchCandidate {
        catalog_id: track.id?,
        name: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        preview_url: track.preview_url,
    })
}

fn search_page(response: SearchResponse) -> SearchPage {
    let paging = response.tracks;
    let next_offset = paging.next.as_ref().map(|_| paging.offset + paging.limit);
    SearchPage {
        candidates: paging.items.into_iter().filter_map(match_candidate).collect(),
        next_offset,
    }
}

#[async_trait::async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn search_tracks(&self, query: &str, offset: u32) -> Result<SearchPage, CatalogError> {
        let request = self.http.get(format!("{}/search", API_BASE)).query(&[
            ("q", query.to_string()),
            ("type", "track".to_string()),
            ("limit", SEARCH_LIMIT.to_string()),
            ("offset", offset.to_string()),
        ]);
        let response: SearchResponse = self.send(request).await?.json().await?;
        Ok(search_page(response))
    }

    async fn track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        let url = format!("{}/tracks/{}", API_BASE, urlencoding::encode(track_id));
        let track: TrackObject = self.send(self.http.get(url)).await?.json().await?;
        Ok(CatalogTrack {
            id: track.id.unwrap_or_else(|| track_id.to_string()),
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            preview_url: track.preview_url,
        })
    }

    async fn playlist_track_ids(
        &self,
        playlist_id: &str,
    ) -> Result<HashSet<String>, CatalogError> {
        let mut ids = HashSet::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?fields=items(track(id)),next&limit=100",
            API_BASE,
            urlencoding::encode(playlist_id)
        ));

        while let Some(url) = next_url {
            let page: PlaylistItemsResponse = self.send(self.http.get(&url)).await?.json().await?;
            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|track| track.id)),
            );
            next_url = page.next;
        }

        Ok(ids)
    }

    async fn add_playlist_items(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String, CatalogError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            API_BASE,
            urlencoding::encode(playlist_id)
        );

        let request = self
            .http
            .post(url)
            .json(&serde_json::json!({ "uris": uris }));
        let response: SnapshotResponse = self.send(request).await?.json().await?;
        Ok(response.snapshot_id)
    }

    async fn current_user_id(&self) -> Result<String, CatalogError> {
        Ok(self.current_profile().await?.id)
    }

    async fn user_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError> {
        let mut playlists = Vec::new();
        let mut next_url = Some(format!("{}/me/playlists?limit=50", API_BASE));

        while let Some(url) = next_url {
            let page: PlaylistsResponse = self.send(self.http.get(&url)).await?.json().await?;
            playlists.extend(page.items.into_iter().map(|p| CatalogPlaylist {
                id: p.id,
                name: p.name,
            }));
            next_url = page.next;
        }

        Ok(playlists)
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CatalogPlaylist, CatalogError> {
        let url = format!(
            "{}/users/{}/playlists",
            API_BASE,
            urlencoding::encode(user_id)
        );
        let request = self.http.post(url).json(&serde_json::json!({
            "name": name,
            "public": false,
            "description": description,
        }));
        let playlist: PlaylistObject = self.send(request).await?.json().await?;
        Ok(CatalogPlaylist {
            id: playlist.id,
            name: playlist.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_after_missing_or_garbage() {
        assert_eq!(retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_search_page_from_json() {
        let json = r#"{
            "tracks": {
                "items": [
                    {"id": "t1", "name": "Song", "artists": [{"name": "B"}, {"name": "A"}], "preview_url": "https://p/1"},
                    {"id": null, "name": "Local file", "artists": [], "preview_url": null}
                ],
                "next": "https://api.spotify.com/v1/search?offset=50",
                "offset": 0,
                "limit": 50
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let page = search_page(response);

        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].catalog_id, "t1");
        assert_eq!(page.candidates[0].artists, vec!["B", "A"]);
        assert_eq!(page.candidates[0].preview_url.as_deref(), Some("https://p/1"));
        assert_eq!(page.next_offset, Some(50));
    }

    #[test]
    fn test_last_search_page_has_no_next_offset() {
        let json = r#"{"tracks": {"items": [], "next": null, "offset": 100, "limit": 50}}"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(search_page(response).next_offset, None);
    }

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let credentials = CatalogCredentials::new(
            "client".into(),
            "secret".into(),
            "http://localhost:3000/callback".into(),
        );
        let url = authorize_url(&credentials, "abc123");

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(url.contains("playlist-modify-private"));
        assert!(!url.contains("secret"));
    }
}
