//! YouTube Data API v3 client.
//!
//! Three endpoints are consumed: `playlists.list` (paginated), on
//! `playlistItems.list` (paginated), and `playlistItems.delete`. Responses
//! are modeled as explicit typed records so a schema surprise fails at the
//! deserialization boundary instead of deep in run logic.
//!
//! Pagination follows the `nextPageToken` contract: a response carrying a
//! token means more pages exist; its absence signals the final page. Listing
//! is bounded by [`MAX_PAGES`] so a provider that never stops paginating
//! becomes a detectable fatal error rather than an infinite loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::error::{Error, Result};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Items requested per page, the API maximum.
const PAGE_SIZE: u32 = 50;

/// Hard ceiling on pages fetched for a single listing.
pub const MAX_PAGES: usize = 100;

/// Per-request timeout; a hung call surfaces as a retryable failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

// =============================================================================
// Wire records
// =============================================================================

/// A playlist owned by the authenticated account.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    /// Opaque stable playlist identifier.
    pub id: String,
    /// Basic details about the playlist.
    pub snippet: PlaylistSnippet,
}

impl Playlist {
    /// The playlist's title, the join key against the configuration.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.snippet.title
    }
}

/// The snippet object of a playlist resource.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaylistSnippet {
    /// The playlist's title.
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistListResponse {
    #[serde(default)]
    items: Vec<Playlist>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// A membership record inside a playlist.
///
/// The entry's own `id` is what deletion targets; the referenced video lives
/// under `snippet.resourceId.videoId`, not at the item's top level.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaylistItem {
    /// The entry's identifier, distinct from the video it references.
    pub id: String,
    /// Basic details, including the referenced video.
    pub snippet: PlaylistItemSnippet,
}

/// The snippet object of a playlist item resource.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaylistItemSnippet {
    /// Reference to the resource the entry points at.
    #[serde(rename = "resourceId")]
    pub resource_id: ResourceId,
}

/// The resource a playlist item points at.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResourceId {
    /// The referenced video's identifier.
    #[serde(rename = "videoId")]
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

// =============================================================================
// Resolved playlist state
// =============================================================================

/// Resolved contents of one playlist: entry ids for deletion and video ids
/// for download, index-aligned.
///
/// Position `i` in both sequences refers to the same remote membership
/// record. The equal-length invariant holds by construction: the only way to
/// add data is [`PlaylistContents::push`], which takes both ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistContents {
    entry_ids: Vec<String>,
    video_ids: Vec<String>,
}

impl PlaylistContents {
    /// Create an empty contents record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entry_ids: Vec::new(),
            video_ids: Vec::new(),
        }
    }

    /// Record one membership: the entry id and the video it references.
    pub fn push(&mut self, entry_id: String, video_id: String) {
        self.entry_ids.push(entry_id);
        self.video_ids.push(video_id);
    }

    /// Entry identifiers, in remote response order.
    #[must_use]
    pub fn entry_ids(&self) -> &[String] {
        &self.entry_ids
    }

    /// Video identifiers, index-aligned with [`Self::entry_ids`].
    #[must_use]
    pub fn video_ids(&self) -> &[String] {
        &self.video_ids
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry_ids.len()
    }

    /// Whether the playlist resolved to zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_ids.is_empty()
    }
}

impl FromIterator<PlaylistItem> for PlaylistContents {
    fn from_iter<I: IntoIterator<Item = PlaylistItem>>(iter: I) -> Self {
        let mut contents = Self::new();
        for item in iter {
            contents.push(item.id, item.snippet.resource_id.video_id);
        }
        contents
    }
}

// =============================================================================
// Service trait
// =============================================================================

/// Remote playlist operations consumed by the run coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistService: Send + Sync {
    /// List all playlists owned by the authenticated account, across all
    /// pages, in remote response order. Name filtering happens client-side.
    async fn list_playlists(&self) -> Result<Vec<Playlist>>;

    /// Resolve one playlist's entries into index-aligned entry/video ids.
    async fn list_entries(&self, playlist_id: &str) -> Result<PlaylistContents>;

    /// Delete a single playlist entry by its entry id (not its video id).
    async fn delete_entry(&self, entry_id: &str) -> Result<()>;
}

// =============================================================================
// Pagination
// =============================================================================

/// Accumulate items across pages of a listing endpoint.
///
/// `fetch_page` is called with `None` for the first page and with the
/// previous response's continuation token afterwards, until a page carries no
/// token. More than [`MAX_PAGES`] pages is a fatal [`Error::RunawayPagination`].
pub async fn collect_pages<T, F, Fut>(context: &str, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    for page in 1..=MAX_PAGES {
        let (mut page_items, next_token) = fetch_page(page_token.take()).await?;
        items.append(&mut page_items);

        match next_token {
            Some(token) => {
                debug!("{context}: page {page} has a continuation token");
                page_token = Some(token);
            }
            None => {
                debug!("{context}: page {page} is the last page ({} items total)", items.len());
                return Ok(items);
            }
        }
    }

    Err(Error::RunawayPagination {
        context: context.to_string(),
        max_pages: MAX_PAGES,
    })
}

// =============================================================================
// HTTP client
// =============================================================================

/// YouTube Data API client backed by an [`Authenticator`].
pub struct YouTubeApi {
    http: reqwest::Client,
    auth: Authenticator,
}

impl YouTubeApi {
    /// Create a client with per-request timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(auth: Authenticator) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, auth })
    }

    async fn fetch_playlists_page(
        &self,
        page_token: Option<String>,
    ) -> Result<(Vec<Playlist>, Option<String>)> {
        let mut query = vec![
            ("part", "id,snippet".to_string()),
            ("mine", "true".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let url = format!("{API_BASE}/playlists");
        let response = self.execute(Method::GET, &url, &query).await?;
        let page: PlaylistListResponse = response.json().await?;

        Ok((page.items, page.next_page_token))
    }

    async fn fetch_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<String>,
    ) -> Result<(Vec<PlaylistItem>, Option<String>)> {
        let mut query = vec![
            ("part", "id,snippet".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let url = format!("{API_BASE}/playlistItems");
        let response = self.execute(Method::GET, &url, &query).await?;
        let page: PlaylistItemListResponse = response.json().await?;

        Ok((page.items, page.next_page_token))
    }

    /// Issue one authenticated request, retrying transient failures.
    ///
    /// Transient means a connect/timeout error or an HTTP 429/5xx; anything
    /// else propagates immediately.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            match self.try_once(method.clone(), url, query).await {
                Ok(response) => return Ok(response),
                Err((err, true)) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "Transient API failure (attempt {attempt}/{MAX_ATTEMPTS}): {err}; retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }

    async fn try_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<reqwest::Response, (Error, bool)> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| (e, false))?;

        let response = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                let transient = e.is_timeout() || e.is_connect();
                (Error::Http(e), transient)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let transient = status.as_u16() == 429 || status.is_server_error();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        Err((
            Error::Api {
                status: status.as_u16(),
                message,
            },
            transient,
        ))
    }
}

#[async_trait]
impl PlaylistService for YouTubeApi {
    async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        collect_pages("playlists.list", |token| self.fetch_playlists_page(token)).await
    }

    async fn list_entries(&self, playlist_id: &str) -> Result<PlaylistContents> {
        let items = collect_pages("playlistItems.list", |token| {
            self.fetch_items_page(playlist_id, token)
        })
        .await?;

        Ok(items.into_iter().collect())
    }

    async fn delete_entry(&self, entry_id: &str) -> Result<()> {
        let url = format!("{API_BASE}/playlistItems");
        let query = vec![("id", entry_id.to_string())];
        self.execute(Method::DELETE, &url, &query).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_playlist_deserialization() {
        let json = r#"{
            "items": [
                {"id": "PL1", "snippet": {"title": "Watch Later"}},
                {"id": "PL2", "snippet": {"title": "Lectures"}}
            ],
            "nextPageToken": "CAUQAA"
        }"#;

        let response: PlaylistListResponse = serde_json::from_str(json).expect("Should parse");
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.items[0].title(), "Watch Later");
        assert_eq!(response.next_page_token.as_deref(), Some("CAUQAA"));
    }

    #[test]
    fn test_playlist_item_video_id_is_nested_under_resource_id() {
        let json = r#"{
            "items": [
                {
                    "id": "entry-1",
                    "snippet": {
                        "title": "Some video",
                        "resourceId": {"kind": "youtube#video", "videoId": "abc123"}
                    }
                }
            ]
        }"#;

        let response: PlaylistItemListResponse =
            serde_json::from_str(json).expect("Should parse");
        assert_eq!(response.items[0].id, "entry-1");
        assert_eq!(response.items[0].snippet.resource_id.video_id, "abc123");
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_missing_required_field_fails_at_boundary() {
        // An item without snippet.resourceId must fail deserialization, not
        // surface as a lookup error later.
        let json = r#"{"items": [{"id": "entry-1", "snippet": {}}]}"#;
        let result: std::result::Result<PlaylistItemListResponse, _> =
            serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_contents_sequences_stay_aligned() {
        let mut contents = PlaylistContents::new();
        assert!(contents.is_empty());

        contents.push("entry-1".to_string(), "vid-1".to_string());
        contents.push("entry-2".to_string(), "vid-2".to_string());

        assert_eq!(contents.len(), 2);
        assert_eq!(contents.entry_ids().len(), contents.video_ids().len());
        assert_eq!(contents.entry_ids()[1], "entry-2");
        assert_eq!(contents.video_ids()[1], "vid-2");
    }

    #[test]
    fn test_contents_from_items() {
        let items = vec![
            PlaylistItem {
                id: "e1".to_string(),
                snippet: PlaylistItemSnippet {
                    resource_id: ResourceId {
                        video_id: "v1".to_string(),
                    },
                },
            },
            PlaylistItem {
                id: "e2".to_string(),
                snippet: PlaylistItemSnippet {
                    resource_id: ResourceId {
                        video_id: "v2".to_string(),
                    },
                },
            },
        ];

        let contents: PlaylistContents = items.into_iter().collect();
        assert_eq!(contents.entry_ids(), &["e1".to_string(), "e2".to_string()]);
        assert_eq!(contents.video_ids(), &["v1".to_string(), "v2".to_string()]);
    }

    #[tokio::test]
    async fn test_collect_pages_issues_one_request_per_page() {
        let calls = AtomicUsize::new(0);

        let items = collect_pages("test", |token| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match call {
                    0 => {
                        assert!(token.is_none());
                        Ok((vec![1, 2], Some("t1".to_string())))
                    }
                    1 => {
                        assert_eq!(token.as_deref(), Some("t1"));
                        Ok((vec![3], Some("t2".to_string())))
                    }
                    _ => {
                        assert_eq!(token.as_deref(), Some("t2"));
                        Ok((vec![4, 5], None))
                    }
                }
            }
        })
        .await
        .expect("Should collect");

        // Exactly 3 requests, items concatenated in response order.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_collect_pages_single_page() {
        let items =
            collect_pages("test", |_| async { Ok((vec!["only"], None)) })
                .await
                .expect("Should collect");
        assert_eq!(items, vec!["only"]);
    }

    #[tokio::test]
    async fn test_collect_pages_empty_page() {
        let items: Vec<u8> = collect_pages("test", |_| async { Ok((Vec::new(), None)) })
            .await
            .expect("Should collect");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_collect_pages_runaway_is_fatal() {
        let calls = AtomicUsize::new(0);

        let result: Result<Vec<u8>> = collect_pages("endless", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok((vec![0], Some("again".to_string()))) }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::RunawayPagination { max_pages, .. }) if max_pages == MAX_PAGES
        ));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_PAGES);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_mid_sequence_error() {
        let calls = AtomicUsize::new(0);

        let result: Result<Vec<u8>> = collect_pages("flaky", |_| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Ok((vec![1], Some("next".to_string())))
                } else {
                    Err(Error::Api {
                        status: 500,
                        message: "backend error".to_string(),
                    })
                }
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Api { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
