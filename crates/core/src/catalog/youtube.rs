//! YouTube Data API v3 playlist client.
//!
//! Pages through `playlistItems.list` 50 records at a time until the server
//! stops returning a `nextPageToken`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::types::{PlaylistItem, PlaylistItemsResponse};
use super::{CatalogError, PlaylistCatalog};
use crate::config::CatalogConfig;
use crate::error_log::ErrorLog;
use crate::metrics;
use crate::progress::{ProgressEvent, ProgressHandle};

/// Maximum page size accepted by the API.
const PAGE_SIZE: u32 = 50;

/// Longest slice of an unparseable error body kept in the error message.
const MAX_ERROR_BODY: usize = 512;

/// YouTube playlist catalog client.
pub struct YoutubeCatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
    progress: ProgressHandle,
}

impl YoutubeCatalogClient {
    /// Create a new client.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        if config.api_key.is_empty() {
            return Err(CatalogError::NotConfigured(
                "YouTube API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            progress: ProgressHandle::disabled(),
        })
    }

    /// Report fetched pages through `progress`.
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    async fn fetch_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemsResponse, CatalogError> {
        let url = format!("{}/playlistItems", self.base_url);

        debug!(
            "Catalog page request: playlist={}, page_token={:?}",
            playlist_id, page_token
        );

        let page_size = PAGE_SIZE.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("part", "id,snippet"),
            ("playlistId", playlist_id),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        query.push(("key", self.api_key.as_str()));

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<PlaylistItemsResponse>(&body) {
            Ok(page) if status.is_success() || page.error.is_some() => Ok(page),
            Ok(_) => Err(CatalogError::Api {
                status: status.as_u16(),
                message: truncate(&body),
            }),
            Err(_) if !status.is_success() => Err(CatalogError::Api {
                status: status.as_u16(),
                message: truncate(&body),
            }),
            Err(e) => Err(CatalogError::MalformedResponse(format!(
                "Failed to parse playlist page: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl PlaylistCatalog for YoutubeCatalogClient {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        errors: &ErrorLog,
    ) -> Result<Vec<PlaylistItem>, CatalogError> {
        let mut items = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut entry_number = 0usize;
        let mut page_number = 0u32;

        loop {
            let page = match self.fetch_page(playlist_id, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    metrics::CATALOG_ERRORS.with_label_values(&[e.kind()]).inc();
                    return Err(e);
                }
            };
            page_number += 1;
            metrics::CATALOG_PAGES.inc();

            if let Some(error) = &page.error {
                warn!(
                    "Catalog reported error for playlist {}: {} {}",
                    playlist_id, error.code, error.message
                );
                metrics::CATALOG_ERRORS.with_label_values(&["api"]).inc();
                errors
                    .push(format!("Catalog error {}: {}", error.code, error.message))
                    .await;
            }

            let next = page.next_token().map(str::to_string);

            for entry in page.items {
                entry_number += 1;
                match entry.into_item() {
                    Ok(item) => items.push(item),
                    Err(reason) => {
                        debug!("Skipping playlist entry {}: {}", entry_number, reason);
                        metrics::CATALOG_ERRORS
                            .with_label_values(&["skipped_entry"])
                            .inc();
                        errors
                            .push(format!("Skipping playlist entry {}: {}", entry_number, reason))
                            .await;
                    }
                }
            }

            self.progress.emit(ProgressEvent::PageFetched {
                page: page_number,
                items: items.len(),
            });

            match next {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        metrics::CATALOG_ERRORS.with_label_values(&["malformed"]).inc();
                        return Err(CatalogError::MalformedResponse(format!(
                            "page token '{}' repeated",
                            token
                        )));
                    }
                    page_token = Some(token);
                }
                None => break,
            }
        }

        metrics::CATALOG_ITEMS.inc_by(items.len() as u64);
        info!(
            "Playlist {} enumerated: {} items in {} pages",
            playlist_id,
            items.len(),
            page_number
        );

        Ok(items)
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> YoutubeCatalogClient {
        YoutubeCatalogClient::new(&CatalogConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn entry(author: &str, title: &str, id: &str) -> serde_json::Value {
        json!({
            "snippet": {
                "title": title,
                "videoOwnerChannelTitle": author,
                "resourceId": { "kind": "youtube#video", "videoId": id }
            }
        })
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = YoutubeCatalogClient::new(&CatalogConfig::default());
        assert!(matches!(result, Err(CatalogError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_follows_page_tokens_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("part", "id,snippet"))
            .and(query_param("playlistId", "PL1"))
            .and(query_param("maxResults", "50"))
            .and(query_param("key", "test-key"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry("A", "One", "id1"), entry("B", "Two", "id2")],
                "nextPageToken": "page2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("pageToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry("C", "Three", "id3")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let errors = ErrorLog::new();
        let items = client_for(&server)
            .list_playlist_items("PL1", &errors)
            .await
            .unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["id1", "id2", "id3"]);
        assert_eq!(items[2], PlaylistItem::new("C", "Three", "id3"));
        assert!(errors.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_next_token_stops_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [entry("A", "One", "id1")],
                "nextPageToken": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = client_for(&server)
            .list_playlist_items("PL1", &ErrorLog::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_token_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [],
                "nextPageToken": "same"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .list_playlist_items("PL1", &ErrorLog::new())
            .await;
        assert!(matches!(result, Err(CatalogError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_server_error_object_goes_to_error_log() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "The request cannot be completed because you have exceeded your quota." }
            })))
            .mount(&server)
            .await;

        let errors = ErrorLog::new();
        let items = client_for(&server)
            .list_playlist_items("PL1", &errors)
            .await
            .unwrap();

        assert!(items.is_empty());
        let entries = errors.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("Catalog error 403: The request cannot be completed"));
    }

    #[tokio::test]
    async fn test_unprojectable_entries_are_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    entry("A", "One", "id1"),
                    { "snippet": { "title": "Private video", "resourceId": { "videoId": "priv" } } },
                    entry("C", "Three", "id3")
                ]
            })))
            .mount(&server)
            .await;

        let errors = ErrorLog::new();
        let items = client_for(&server)
            .list_playlist_items("PL1", &errors)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        let entries = errors.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("Skipping playlist entry 2:"));
        assert!(entries[0].contains("priv"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .list_playlist_items("PL1", &ErrorLog::new())
            .await;
        assert!(matches!(result, Err(CatalogError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_unparseable_error_status_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .list_playlist_items("PL1", &ErrorLog::new())
            .await;
        match result {
            Err(CatalogError::Api { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate_long_body() {
        let long = "x".repeat(MAX_ERROR_BODY + 10);
        let truncated = truncate(&long);
        assert_eq!(truncated.len(), MAX_ERROR_BODY + 3);
        assert!(truncated.ends_with("..."));
    }
}
