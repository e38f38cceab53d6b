use serde::{Deserialize, Serialize};

/// A playlist member, projected from a raw catalog record.
///
/// Identity is `source_id`; `author` and `title` name the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub author: String,
    pub title: String,
    pub source_id: String,
}

impl PlaylistItem {
    pub fn new(
        author: impl Into<String>,
        title: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            title: title.into(),
            source_id: source_id.into(),
        }
    }
}

// =============================================================================
// Raw API response types (YouTube Data API v3, playlistItems.list)
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<RawPlaylistEntry>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    pub error: Option<ApiErrorBody>,
}

impl PlaylistItemsResponse {
    /// Token for the next page; empty tokens count as absent.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPlaylistEntry {
    pub snippet: Option<RawSnippet>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSnippet {
    pub title: Option<String>,
    #[serde(rename = "videoOwnerChannelTitle")]
    pub video_owner_channel_title: Option<String>,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<RawResourceId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawResourceId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

impl RawPlaylistEntry {
    /// Project into a [`PlaylistItem`], or explain which field is missing.
    pub fn into_item(self) -> Result<PlaylistItem, String> {
        let snippet = self.snippet.ok_or("missing snippet")?;
        let source_id = snippet
            .resource_id
            .and_then(|r| r.video_id)
            .ok_or("missing resourceId.videoId")?;
        let author = snippet
            .video_owner_channel_title
            .ok_or_else(|| format!("missing videoOwnerChannelTitle for {}", source_id))?;
        let title = snippet
            .title
            .ok_or_else(|| format!("missing title for {}", source_id))?;

        Ok(PlaylistItem {
            author,
            title,
            source_id,
        })
    }
}
