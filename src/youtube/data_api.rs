//! YouTube Data API v3 client (video titles and comment threads).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{CommentPage, CommentSource, MetadataSource, YouTubeError};
use crate::scrapers::{HttpClient, HttpResponse};
use crate::video_id::VideoId;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page the commentThreads endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadListResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_display: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Client for the `videos` and `commentThreads` endpoints.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

impl DataApiClient {
    pub fn new(http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, YouTubeError> {
        if self.api_key.trim().is_empty() {
            return Err(YouTubeError::MissingApiKey);
        }
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut params = query.to_vec();
        params.push(("key", self.api_key.as_str()));

        let response = self.http.get(&url, &params).await?;
        if !response.is_success() {
            return Err(api_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| YouTubeError::Parse(e.to_string()))
    }
}

/// Classify a non-success Data API response.
async fn api_error(response: HttpResponse) -> YouTubeError {
    let status = response.status.as_u16();
    let body = response.text().await.unwrap_or_default();

    let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&body) else {
        return YouTubeError::Api {
            status,
            message: body,
        };
    };

    let reasons: Vec<&str> = parsed.error.errors.iter().map(|e| e.reason.as_str()).collect();
    if reasons.contains(&"commentsDisabled") {
        YouTubeError::CommentsDisabled
    } else if reasons
        .iter()
        .any(|r| *r == "quotaExceeded" || *r == "dailyLimitExceeded")
    {
        YouTubeError::QuotaExceeded
    } else {
        YouTubeError::Api {
            status,
            message: parsed.error.message,
        }
    }
}

#[async_trait]
impl MetadataSource for DataApiClient {
    async fn video_title(&self, video_id: &VideoId) -> Result<String, YouTubeError> {
        let response: VideoListResponse = self
            .get_json("videos", &[("part", "snippet"), ("id", video_id.as_str())])
            .await?;

        response
            .items
            .into_iter()
            .next()
            .map(|item| item.snippet.title)
            .ok_or_else(|| YouTubeError::VideoNotFound(video_id.to_string()))
    }
}

#[async_trait]
impl CommentSource for DataApiClient {
    async fn comment_page(
        &self,
        video_id: &VideoId,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<CommentPage, YouTubeError> {
        let max_results = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query = vec![
            ("part", "snippet"),
            ("videoId", video_id.as_str()),
            ("maxResults", max_results.as_str()),
            ("textFormat", "plainText"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: CommentThreadListResponse = self.get_json("commentThreads", &query).await?;
        debug!(
            "Comment page for {}: {} threads, more={}",
            video_id,
            response.items.len(),
            response.next_page_token.is_some()
        );

        Ok(CommentPage {
            comments: response
                .items
                .into_iter()
                .map(|thread| thread.snippet.top_level_comment.snippet.text_display)
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
