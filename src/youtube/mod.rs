//! YouTube upstreams: the Data API for titles and comments, and the watch
//! page / innertube player for caption tracks.
//!
//! Each upstream sits behind a small trait so fetchers and the pipeline can be
//! driven by in-process stubs.

pub mod data_api;
pub mod transcript_api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scrapers::Retryable;
use crate::video_id::VideoId;

pub use data_api::DataApiClient;
pub use transcript_api::TranscriptClient;

/// Errors from the YouTube Data API.
#[derive(Debug, Error)]
pub enum YouTubeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YouTube API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("comments are disabled for this video")]
    CommentsDisabled,

    #[error("YouTube API quota exceeded")]
    QuotaExceeded,

    #[error("no YouTube API key configured (set YOUTUBE_API_KEY)")]
    MissingApiKey,

    #[error("video not found: {0}")]
    VideoNotFound(String),

    #[error("failed to parse YouTube response: {0}")]
    Parse(String),
}

/// Errors from transcript retrieval.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcripts are disabled for video {0}")]
    Disabled(String),

    #[error("no transcript in language '{language}' for video {video_id}")]
    NotFound { video_id: String, language: String },

    #[error("request blocked by YouTube for video {0}")]
    Blocked(String),

    #[error("video {video_id} is unplayable: {reason}")]
    Unplayable { video_id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to parse YouTube response: {0}")]
    Parse(String),
}

impl TranscriptError {
    /// Disabled and missing-language errors will not change on retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscriptError::Disabled(_) | TranscriptError::NotFound { .. }
        )
    }
}

impl Retryable for TranscriptError {
    fn is_retryable(&self) -> bool {
        !self.is_terminal()
    }
}

/// One timed caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

/// One page of top-level comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub comments: Vec<String>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Segments of the transcript in `language`, in temporal order.
    async fn transcript(
        &self,
        video_id: &VideoId,
        language: &str,
    ) -> Result<Vec<TranscriptSegment>, TranscriptError>;
}

#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn comment_page(
        &self,
        video_id: &VideoId,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<CommentPage, YouTubeError>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn video_title(&self, video_id: &VideoId) -> Result<String, YouTubeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_transcript_errors() {
        assert!(TranscriptError::Disabled("abc12345678".into()).is_terminal());
        assert!(TranscriptError::NotFound {
            video_id: "abc12345678".into(),
            language: "en".into()
        }
        .is_terminal());
        assert!(!TranscriptError::Blocked("abc12345678".into()).is_terminal());
        assert!(TranscriptError::Parse("bad json".into()).is_retryable());
    }
}
