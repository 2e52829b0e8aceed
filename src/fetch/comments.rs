//! Paginated comment retrieval with dedup, cap and cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::models::CommentSet;
use crate::scrapers::Sleeper;
use crate::video_id::VideoId;
use crate::youtube::{CommentSource, YouTubeError};

/// Pagination limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSettings {
    pub page_size: u32,
    /// Stop once this many unique comments are collected.
    pub max_comments: usize,
    /// Pause between page requests.
    pub page_delay: Duration,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_comments: 3000,
            page_delay: Duration::from_millis(100),
        }
    }
}

/// What a comment fetch ended with.
#[derive(Debug)]
pub enum CommentOutcome {
    Cached(CommentSet),
    Complete(CommentSet),
    /// A page failed; everything collected before it is kept.
    Partial { set: CommentSet, error: YouTubeError },
}

impl CommentOutcome {
    pub fn set(&self) -> &CommentSet {
        match self {
            CommentOutcome::Cached(set)
            | CommentOutcome::Complete(set)
            | CommentOutcome::Partial { set, .. } => set,
        }
    }

    pub fn into_set(self) -> CommentSet {
        match self {
            CommentOutcome::Cached(set)
            | CommentOutcome::Complete(set)
            | CommentOutcome::Partial { set, .. } => set,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CommentOutcome::Cached(_))
    }
}

pub struct CommentFetcher {
    source: Arc<dyn CommentSource>,
    cache: CacheStore,
    sleeper: Arc<dyn Sleeper>,
    settings: CommentSettings,
}

impl CommentFetcher {
    pub fn new(
        source: Arc<dyn CommentSource>,
        cache: CacheStore,
        sleeper: Arc<dyn Sleeper>,
        settings: CommentSettings,
    ) -> Self {
        Self {
            source,
            cache,
            sleeper,
            settings,
        }
    }

    pub async fn fetch(&self, video_id: &VideoId) -> CommentOutcome {
        if let Some(set) = self.cache.comments(video_id) {
            return CommentOutcome::Cached(set);
        }

        let cap = self.settings.max_comments;
        let mut seen: HashSet<String> = HashSet::new();
        let mut comments: Vec<String> = Vec::new();
        let mut truncated = false;
        let mut page_token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut failure: Option<YouTubeError> = None;
        let mut pages = 0u32;

        loop {
            let page = match self
                .source
                .comment_page(video_id, page_token.as_deref(), self.settings.page_size)
                .await
            {
                Ok(page) => page,
                Err(YouTubeError::CommentsDisabled) if pages == 0 => {
                    info!("Comments are disabled for {}", video_id);
                    break;
                }
                Err(e) => {
                    warn!(
                        "Comment page {} for {} failed, keeping {} comments: {}",
                        pages + 1,
                        video_id,
                        comments.len(),
                        e
                    );
                    failure = Some(e);
                    break;
                }
            };
            pages += 1;

            let mut items = page.comments.into_iter();
            for raw in items.by_ref() {
                let text = raw.trim();
                if text.is_empty() || seen.contains(text) {
                    continue;
                }
                seen.insert(text.to_string());
                comments.push(text.to_string());
                if comments.len() >= cap {
                    break;
                }
            }
            debug!(
                "Comment page {} for {}: {} unique so far",
                pages,
                video_id,
                comments.len()
            );

            if comments.len() >= cap {
                truncated = items.len() > 0 || page.next_page_token.is_some();
                break;
            }
            match page.next_page_token {
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    warn!(
                        "Comment pagination for {} repeated page token {}, stopping",
                        video_id, token
                    );
                    break;
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
            self.sleeper.sleep(self.settings.page_delay).await;
        }

        let set = CommentSet {
            video_id: video_id.clone(),
            comments,
            truncated,
            fetched_at: Utc::now(),
        };

        match failure {
            None => {
                info!(
                    "Fetched {} comments for {}{}",
                    set.len(),
                    video_id,
                    if truncated { " (truncated)" } else { "" }
                );
                self.persist(&set);
                CommentOutcome::Complete(set)
            }
            Some(error) => {
                self.persist(&set);
                CommentOutcome::Partial { set, error }
            }
        }
    }

    fn persist(&self, set: &CommentSet) {
        if let Err(e) = self.cache.put_comments(set) {
            warn!("Failed to cache comments for {}: {}", set.video_id, e);
        }
    }
}
