//! Transcript retrieval with retry and cache.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::models::TranscriptRecord;
use crate::scrapers::{execute_with_retry, RetryOutcome, RetryPolicy, Sleeper};
use crate::video_id::VideoId;
use crate::youtube::{TranscriptError, TranscriptSource};

pub const DEFAULT_LANGUAGE: &str = "en";

/// What a transcript fetch ended with.
#[derive(Debug)]
pub enum TranscriptOutcome {
    Cached(TranscriptRecord),
    Fetched(TranscriptRecord),
    /// The video has no transcript in the requested language.
    Absent(TranscriptError),
    /// Retries ran out; nothing was cached.
    TransientFailure {
        attempts: u32,
        last_error: TranscriptError,
    },
}

impl TranscriptOutcome {
    pub fn record(&self) -> Option<&TranscriptRecord> {
        match self {
            TranscriptOutcome::Cached(record) | TranscriptOutcome::Fetched(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<TranscriptRecord> {
        match self {
            TranscriptOutcome::Cached(record) | TranscriptOutcome::Fetched(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, TranscriptOutcome::Cached(_))
    }
}

pub struct TranscriptFetcher {
    source: Arc<dyn TranscriptSource>,
    cache: CacheStore,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    language: String,
}

impl TranscriptFetcher {
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        cache: CacheStore,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            source,
            cache,
            policy,
            sleeper,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub async fn fetch(&self, video_id: &VideoId) -> TranscriptOutcome {
        if let Some(record) = self.cache.transcript(video_id) {
            return TranscriptOutcome::Cached(record);
        }

        let label = format!("Transcript fetch for {}", video_id);
        let outcome = execute_with_retry(&self.policy, self.sleeper.as_ref(), &label, |_| {
            self.source.transcript(video_id, &self.language)
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, .. } => {
                let text = value
                    .iter()
                    .map(|segment| segment.text.trim())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                let record = TranscriptRecord::new(video_id.clone(), text);
                info!(
                    "Fetched transcript for {} ({} words)",
                    video_id,
                    record.word_count()
                );
                if let Err(e) = self.cache.put_transcript(&record) {
                    warn!("Failed to cache transcript for {}: {}", video_id, e);
                }
                TranscriptOutcome::Fetched(record)
            }
            RetryOutcome::Terminal { error, .. } => {
                info!("No transcript for {}: {}", video_id, error);
                TranscriptOutcome::Absent(error)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => TranscriptOutcome::TransientFailure {
                attempts,
                last_error,
            },
        }
    }
}
