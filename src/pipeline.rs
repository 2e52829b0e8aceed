//! Fetch, cache and analyze one video.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::fetch::{
    CommentFetcher, CommentOutcome, CommentSettings, TranscriptFetcher, TranscriptOutcome,
};
use crate::llm::{compose, Analyzer, PromptTemplates};
use crate::models::{
    AnalysisEntry, AnalysisKey, AnalysisMode, AnalysisRecord, RequestMode, VideoReport, UNTITLED,
};
use crate::scrapers::{RetryPolicy, Sleeper};
use crate::video_id::{self, VideoId};
use crate::youtube::{CommentSource, MetadataSource, TranscriptSource};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidInput(String),
}

/// Upstream collaborators.
#[derive(Clone)]
pub struct Sources {
    pub transcripts: Arc<dyn TranscriptSource>,
    pub comments: Arc<dyn CommentSource>,
    pub metadata: Arc<dyn MetadataSource>,
    pub analyzer: Arc<dyn Analyzer>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// Tunables for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    pub comments: CommentSettings,
    pub language: String,
    pub prompts: PromptTemplates,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            comments: CommentSettings::default(),
            language: crate::fetch::transcript::DEFAULT_LANGUAGE.to_string(),
            prompts: PromptTemplates::default(),
        }
    }
}

/// Replace characters that are unsafe in file names; blank titles become
/// "Untitled".
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    if cleaned.is_empty() {
        UNTITLED.to_string()
    } else {
        cleaned
    }
}

pub struct Pipeline {
    cache: CacheStore,
    transcripts: TranscriptFetcher,
    comments: CommentFetcher,
    metadata: Arc<dyn MetadataSource>,
    analyzer: Arc<dyn Analyzer>,
    prompts: PromptTemplates,
}

impl Pipeline {
    pub fn new(cache: CacheStore, sources: Sources, options: PipelineOptions) -> Self {
        let transcripts = TranscriptFetcher::new(
            sources.transcripts,
            cache.clone(),
            options.retry,
            sources.sleeper.clone(),
        )
        .with_language(options.language);
        let comments = CommentFetcher::new(
            sources.comments,
            cache.clone(),
            sources.sleeper,
            options.comments,
        );

        Self {
            cache,
            transcripts,
            comments,
            metadata: sources.metadata,
            analyzer: sources.analyzer,
            prompts: options.prompts,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Run the pipeline for one video reference.
    ///
    /// Only an unrecognizable reference is an error; every upstream failure
    /// degrades to missing data in the report.
    pub async fn run(
        &self,
        reference: &str,
        mode: RequestMode,
        model_id: &str,
    ) -> Result<VideoReport, PipelineError> {
        let video_id = video_id::extract(reference)
            .ok_or_else(|| PipelineError::InvalidInput(reference.trim().to_string()))?;
        info!("Processing {} (mode={}, model={})", video_id, mode, model_id);

        let title = self.title(&video_id).await;

        let transcript = if mode.wants_transcript() {
            self.transcript(&video_id).await
        } else {
            None
        };

        let (comments, comments_truncated) = if mode.wants_comments() {
            let set = self.comments(&video_id).await;
            (set.comments, set.truncated)
        } else {
            (Vec::new(), false)
        };

        let mut analyses = BTreeMap::new();
        if let Some(text) = transcript.as_deref().filter(|t| !t.trim().is_empty()) {
            let entry = self
                .analysis(&video_id, &title, AnalysisMode::Transcript, model_id, Some(text), None)
                .await;
            analyses.insert(AnalysisMode::Transcript, entry);
        }
        if mode.wants_comments() && !comments.is_empty() {
            let entry = self
                .analysis(
                    &video_id,
                    &title,
                    AnalysisMode::Comments,
                    model_id,
                    None,
                    Some(&comments),
                )
                .await;
            analyses.insert(AnalysisMode::Comments, entry);
        }

        Ok(VideoReport {
            video_id,
            title,
            model_id: model_id.to_string(),
            mode,
            transcript,
            comments,
            comments_truncated,
            analyses,
        })
    }

    async fn title(&self, video_id: &VideoId) -> String {
        match self.metadata.video_title(video_id).await {
            Ok(title) => sanitize_title(&title),
            Err(e) => {
                warn!("Could not look up title for {}: {}", video_id, e);
                UNTITLED.to_string()
            }
        }
    }

    async fn transcript(&self, video_id: &VideoId) -> Option<String> {
        match self.transcripts.fetch(video_id).await {
            TranscriptOutcome::Cached(record) | TranscriptOutcome::Fetched(record) => {
                Some(record.text)
            }
            TranscriptOutcome::Absent(reason) => {
                info!("Continuing without transcript for {}: {}", video_id, reason);
                None
            }
            TranscriptOutcome::TransientFailure {
                attempts,
                last_error,
            } => {
                warn!(
                    "Giving up on transcript for {} after {} attempts: {}",
                    video_id, attempts, last_error
                );
                None
            }
        }
    }

    async fn comments(&self, video_id: &VideoId) -> crate::models::CommentSet {
        match self.comments.fetch(video_id).await {
            CommentOutcome::Partial { set, error } => {
                warn!(
                    "Using {} comments for {} after a page error: {}",
                    set.len(),
                    video_id,
                    error
                );
                set
            }
            outcome => outcome.into_set(),
        }
    }

    async fn analysis(
        &self,
        video_id: &VideoId,
        title: &str,
        mode: AnalysisMode,
        model_id: &str,
        transcript: Option<&str>,
        comments: Option<&[String]>,
    ) -> AnalysisEntry {
        let key = AnalysisKey::new(video_id.clone(), mode, model_id);
        if let Some(record) = self.cache.analysis(&key) {
            info!("Using cached {} analysis for {} from {}", mode, video_id, model_id);
            return AnalysisEntry {
                text: record.result_text,
                from_cache: true,
            };
        }

        let prompt = compose(
            title,
            transcript,
            comments,
            self.prompts.instruction_for(mode),
            self.prompts.comment_limit,
        );
        info!("Analyzing {} of {} with {}", mode, video_id, model_id);

        let text = match self.analyzer.analyze(&prompt, model_id).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("{} returned an empty {} analysis for {}; not caching", model_id, mode, video_id);
                String::new()
            }
            Err(e) => {
                warn!("{} analysis of {} failed: {}", mode, video_id, e);
                String::new()
            }
        };

        if !text.is_empty() {
            let record = AnalysisRecord::new(&key, text.clone()).with_title(title);
            if let Err(e) = self.cache.put_analysis(&record) {
                warn!("Failed to cache {} analysis for {}: {}", mode, video_id, e);
            }
        }

        AnalysisEntry {
            text,
            from_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("What? Why: A/B <test>"), "What_ Why_ A_B _test_");
        assert_eq!(sanitize_title(r#"a\b*c"d|e"#), "a_b_c_d_e");
        assert_eq!(sanitize_title("   "), "Untitled");
        assert_eq!(sanitize_title("Plain title"), "Plain title");
    }
}
