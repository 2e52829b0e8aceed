//! Records persisted by the cache and the aggregate report returned to callers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::video_id::VideoId;

/// Placeholder used whenever a title cannot be looked up.
pub const UNTITLED: &str = "Untitled";

/// A fetched transcript: segments joined in temporal order by single spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub video_id: VideoId,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn new(video_id: VideoId, text: String) -> Self {
        Self {
            video_id,
            text,
            fetched_at: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Reading statistics shown alongside a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranscriptStats {
    pub words: usize,
    /// Estimated pages at 300 words per page.
    pub pages: usize,
    /// Estimated reading time at 200 words per minute.
    pub read_minutes: usize,
}

impl TranscriptStats {
    pub fn for_text(text: &str) -> Self {
        let words = text.split_whitespace().count();
        Self {
            words,
            pages: (words as f64 / 300.0).round() as usize,
            read_minutes: (words as f64 / 200.0).round() as usize,
        }
    }
}

/// Top-level comments for a video, unique and in retrieval order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSet {
    pub video_id: VideoId,
    pub comments: Vec<String>,
    /// Set when the retrieval cap was reached before pagination was exhausted.
    pub truncated: bool,
    pub fetched_at: DateTime<Utc>,
}

impl CommentSet {
    pub fn empty(video_id: VideoId) -> Self {
        Self {
            video_id,
            comments: Vec::new(),
            truncated: false,
            fetched_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

/// Which artifact an analysis was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Transcript,
    Comments,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Transcript => "transcript",
            AnalysisMode::Comments => "comments",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller asked to have analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Transcript,
    Comments,
    Both,
}

impl RequestMode {
    pub fn wants_transcript(&self) -> bool {
        matches!(self, RequestMode::Transcript | RequestMode::Both)
    }

    pub fn wants_comments(&self) -> bool {
        matches!(self, RequestMode::Comments | RequestMode::Both)
    }

    /// Analysis components covered by this request, in report order.
    pub fn components(&self) -> Vec<AnalysisMode> {
        let mut modes = Vec::with_capacity(2);
        if self.wants_transcript() {
            modes.push(AnalysisMode::Transcript);
        }
        if self.wants_comments() {
            modes.push(AnalysisMode::Comments);
        }
        modes
    }
}

impl FromStr for RequestMode {
    type Err = String;

    /// Accepts the short names as well as the labels used by the web form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcript" | "transcript only" => Ok(RequestMode::Transcript),
            "comments" | "comments only" => Ok(RequestMode::Comments),
            "both" => Ok(RequestMode::Both),
            other => Err(format!(
                "unknown mode '{}' (expected transcript, comments or both)",
                other
            )),
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestMode::Transcript => "transcript",
            RequestMode::Comments => "comments",
            RequestMode::Both => "both",
        };
        f.write_str(s)
    }
}

/// Cache key for an analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub video_id: VideoId,
    pub mode: AnalysisMode,
    pub model_id: String,
}

impl AnalysisKey {
    pub fn new(video_id: VideoId, mode: AnalysisMode, model_id: impl Into<String>) -> Self {
        Self {
            video_id,
            mode,
            model_id: model_id.into(),
        }
    }

    /// Single-string form used as the cache key.
    pub fn cache_key(&self) -> String {
        format!("{}_{}_{}", self.video_id, self.mode, self.model_id)
    }
}

/// A cached LLM analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub video_id: VideoId,
    pub mode: AnalysisMode,
    pub model_id: String,
    pub result_text: String,
    /// Sanitized video title at analysis time, used by exports.
    #[serde(default)]
    pub title: Option<String>,
    pub cached_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(key: &AnalysisKey, result_text: String) -> Self {
        Self {
            video_id: key.video_id.clone(),
            mode: key.mode,
            model_id: key.model_id.clone(),
            result_text,
            title: None,
            cached_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn key(&self) -> AnalysisKey {
        AnalysisKey::new(self.video_id.clone(), self.mode, self.model_id.clone())
    }
}

/// One analysis in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisEntry {
    /// Empty when the model produced nothing.
    pub text: String,
    pub from_cache: bool,
}

/// Everything a pipeline run produced for one video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub video_id: VideoId,
    pub title: String,
    pub model_id: String,
    pub mode: RequestMode,
    pub transcript: Option<String>,
    pub comments: Vec<String>,
    pub comments_truncated: bool,
    pub analyses: BTreeMap<AnalysisMode, AnalysisEntry>,
}

impl VideoReport {
    pub fn analysis(&self, mode: AnalysisMode) -> Option<&str> {
        self.analyses
            .get(&mode)
            .map(|entry| entry.text.as_str())
            .filter(|text| !text.is_empty())
    }

    /// All analyses as one text: a lone analysis verbatim, several with headers.
    pub fn combined_analysis(&self) -> String {
        let produced: Vec<(&AnalysisMode, &AnalysisEntry)> = self
            .analyses
            .iter()
            .filter(|(_, entry)| !entry.text.trim().is_empty())
            .collect();

        match produced.as_slice() {
            [] => String::new(),
            [(_, entry)] => entry.text.clone(),
            many => many
                .iter()
                .map(|(mode, entry)| {
                    format!(
                        "## {} analysis\n\n{}",
                        capitalize(mode.as_str()),
                        entry.text.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    pub fn transcript_stats(&self) -> Option<TranscriptStats> {
        self.transcript.as_deref().map(TranscriptStats::for_text)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
