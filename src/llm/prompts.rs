//! Prompt composition for video analyses.

use serde::{Deserialize, Serialize};

use crate::models::AnalysisMode;

/// Comments included in a prompt, however many are cached.
pub const DEFAULT_PROMPT_COMMENT_LIMIT: usize = 100;

/// Default instruction appended to comment analysis prompts.
pub const DEFAULT_COMMENTS_INSTRUCTION: &str = r#"You are an audience research assistant. The comments above were left by viewers of this video. Group them into 4-8 categories of meaningful reactions, questions or struggles. For each category give a short title, a one or two sentence description, and two or three representative comments. Then describe the overall emotional tone of the audience, the recurring themes across categories, and the questions viewers are still asking. Finish with a section of content gaps and opportunities: topics the audience wants covered next, each with a suggested video title of at most 53 characters. Format the answer with clear headings and bullet points."#;

/// Default instruction appended to transcript analysis prompts.
pub const DEFAULT_TRANSCRIPT_INSTRUCTION: &str = r#"You are a content researcher. The transcript above is from this video. First analyze the hook (the first 30-60 seconds): what makes it compelling and which psychological triggers it uses. Then break down the structure of the video: how it is organized, its narrative arc, and how it supports viewer retention. Then list missed opportunities: what was left unsaid or treated too shallowly. Finally suggest 3-6 follow-up video titles of at most 53 characters, each with a one line summary of what it would cover. Format the answer with bold headings and bullet points."#;

/// Instruction templates, one per analysis mode. Fields left out of a
/// config override keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub comments: String,
    pub transcript: String,
    pub comment_limit: usize,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            comments: DEFAULT_COMMENTS_INSTRUCTION.to_string(),
            transcript: DEFAULT_TRANSCRIPT_INSTRUCTION.to_string(),
            comment_limit: DEFAULT_PROMPT_COMMENT_LIMIT,
        }
    }
}

impl PromptTemplates {
    pub fn instruction_for(&self, mode: AnalysisMode) -> &str {
        match mode {
            AnalysisMode::Comments => &self.comments,
            AnalysisMode::Transcript => &self.transcript,
        }
    }
}

/// Build the analysis prompt.
///
/// A section appears only when its artifact is present and non-empty; at most
/// `comment_limit` comments are included, as a pretty-printed JSON array.
pub fn compose(
    title: &str,
    transcript: Option<&str>,
    comments: Option<&[String]>,
    instruction: &str,
    comment_limit: usize,
) -> String {
    let mut prompt = format!("Analyze the following YouTube video. Title: {}\n\n", title);

    if let Some(transcript) = transcript.filter(|t| !t.trim().is_empty()) {
        prompt.push_str("Transcript:\n");
        prompt.push_str(transcript);
        prompt.push_str("\n\n");
    }

    if let Some(comments) = comments.filter(|c| !c.is_empty()) {
        let shown = &comments[..comments.len().min(comment_limit)];
        let json = serde_json::to_string_pretty(shown).unwrap_or_else(|_| "[]".to_string());
        prompt.push_str("Comments:\n");
        prompt.push_str(&json);
        prompt.push_str("\n\n");
    }

    prompt.push_str(instruction);
    prompt
}
