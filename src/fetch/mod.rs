//! Cache-first retrieval of transcripts and comments.

pub mod comments;
pub mod transcript;

pub use comments::{CommentFetcher, CommentOutcome, CommentSettings};
pub use transcript::{TranscriptFetcher, TranscriptOutcome};
