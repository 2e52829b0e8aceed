//! ytinsights: fetch, cache and analyze YouTube transcripts and comments.
//!
//! A [`Pipeline`] turns a video reference into a [`VideoReport`]: it extracts
//! the video identifier, loads the transcript and comments from the on-disk
//! cache or from YouTube, and asks an LLM for per-artifact analyses, caching
//! every non-empty result.

pub mod cache;
pub mod config;
pub mod export;
pub mod fetch;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod server;
pub mod video_id;
pub mod youtube;

pub use cache::{CacheError, CacheStore, Namespace};
pub use config::{load_settings, Config, ConfigError, Settings};
pub use models::{AnalysisMode, RequestMode, VideoReport};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, Sources};
pub use video_id::VideoId;
