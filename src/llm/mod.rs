//! LLM access: model catalogue, prompt composition and the chat client.

pub mod catalog;
pub mod client;
pub mod prompts;

pub use catalog::{ModelCatalog, ModelEntry};
pub use client::{Analyzer, LlmConfig, LlmError, OpenRouterClient};
pub use prompts::{compose, PromptTemplates};
