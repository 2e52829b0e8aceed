//! Display names for the models offered to users.

use serde::{Deserialize, Serialize};

/// Built-in display name to model id pairs, in presentation order.
const DEFAULT_MODELS: &[(&str, &str)] = &[
    ("LLama-Nvidia", "nvidia/llama-3.1-nemotron-ultra-253b-v1:free"),
    ("Google Gemini", "google/gemini-2.5-pro-exp-03-25:free"),
    ("Google Gemma", "google/gemma-3-12b-it:free"),
    ("Meta Maverick", "meta-llama/llama-4-maverick:free"),
    ("GPT 4.1 Nano", "openai/gpt-4.1-nano"),
    ("GPT 4o mini", "openai/gpt-4o-mini"),
    ("Grok", "x-ai/grok-3-mini-beta"),
    ("DeepSeek", "deepseek/deepseek-chat-v3-0324"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub model_id: String,
}

/// Ordered model catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_MODELS
                .iter()
                .map(|(name, id)| (name.to_string(), id.to_string())),
        )
    }
}

impl ModelCatalog {
    /// Build a catalogue; later duplicates of a name replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
        };
        for (name, model_id) in entries {
            catalog.insert(name, model_id);
        }
        catalog
    }

    pub fn insert(&mut self, name: String, model_id: String) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.model_id = model_id,
            None => self.entries.push(ModelEntry { name, model_id }),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Resolve a display name (case-insensitive) or a raw `vendor/model` id.
    pub fn resolve(&self, name_or_id: &str) -> Option<String> {
        let wanted = name_or_id.trim();
        if wanted.is_empty() {
            return None;
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(wanted))
        {
            return Some(entry.model_id.clone());
        }
        if self.entries.iter().any(|e| e.model_id == wanted) || wanted.contains('/') {
            return Some(wanted.to_string());
        }
        None
    }
}
