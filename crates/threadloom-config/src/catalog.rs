use serde::{Deserialize, Serialize};
use threadloom_common::{Error, Result};

/// Static metadata for one inference model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    /// Model or inference-profile identifier passed to the inference API.
    pub id: String,

    /// Human-readable description shown to users.
    pub description: String,

    /// Default system prompt. May contain a `{datetime}` placeholder.
    #[serde(default)]
    pub default_system_prompt: Option<String>,
}

impl ModelCatalogEntry {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            default_system_prompt: None,
        }
    }

    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = Some(prompt.into());
        self
    }
}

/// Ordered list of selectable models plus the identifier used when a request
/// names no model and the user has no preference.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(rename = "default")]
    default_model: String,
    entries: Vec<ModelCatalogEntry>,
}

impl ModelCatalog {
    pub fn new(default_model: impl Into<String>, entries: Vec<ModelCatalogEntry>) -> Self {
        Self {
            default_model: default_model.into(),
            entries,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn set_default_model(&mut self, model_id: impl Into<String>) {
        self.default_model = model_id.into();
    }

    pub fn entries(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelCatalogEntry> {
        self.entries.iter().find(|e| e.id == model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.get(model_id).is_some()
    }

    /// Description for `model_id`, or `"Not set"` when the id is unknown.
    pub fn display_name(&self, model_id: Option<&str>) -> &str {
        model_id
            .and_then(|id| self.get(id))
            .map(|e| e.description.as_str())
            .unwrap_or("Not set")
    }

    /// Reject catalogs that cannot be resolved unambiguously.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::Config("model catalog is empty".into()));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(Error::Config(format!("model entry #{i} has an empty id")));
            }
            if self.entries[..i].iter().any(|e| e.id == entry.id) {
                return Err(Error::Config(format!("duplicate model id: {}", entry.id)));
            }
        }
        if self.default_model.trim().is_empty() {
            return Err(Error::Config("default model id is empty".into()));
        }
        Ok(())
    }
}

const REASONING_PROMPT: &str = "You are a careful assistant that thinks step by step before answering. \
The current time is {datetime}.";

impl Default for ModelCatalog {
    fn default() -> Self {
        let entries = vec![
            ModelCatalogEntry::new(
                "us.anthropic.claude-3-5-sonnet-20241022-v2:0",
                "Anthropic Claude 3.5 Sonnet V2 (Text, Image, Document)",
            ),
            ModelCatalogEntry::new(
                "us.anthropic.claude-3-5-haiku-20241022-v1:0",
                "Anthropic Claude 3.5 Haiku (Text, Image, Document)",
            ),
            ModelCatalogEntry::new(
                "us.anthropic.claude-3-7-sonnet-20250219-v1:0",
                "Anthropic Claude 3.7 Sonnet Reasoning (Text, Image, Document)",
            )
            .with_default_prompt(REASONING_PROMPT),
            ModelCatalogEntry::new(
                "us.amazon.nova-lite-v1:0",
                "Amazon Nova Lite (Text, Image, Document, Video)",
            ),
            ModelCatalogEntry::new(
                "us.amazon.nova-pro-v1:0",
                "Amazon Nova Pro (Text, Image, Document, Video)",
            ),
        ];
        Self::new("us.anthropic.claude-3-5-sonnet-20241022-v2:0", entries)
    }
}
