use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use threadloom_common::{Error, Result};

use crate::turns::Turn;

pub mod bedrock;
pub use bedrock::BedrockConverseProvider;

/// Output ceiling used when extended reasoning is enabled.
pub const REASONING_MAX_TOKENS: u32 = 64_000;

/// Reasoning budget used when extended reasoning is enabled.
pub const REASONING_BUDGET_TOKENS: u32 = 48_000;

/// Conversation-style inference backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider identifier (e.g. "bedrock").
    fn provider_id(&self) -> &str;

    /// Send the whole conversation and return the model's reply.
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse>;
}

#[derive(Debug, Clone)]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<Turn>,
    pub system: String,
    pub thinking: Option<ThinkingConfig>,
}

/// Extended reasoning settings. The budget must stay below the output ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    max_tokens: u32,
    budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn new(max_tokens: u32, budget_tokens: u32) -> Result<Self> {
        if budget_tokens == 0 || budget_tokens >= max_tokens {
            return Err(Error::Config(format!(
                "reasoning budget ({budget_tokens}) must be positive and below max tokens ({max_tokens})"
            )));
        }
        Ok(Self {
            max_tokens,
            budget_tokens,
        })
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn budget_tokens(&self) -> u32 {
        self.budget_tokens
    }
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: REASONING_MAX_TOKENS,
            budget_tokens: REASONING_BUDGET_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text { text: String },
    Reasoning { text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverseResponse {
    pub content: Vec<ResponseBlock>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}
