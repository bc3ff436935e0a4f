use super::{ConverseRequest, ConverseResponse, InferenceProvider, ResponseBlock, Usage};
use crate::turns::{ContentBlock, Turn};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde_json::{Value, json};
use threadloom_common::{Error, Result};
use threadloom_config::BedrockConfig;
use tracing::debug;
use url::Url;

/// Amazon Bedrock runtime client speaking the Converse API.
///
/// Authenticates with a Bedrock API key sent as a bearer token.
pub struct BedrockConverseProvider {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl BedrockConverseProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(config: &BedrockConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("AWS_BEARER_TOKEN_BEDROCK not set".to_string()))?;
        Ok(Self::new(config.runtime_endpoint(), api_key))
    }

    fn converse_url(&self, model_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid Bedrock endpoint {}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Bedrock endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .push("model")
            .push(model_id)
            .push("converse");
        Ok(url)
    }

    fn build_body(request: &ConverseRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_json).collect();

        let mut body = json!({
            "messages": messages,
            "system": [{ "text": request.system }],
        });

        if let Some(thinking) = request.thinking {
            body["inferenceConfig"] = json!({ "maxTokens": thinking.max_tokens() });
            body["additionalModelRequestFields"] = json!({
                "thinking": {
                    "type": "enabled",
                    "budget_tokens": thinking.budget_tokens(),
                }
            });
        }

        body
    }

    fn parse_response(body: &Value) -> Result<ConverseResponse> {
        let blocks = body["output"]["message"]["content"]
            .as_array()
            .ok_or_else(|| Error::Agent("Missing output content".to_string()))?;

        let content = blocks
            .iter()
            .filter_map(|block| {
                if let Some(text) = block["text"].as_str() {
                    Some(ResponseBlock::Text {
                        text: text.to_string(),
                    })
                } else {
                    block["reasoningContent"]["reasoningText"]["text"]
                        .as_str()
                        .map(|text| ResponseBlock::Reasoning {
                            text: text.to_string(),
                        })
                }
            })
            .collect();

        let usage = body.get("usage").filter(|u| u.is_object()).map(|u| Usage {
            input_tokens: token_count(&u["inputTokens"]),
            output_tokens: token_count(&u["outputTokens"]),
            total_tokens: token_count(&u["totalTokens"]),
        });

        Ok(ConverseResponse {
            content,
            usage,
            stop_reason: body["stopReason"].as_str().map(str::to_string),
        })
    }
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}

fn message_json(turn: &Turn) -> Value {
    let content: Vec<Value> = turn.content().iter().map(block_json).collect();
    json!({ "role": turn.role.as_str(), "content": content })
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({ "text": text }),
        ContentBlock::Image { format, bytes } => json!({
            "image": { "format": format, "source": { "bytes": BASE64.encode(bytes) } }
        }),
        ContentBlock::Video { format, bytes } => json!({
            "video": { "format": format, "source": { "bytes": BASE64.encode(bytes) } }
        }),
        ContentBlock::Document {
            name,
            format,
            bytes,
        } => json!({
            "document": {
                "name": name,
                "format": format,
                "source": { "bytes": BASE64.encode(bytes) }
            }
        }),
    }
}

#[async_trait]
impl InferenceProvider for BedrockConverseProvider {
    fn provider_id(&self) -> &str {
        "bedrock"
    }

    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
        let url = self.converse_url(&request.model_id)?;
        let body = Self::build_body(request);
        debug!(model = %request.model_id, turns = request.messages.len(), "sending converse request");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Bedrock request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "Bedrock API error ({status}): {error_text}"
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("Failed to parse Bedrock response: {e}")))?;

        Self::parse_response(&json)
    }
}
