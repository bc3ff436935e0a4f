use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use threadloom_common::Result;
use tracing::warn;

use crate::catalog::ModelCatalog;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub bedrock: BedrockConfig,

    #[serde(default)]
    pub models: ModelCatalog,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.models.validate()?;
        if !self.models.contains(self.models.default_model()) {
            warn!(
                model = self.models.default_model(),
                "default model is not listed in the catalog; catalog prompts and reasoning mode will not apply to it"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`) used for Web API calls and file downloads.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Signing secret used to verify Events API requests.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Override for the Web API base URL (tests, proxies).
    #[serde(default = "default_slack_api_base")]
    pub api_base_url: String,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            signing_secret: None,
            api_base_url: default_slack_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Bedrock API key sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the runtime endpoint. Derived from `region` when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            api_key: None,
            endpoint: None,
        }
    }
}

impl BedrockConfig {
    pub fn runtime_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding user preferences.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".threadloom")
        .join("preferences.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_endpoint_derives_from_region() {
        let cfg = BedrockConfig {
            region: "eu-west-1".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.runtime_endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn explicit_endpoint_wins() {
        let cfg = BedrockConfig {
            endpoint: Some("http://127.0.0.1:9000".into()),
            ..Default::default()
        };
        assert_eq!(cfg.runtime_endpoint(), "http://127.0.0.1:9000");
    }

    #[test]
    fn default_config_validates() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn unlisted_default_model_is_accepted() {
        let mut config = AppConfig::default();
        config.models.set_default_model(
            "arn:aws:bedrock:us-east-1:123456789012:inference-profile/us.anthropic.claude-3-5-sonnet-20241022-v2:0",
        );
        assert!(!config.models.contains(config.models.default_model()));
        config.validate().unwrap();
    }

    #[test]
    fn blank_default_model_is_rejected() {
        let mut config = AppConfig::default();
        config.models.set_default_model("  ");
        assert!(config.validate().is_err());
    }
}
