use std::path::{Path, PathBuf};

use threadloom_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Loads [`AppConfig`] from an optional YAML file, then layers environment
/// variables on top.
///
/// Recognised variables:
///
/// | variable | field |
/// |---|---|
/// | `SLACK_BOT_TOKEN` | `slack.bot_token` |
/// | `SLACK_SIGNING_SECRET` | `slack.signing_secret` |
/// | `BEDROCK_MODEL_ID` | `models.default` |
/// | `BEDROCK_REGION`, `AWS_REGION` | `bedrock.region` |
/// | `AWS_BEARER_TOKEN_BEDROCK` | `bedrock.api_key` |
/// | `THREADLOOM_DB_PATH` | `storage.db_path` |
/// | `THREADLOOM_BIND` | `gateway.bind` |
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.threadloom/config.yml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".threadloom")
            .join("config.yml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file (if present), load `.env`, apply overrides and validate.
    pub fn load(&self) -> Result<AppConfig> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env");
        }

        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(&self) -> Result<AppConfig> {
        if !self.path.is_file() {
            info!(
                "no config file at {}, using defaults",
                self.path.display()
            );
            return Ok(AppConfig::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let config: AppConfig = serde_yaml::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid config at {}: {e}", self.path.display()))
        })?;
        info!("loaded config from {}", self.path.display());
        Ok(config)
    }
}

/// Apply environment overrides using `lookup` as the variable source.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("SLACK_BOT_TOKEN") {
        config.slack.bot_token = Some(token);
    }
    if let Some(secret) = get("SLACK_SIGNING_SECRET") {
        config.slack.signing_secret = Some(secret);
    }
    if let Some(model) = get("BEDROCK_MODEL_ID") {
        config.models.set_default_model(model);
    }
    if let Some(region) = get("BEDROCK_REGION").or_else(|| get("AWS_REGION")) {
        config.bedrock.region = region;
    }
    if let Some(key) = get("AWS_BEARER_TOKEN_BEDROCK") {
        config.bedrock.api_key = Some(key);
    }
    if let Some(path) = get("THREADLOOM_DB_PATH") {
        config.storage.db_path = PathBuf::from(path);
    }
    if let Some(bind) = get("THREADLOOM_BIND") {
        config.gateway.bind = bind;
    }
}
