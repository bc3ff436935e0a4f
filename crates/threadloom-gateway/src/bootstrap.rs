use std::sync::Arc;

use threadloom_agents::{BedrockConverseProvider, ModelInvoker};
use threadloom_channels::{ChatTransport, ConversationRouter, SlackWebClient};
use threadloom_common::{Error, Result};
use threadloom_config::AppConfig;
use threadloom_db::{PreferenceResolver, SqlitePreferenceStore};
use threadloom_security::SlackSignatureVerifier;
use tracing::info;

use crate::state::AppState;

/// Open the preference store for `config`.
pub fn open_preferences(config: &AppConfig) -> Result<PreferenceResolver> {
    let store = SqlitePreferenceStore::open(&config.storage.db_path)?;
    Ok(PreferenceResolver::new(Arc::new(store)))
}

/// Connect every external collaborator and assemble the gateway state.
///
/// Slack is contacted once here (`auth.test`) so a bad token fails startup
/// rather than the first event.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let bot_token = config
        .slack
        .bot_token
        .as_deref()
        .ok_or_else(|| Error::Config("SLACK_BOT_TOKEN not set".to_string()))?;
    let signing_secret = config
        .slack
        .signing_secret
        .as_deref()
        .ok_or_else(|| Error::Config("SLACK_SIGNING_SECRET not set".to_string()))?;

    let slack = SlackWebClient::connect(bot_token, config.slack.api_base_url.as_str()).await?;
    let bot_user_id = slack.bot_user_id().to_string();

    let provider = BedrockConverseProvider::from_config(&config.bedrock)?;
    let preferences = open_preferences(config)?;
    let invoker = ModelInvoker::new(
        Arc::new(provider),
        Arc::new(config.models.clone()),
        preferences,
    );

    info!(
        bot_user_id = %bot_user_id,
        region = %config.bedrock.region,
        default_model = config.models.default_model(),
        "gateway collaborators ready"
    );

    let router = ConversationRouter::new(Arc::new(slack), Arc::new(invoker));
    Ok(AppState::new(
        Arc::new(router),
        SlackSignatureVerifier::new(signing_secret),
        bot_user_id,
    ))
}
