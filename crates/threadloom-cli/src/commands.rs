use std::fmt::Write as _;

use anyhow::{Context as _, bail};
use threadloom_config::AppConfig;
use threadloom_db::{PreferenceResolver, UserPreference};
use threadloom_gateway::GatewayServer;
use threadloom_gateway::bootstrap::build_state;
use tracing::info;

pub async fn serve(config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let state = build_state(&config)
        .await
        .context("failed to initialise gateway")?;
    let bind = bind.unwrap_or_else(|| config.gateway.bind.clone());
    GatewayServer::new(state, bind).run().await?;
    Ok(())
}

pub fn render_models(config: &AppConfig, debug: bool) -> String {
    let catalog = &config.models;
    let mut out = String::new();

    for entry in catalog.entries() {
        let marker = if entry.id == catalog.default_model() {
            "*"
        } else {
            " "
        };
        let _ = writeln!(out, "{marker} {}  {}", entry.id, entry.description);
    }

    if debug {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Default model: {} ({})",
            catalog.default_model(),
            catalog.display_name(Some(catalog.default_model()))
        );
        let _ = writeln!(out, "Bedrock region: {}", config.bedrock.region);
        let _ = writeln!(out, "Bedrock endpoint: {}", config.bedrock.runtime_endpoint());
        let _ = writeln!(out, "Preferences DB: {}", config.storage.db_path.display());
        let _ = writeln!(out, "Gateway bind: {}", config.gateway.bind);
    }

    out
}

pub fn show_preferences(
    prefs: &PreferenceResolver,
    config: &AppConfig,
    user: &str,
) -> anyhow::Result<String> {
    let pref = prefs
        .get(user)
        .unwrap_or_else(|| UserPreference::new(user));
    let mut out = serde_json::to_string_pretty(&pref)?;
    let _ = write!(
        out,
        "\nCurrent model: {}",
        config.models.display_name(pref.model_id.as_deref())
    );
    Ok(out)
}

pub fn set_model(
    prefs: &PreferenceResolver,
    config: &AppConfig,
    user: &str,
    model: &str,
) -> anyhow::Result<String> {
    if !config.models.contains(model) {
        bail!("unknown model {model}; run `threadloom models` to list the catalog");
    }
    if !prefs.set_preferred_model(user, model) {
        bail!("failed to update model preference for {user}");
    }
    info!(user, model, "model preference updated");
    Ok(format!(
        "Bedrock model preference for {user} updated to: {}",
        config.models.display_name(Some(model))
    ))
}

pub fn set_prompt(
    prefs: &PreferenceResolver,
    user: &str,
    model: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    if !prefs.set_system_prompt(user, model, prompt) {
        bail!("failed to update system prompt for {user}");
    }
    info!(user, model, "system prompt updated");
    Ok(format!("System prompt for {user} on {model} updated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use threadloom_config::{ModelCatalog, ModelCatalogEntry};
    use threadloom_db::InMemoryPreferenceStore;

    fn config() -> AppConfig {
        AppConfig {
            models: ModelCatalog::new(
                "model-a",
                vec![
                    ModelCatalogEntry::new("model-a", "Model A"),
                    ModelCatalogEntry::new("model-b", "Model B"),
                ],
            ),
            ..Default::default()
        }
    }

    fn prefs() -> PreferenceResolver {
        PreferenceResolver::new(Arc::new(InMemoryPreferenceStore::new()))
    }

    #[test]
    fn models_listing_marks_default() {
        let out = render_models(&config(), false);
        assert_eq!(out, "* model-a  Model A\n  model-b  Model B\n");
    }

    #[test]
    fn debug_listing_includes_runtime_settings() {
        let out = render_models(&config(), true);
        assert!(out.contains("Default model: model-a (Model A)"));
        assert!(out.contains("Bedrock region: us-east-1"));
        assert!(out.contains("Preferences DB: "));
    }

    #[test]
    fn set_model_rejects_unknown_ids() {
        let prefs = prefs();
        let err = set_model(&prefs, &config(), "U1", "model-z").unwrap_err();
        assert!(err.to_string().contains("unknown model model-z"));
        assert_eq!(prefs.preferred_model("U1"), None);
    }

    #[test]
    fn set_model_reports_display_name() {
        let prefs = prefs();
        let msg = set_model(&prefs, &config(), "U1", "model-b").unwrap();
        assert_eq!(msg, "Bedrock model preference for U1 updated to: Model B");
        assert_eq!(prefs.preferred_model("U1").as_deref(), Some("model-b"));
    }

    #[test]
    fn show_preferences_for_unknown_user() {
        let out = show_preferences(&prefs(), &config(), "U9").unwrap();
        assert!(out.contains("\"user_id\": \"U9\""));
        assert!(out.ends_with("Current model: Not set"));
    }

    #[test]
    fn set_prompt_is_visible_in_preferences() {
        let prefs = prefs();
        set_prompt(&prefs, "U1", "model-a", "Be brief. {datetime}").unwrap();
        let out = show_preferences(&prefs, &config(), "U1").unwrap();
        assert!(out.contains("Be brief. {datetime}"));
    }
}
