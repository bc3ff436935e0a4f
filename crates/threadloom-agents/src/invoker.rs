use std::sync::Arc;

use chrono::{DateTime, Utc};
use threadloom_common::Result;
use threadloom_config::ModelCatalog;
use threadloom_db::PreferenceResolver;
use tracing::{info, instrument};

use crate::providers::{ConverseRequest, InferenceProvider, ThinkingConfig};
use crate::reasoning::{format_reasoning, join_text};
use crate::turns::Turn;

const DATETIME_PLACEHOLDER: &str = "{datetime}";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Source of the current time for prompt substitution.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolves model and prompt for a user, calls the provider and renders the reply.
pub struct ModelInvoker {
    provider: Arc<dyn InferenceProvider>,
    catalog: Arc<ModelCatalog>,
    preferences: PreferenceResolver,
    clock: Arc<dyn Clock>,
    thinking: ThinkingConfig,
}

impl ModelInvoker {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        catalog: Arc<ModelCatalog>,
        preferences: PreferenceResolver,
    ) -> Self {
        Self {
            provider,
            catalog,
            preferences,
            clock: Arc::new(SystemClock),
            thinking: ThinkingConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Override > user preference > catalog default.
    pub fn resolve_model(&self, user_id: Option<&str>, model_override: Option<&str>) -> String {
        if let Some(model) = model_override {
            return model.to_string();
        }
        user_id
            .and_then(|user| self.preferences.preferred_model(user))
            .unwrap_or_else(|| self.catalog.default_model().to_string())
    }

    /// User prompt > catalog default prompt > generic fallback, with
    /// `{datetime}` replaced by the current UTC time.
    pub fn resolve_system_prompt(&self, user_id: Option<&str>, model_id: &str) -> String {
        let now = self.clock.now().format(DATETIME_FORMAT).to_string();

        let custom = user_id.and_then(|user| self.preferences.system_prompt(user, model_id));
        let template = custom.or_else(|| {
            self.catalog
                .get(model_id)
                .and_then(|entry| entry.default_system_prompt.clone())
        });

        match template {
            Some(template) => template.replace(DATETIME_PLACEHOLDER, &now),
            None => format!("You are a helpful AI assistant. The current time is {now}."),
        }
    }

    /// Only the Claude 3.7 Sonnet family, and only when the catalog lists the
    /// exact id as a reasoning variant.
    pub fn is_reasoning_model(&self, model_id: &str) -> bool {
        model_id.contains("claude-3-7-sonnet")
            && self
                .catalog
                .get(model_id)
                .is_some_and(|entry| entry.description.contains("Reasoning"))
    }

    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn invoke(
        &self,
        turns: Vec<Turn>,
        user_id: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<String> {
        let model_id = self.resolve_model(user_id, model_override);
        let system = self.resolve_system_prompt(user_id, &model_id);
        let reasoning = self.is_reasoning_model(&model_id);

        let request = ConverseRequest {
            model_id,
            messages: turns,
            system,
            thinking: reasoning.then_some(self.thinking),
        };

        let response = self.provider.converse(&request).await?;

        if let Some(usage) = response.usage {
            info!(
                provider = self.provider.provider_id(),
                model = %request.model_id,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                "model usage"
            );
        }

        Ok(if reasoning {
            format_reasoning(&response.content)
        } else {
            join_text(&response.content)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ConverseResponse, ResponseBlock, Usage};
    use crate::turns::Role;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use threadloom_common::Error;
    use threadloom_config::ModelCatalogEntry;
    use threadloom_db::InMemoryPreferenceStore;

    const REASONING_ID: &str = "us.anthropic.claude-3-7-sonnet-20250219-v1:0";

    /// Returns a fixed response (or error) and records each request.
    struct ScriptedProvider {
        response: std::result::Result<ConverseResponse, String>,
        requests: Mutex<Vec<ConverseRequest>>,
    }

    impl ScriptedProvider {
        fn replying(content: Vec<ResponseBlock>) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(ConverseResponse {
                    content,
                    usage: Some(Usage {
                        input_tokens: 3,
                        output_tokens: 4,
                        total_tokens: 7,
                    }),
                    stop_reason: Some("end_turn".into()),
                }),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(message.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> ConverseRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.response.clone().map_err(Error::Agent)
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
        }
    }

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(
            "model-a",
            vec![
                ModelCatalogEntry::new("model-a", "Model A")
                    .with_default_prompt("Catalog prompt at {datetime}."),
                ModelCatalogEntry::new("model-b", "Model B"),
                ModelCatalogEntry::new(REASONING_ID, "Claude 3.7 Sonnet Reasoning"),
                ModelCatalogEntry::new(
                    "anthropic.claude-3-7-sonnet-plain",
                    "Claude 3.7 Sonnet",
                ),
            ],
        )
    }

    fn invoker(provider: Arc<ScriptedProvider>) -> (ModelInvoker, PreferenceResolver) {
        let prefs = PreferenceResolver::new(Arc::new(InMemoryPreferenceStore::new()));
        let invoker = ModelInvoker::new(provider, Arc::new(catalog()), prefs.clone())
            .with_clock(Arc::new(FixedClock));
        (invoker, prefs)
    }

    fn turns() -> Vec<Turn> {
        vec![Turn::text(Role::User, "hi")]
    }

    #[test]
    fn model_precedence_is_override_then_preference_then_default() {
        let (invoker, prefs) = invoker(ScriptedProvider::replying(vec![]));
        assert_eq!(invoker.resolve_model(Some("U1"), None), "model-a");

        assert!(prefs.set_preferred_model("U1", "model-b"));
        assert_eq!(invoker.resolve_model(Some("U1"), None), "model-b");
        assert_eq!(invoker.resolve_model(Some("U1"), Some("model-x")), "model-x");
        assert_eq!(invoker.resolve_model(None, None), "model-a");
    }

    #[test]
    fn custom_prompt_tier_substitutes_datetime() {
        let (invoker, prefs) = invoker(ScriptedProvider::replying(vec![]));
        assert!(prefs.set_system_prompt("U1", "model-a", "Mine, now {datetime}"));
        assert_eq!(
            invoker.resolve_system_prompt(Some("U1"), "model-a"),
            "Mine, now 2025-03-04 05:06:07 UTC"
        );
    }

    #[test]
    fn catalog_prompt_tier_substitutes_datetime() {
        let (invoker, _) = invoker(ScriptedProvider::replying(vec![]));
        assert_eq!(
            invoker.resolve_system_prompt(Some("U1"), "model-a"),
            "Catalog prompt at 2025-03-04 05:06:07 UTC."
        );
    }

    #[test]
    fn generic_prompt_tier_is_the_fallback() {
        let (invoker, _) = invoker(ScriptedProvider::replying(vec![]));
        assert_eq!(
            invoker.resolve_system_prompt(None, "model-b"),
            "You are a helpful AI assistant. The current time is 2025-03-04 05:06:07 UTC."
        );
    }

    #[test]
    fn reasoning_requires_family_and_catalog_description() {
        let (invoker, _) = invoker(ScriptedProvider::replying(vec![]));
        assert!(invoker.is_reasoning_model(REASONING_ID));
        assert!(!invoker.is_reasoning_model("anthropic.claude-3-7-sonnet-plain"));
        assert!(!invoker.is_reasoning_model("us.anthropic.claude-3-7-sonnet-unlisted"));
        assert!(!invoker.is_reasoning_model("model-a"));
    }

    #[tokio::test]
    async fn plain_model_joins_text_without_thinking() {
        let provider = ScriptedProvider::replying(vec![
            ResponseBlock::Text {
                text: "Hello".into(),
            },
            ResponseBlock::Text {
                text: ", there".into(),
            },
        ]);
        let (invoker, _) = invoker(provider.clone());

        let reply = invoker.invoke(turns(), Some("U1"), None).await.unwrap();

        assert_eq!(reply, "Hello, there");
        let request = provider.last_request();
        assert_eq!(request.model_id, "model-a");
        assert_eq!(request.system, "Catalog prompt at 2025-03-04 05:06:07 UTC.");
        assert!(request.thinking.is_none());
        assert_eq!(request.messages, turns());
    }

    #[tokio::test]
    async fn reasoning_model_gets_budget_and_quoted_trace() {
        let provider = ScriptedProvider::replying(vec![
            ResponseBlock::Reasoning {
                text: "Step one.\n\nStep two.".into(),
            },
            ResponseBlock::Text {
                text: "42".into(),
            },
        ]);
        let (invoker, _) = invoker(provider.clone());

        let reply = invoker
            .invoke(turns(), None, Some(REASONING_ID))
            .await
            .unwrap();

        assert_eq!(reply, "> Step one.\n\n> Step two.\n\n42");
        assert_eq!(provider.last_request().thinking, Some(ThinkingConfig::default()));
    }

    #[tokio::test]
    async fn provider_errors_propagate_unchanged() {
        let (invoker, _) = invoker(ScriptedProvider::failing("ThrottlingException: slow down"));
        let err = invoker.invoke(turns(), None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "agent error: ThrottlingException: slow down");
    }
}
