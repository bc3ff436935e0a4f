use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::{Value, json};
use threadloom_common::{ChatEvent, Error, Result};
use tracing::{debug, info};

use super::convert::event_from_json;
use crate::traits::ChatTransport;

/// Slack Web API client authenticated with a bot token.
///
/// Construct with [`SlackWebClient::connect`], which resolves the bot's own
/// user id through `auth.test` before the client is handed out.
pub struct SlackWebClient {
    client: Client,
    token: String,
    api_base: String,
    bot_user_id: String,
}

impl SlackWebClient {
    pub async fn connect(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let mut slack = Self {
            client: Client::new(),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_user_id: String::new(),
        };

        let auth = slack.call_post("auth.test", &json!({})).await?;
        slack.bot_user_id = auth
            .get("user_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Channel("auth.test returned no user_id".to_string()))?
            .to_string();

        info!(bot_user_id = %slack.bot_user_id, "slack: authenticated");
        Ok(slack)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn call_post(&self, method: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("slack {method} request failed: {e}")))?;
        Self::check(method, response).await
    }

    async fn call_get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(self.method_url(method))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("slack {method} request failed: {e}")))?;
        Self::check(method, response).await
    }

    /// Slack reports most failures as HTTP 200 with `"ok": false`.
    async fn check(method: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!("slack {method} HTTP {status}: {text}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("slack {method} returned invalid JSON: {e}")))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(Error::Channel(format!("slack {method} failed: {reason}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatTransport for SlackWebClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn fetch_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<ChatEvent>> {
        let limit = limit.to_string();
        let body = self
            .call_get(
                "conversations.replies",
                &[("channel", channel), ("ts", thread_ts), ("limit", limit.as_str())],
            )
            .await?;

        let events: Vec<ChatEvent> = body
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(event_from_json)
                    .map(|mut event| {
                        if event.channel.is_empty() {
                            event.channel = channel.to_string();
                        }
                        event
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(channel, thread_ts, count = events.len(), "slack: fetched thread history");
        Ok(events)
    }

    async fn download_file(&self, url: &str) -> Result<Bytes> {
        if url.is_empty() {
            return Err(Error::Channel("file has no download URL".to_string()));
        }
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("file download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Channel(format!("file download returned HTTP {status}")));
        }

        // Without the files:read scope Slack serves its HTML sign-in page
        // with a 200 instead of the file.
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));
        if is_html && !url.ends_with(".html") {
            return Err(Error::Channel(
                "file download returned an HTML page; check the files:read scope".to_string(),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::Channel(format!("file download failed: {e}")))
    }

    async fn post_reply(&self, channel: &str, text: &str, thread_ts: &str) -> Result<()> {
        self.call_post(
            "chat.postMessage",
            &json!({
                "channel": channel,
                "text": text,
                "thread_ts": thread_ts,
            }),
        )
        .await?;
        Ok(())
    }
}
