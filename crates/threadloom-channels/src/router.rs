use std::sync::Arc;

use threadloom_agents::{ModelInvoker, build_thread_turns, build_turn};
use threadloom_common::{ChannelKind, ChatEvent, Error, Result};
use tracing::{error, info, instrument};

use crate::traits::{ChatTransport, TransportDownloader};

/// Maximum number of thread messages fetched to rebuild a conversation.
pub const THREAD_HISTORY_LIMIT: usize = 100;

/// How an inbound event should be handled. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// The text contains `<@BOT_ID>`.
    Mention,
    /// Top-level message in a direct-message channel.
    DirectMessage,
    /// Reply inside an existing thread.
    ThreadedReply,
    Ignorable,
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The model's answer was posted.
    Replied,
    /// Processing failed and an `Error: ...` reply was posted instead.
    ReportedError,
    /// Thread reply in a thread the bot never took part in.
    SkippedThread,
    Ignored,
}

pub fn classify_event(event: &ChatEvent, bot_id: &str) -> RouteKind {
    if event.text.contains(&mention_tag(bot_id)) {
        RouteKind::Mention
    } else if event.thread_ts.is_none() && event.channel_kind == ChannelKind::Im {
        RouteKind::DirectMessage
    } else if event.thread_ts.is_some() {
        RouteKind::ThreadedReply
    } else {
        RouteKind::Ignorable
    }
}

fn mention_tag(bot_id: &str) -> String {
    format!("<@{bot_id}>")
}

/// Remove the first mention of the bot and trim the rest.
fn strip_mention(text: &str, bot_id: &str) -> String {
    text.replacen(&mention_tag(bot_id), "", 1).trim().to_string()
}

/// Drives one inbound event through turn building and model invocation and
/// posts exactly one reply for every handled path.
pub struct ConversationRouter {
    transport: Arc<dyn ChatTransport>,
    invoker: Arc<ModelInvoker>,
}

impl ConversationRouter {
    pub fn new(transport: Arc<dyn ChatTransport>, invoker: Arc<ModelInvoker>) -> Self {
        Self { transport, invoker }
    }

    #[instrument(skip(self, event), fields(channel = %event.channel, ts = %event.ts))]
    pub async fn handle(&self, event: &ChatEvent) -> RouteOutcome {
        let bot_id = self.transport.bot_user_id();
        let kind = classify_event(event, bot_id);

        let (reply_ts, result) = match kind {
            RouteKind::Mention => {
                info!("processing app mention");
                let text = strip_mention(&event.text, bot_id);
                (event.ts.as_str(), self.single_turn(&text, event).await.map(Some))
            }
            RouteKind::DirectMessage => {
                info!("processing direct message");
                (event.ts.as_str(), self.single_turn(&event.text, event).await.map(Some))
            }
            RouteKind::ThreadedReply => {
                info!("processing threaded conversation");
                let thread_ts = event.thread_ts.as_deref().unwrap_or(&event.ts);
                (thread_ts, self.thread_reply(event, thread_ts).await)
            }
            RouteKind::Ignorable => return RouteOutcome::Ignored,
        };

        match result {
            Ok(Some(reply)) => match self.transport.post_reply(&event.channel, &reply, reply_ts).await {
                Ok(()) => RouteOutcome::Replied,
                Err(e) => self.report_error(event, reply_ts, kind, e).await,
            },
            Ok(None) => {
                info!("bot has not responded earlier in the thread, skipping");
                RouteOutcome::SkippedThread
            }
            Err(e) => self.report_error(event, reply_ts, kind, e).await,
        }
    }

    async fn single_turn(&self, text: &str, event: &ChatEvent) -> Result<String> {
        let downloader = TransportDownloader::new(self.transport.as_ref());
        let turn = build_turn(text, &event.files, &downloader).await?;
        let user = event.user.as_ref().map(|u| u.as_str());
        self.invoker.invoke(vec![turn], user, None).await
    }

    /// `Ok(None)` when the bot has no message in the thread yet.
    async fn thread_reply(&self, event: &ChatEvent, thread_ts: &str) -> Result<Option<String>> {
        let bot_id = self.transport.bot_user_id();
        let history = self
            .transport
            .fetch_thread_history(&event.channel, thread_ts, THREAD_HISTORY_LIMIT)
            .await?;

        if !history.iter().any(|m| m.is_from(bot_id)) {
            return Ok(None);
        }

        let downloader = TransportDownloader::new(self.transport.as_ref());
        let turns = build_thread_turns(&history, bot_id, &downloader)
            .await
            .map_err(Error::from)?;
        let user = event.user.as_ref().map(|u| u.as_str());
        self.invoker.invoke(turns, user, None).await.map(Some)
    }

    async fn report_error(
        &self,
        event: &ChatEvent,
        reply_ts: &str,
        kind: RouteKind,
        err: Error,
    ) -> RouteOutcome {
        error!(?kind, "error while processing message: {err}");
        let text = format!("Error: {}", err.user_message());
        if let Err(e) = self.transport.post_reply(&event.channel, &text, reply_ts).await {
            error!(?kind, "failed to post error reply: {e}");
        }
        RouteOutcome::ReportedError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use threadloom_agents::{ConverseRequest, ConverseResponse, InferenceProvider, ResponseBlock};
    use threadloom_common::FileReference;
    use threadloom_config::{ModelCatalog, ModelCatalogEntry};
    use threadloom_db::{InMemoryPreferenceStore, PreferenceResolver};

    const BOT: &str = "BOT123";

    #[derive(Default)]
    struct MockTransport {
        history: Vec<ChatEvent>,
        history_error: Option<String>,
        files: HashMap<String, Bytes>,
        fail_posts: bool,
        posted: Mutex<Vec<(String, String, String)>>,
        fetches: Mutex<Vec<(String, String, usize)>>,
    }

    impl MockTransport {
        fn posted(&self) -> Vec<(String, String, String)> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        fn bot_user_id(&self) -> &str {
            BOT
        }

        async fn fetch_thread_history(
            &self,
            channel: &str,
            thread_ts: &str,
            limit: usize,
        ) -> Result<Vec<ChatEvent>> {
            self.fetches
                .lock()
                .unwrap()
                .push((channel.into(), thread_ts.into(), limit));
            match &self.history_error {
                Some(msg) => Err(Error::Channel(msg.clone())),
                None => Ok(self.history.clone()),
            }
        }

        async fn download_file(&self, url: &str) -> Result<Bytes> {
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Channel(format!("download failed: {url}")))
        }

        async fn post_reply(&self, channel: &str, text: &str, thread_ts: &str) -> Result<()> {
            if self.fail_posts && !text.starts_with("Error: ") {
                return Err(Error::Channel("channel_not_found".into()));
            }
            self.posted
                .lock()
                .unwrap()
                .push((channel.into(), text.into(), thread_ts.into()));
            Ok(())
        }
    }

    /// Echoes the user text of every turn so tests can see what was sent.
    #[derive(Default)]
    struct EchoProvider {
        requests: Mutex<Vec<ConverseRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl InferenceProvider for EchoProvider {
        fn provider_id(&self) -> &str {
            "echo"
        }

        async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(Error::Agent("ValidationException: bad input".into()));
            }
            let echoed: Vec<String> = request
                .messages
                .iter()
                .map(|t| format!("{}:{}", t.role.as_str(), t.text_content()))
                .collect();
            Ok(ConverseResponse {
                content: vec![ResponseBlock::Text {
                    text: echoed.join("|"),
                }],
                ..Default::default()
            })
        }
    }

    fn router(transport: Arc<MockTransport>, provider: Arc<EchoProvider>) -> ConversationRouter {
        let catalog = ModelCatalog::new("model-a", vec![ModelCatalogEntry::new("model-a", "A")]);
        let prefs = PreferenceResolver::new(Arc::new(InMemoryPreferenceStore::new()));
        let invoker = ModelInvoker::new(provider, Arc::new(catalog), prefs);
        ConversationRouter::new(transport, Arc::new(invoker))
    }

    fn channel_message(user: &str, text: &str, ts: &str) -> ChatEvent {
        ChatEvent::message(user, text, ts).in_channel("C1", ChannelKind::Channel)
    }

    #[test]
    fn classification_order() {
        let mention = channel_message("U1", "hey <@BOT123>", "1").in_thread("0");
        assert_eq!(classify_event(&mention, BOT), RouteKind::Mention);

        let dm = ChatEvent::message("U1", "hi", "1").in_channel("D1", ChannelKind::Im);
        assert_eq!(classify_event(&dm, BOT), RouteKind::DirectMessage);

        let dm_thread = dm.clone().in_thread("0");
        assert_eq!(classify_event(&dm_thread, BOT), RouteKind::ThreadedReply);

        let chatter = channel_message("U1", "lunch?", "1");
        assert_eq!(classify_event(&chatter, BOT), RouteKind::Ignorable);
    }

    #[test]
    fn strips_only_the_first_mention() {
        assert_eq!(strip_mention("  <@BOT123>  Hello bot ", BOT), "Hello bot");
        assert_eq!(strip_mention("<@BOT123> ping <@BOT123>", BOT), "ping <@BOT123>");
    }

    #[tokio::test]
    async fn mention_replies_in_event_thread() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = channel_message("U1", "<@BOT123> Hello bot", "111.1");
        assert_eq!(router.handle(&event).await, RouteOutcome::Replied);

        assert_eq!(
            transport.posted(),
            vec![("C1".into(), "user:Hello bot".into(), "111.1".into())]
        );
    }

    #[tokio::test]
    async fn direct_message_replies_to_its_timestamp() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = ChatEvent::message("U1", "hi there", "222.2").in_channel("D9", ChannelKind::Im);
        assert_eq!(router.handle(&event).await, RouteOutcome::Replied);
        assert_eq!(
            transport.posted(),
            vec![("D9".into(), "user:hi there".into(), "222.2".into())]
        );
    }

    #[tokio::test]
    async fn thread_without_bot_is_skipped() {
        let transport = Arc::new(MockTransport {
            history: vec![
                channel_message("U1", "parent", "1"),
                channel_message("U2", "reply", "2").in_thread("1"),
            ],
            ..Default::default()
        });
        let provider = Arc::new(EchoProvider::default());
        let router = router(transport.clone(), provider.clone());

        let event = channel_message("U2", "reply", "2").in_thread("1");
        assert_eq!(router.handle(&event).await, RouteOutcome::SkippedThread);
        assert!(transport.posted().is_empty());
        assert!(provider.requests.lock().unwrap().is_empty());
        assert_eq!(
            transport.fetches.lock().unwrap().clone(),
            vec![("C1".into(), "1".into(), THREAD_HISTORY_LIMIT)]
        );
    }

    #[tokio::test]
    async fn thread_with_bot_rebuilds_dialogue() {
        let transport = Arc::new(MockTransport {
            history: vec![
                channel_message("U1", "Check these files", "1"),
                channel_message("U1", "And this one too", "2").in_thread("1"),
                channel_message(BOT, "Looking", "3").in_thread("1"),
                channel_message("U1", "Thanks!", "4").in_thread("1"),
            ],
            ..Default::default()
        });
        let router = router(transport.clone(), Arc::default());

        let event = channel_message("U1", "Thanks!", "4").in_thread("1");
        assert_eq!(router.handle(&event).await, RouteOutcome::Replied);
        assert_eq!(
            transport.posted(),
            vec![(
                "C1".into(),
                "user:Check these files And this one too|assistant:Looking|user:Thanks!".into(),
                "1".into()
            )]
        );
    }

    #[tokio::test]
    async fn unsupported_attachment_reports_error() {
        let transport = Arc::new(MockTransport::default());
        let provider = Arc::new(EchoProvider::default());
        let router = router(transport.clone(), provider.clone());

        let event = channel_message("U1", "<@BOT123> open this", "5")
            .with_files(vec![FileReference::new("zip", "a.zip", "https://f/a.zip")]);

        assert_eq!(router.handle(&event).await, RouteOutcome::ReportedError);
        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].1.starts_with("Error: Unsupported file type: zip."));
        assert_eq!(posted[0].2, "5");
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_download_is_noted_not_fatal() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = ChatEvent::message("U1", "see", "6")
            .in_channel("D1", ChannelKind::Im)
            .with_files(vec![FileReference::new("png", "gone.png", "https://f/gone")]);

        assert_eq!(router.handle(&event).await, RouteOutcome::Replied);
        assert_eq!(
            transport.posted()[0].1,
            "user:see (Note: Failed to process attached file: gone.png)"
        );
    }

    #[tokio::test]
    async fn file_without_locator_is_noted() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = ChatEvent::message("U1", "summarise", "6")
            .in_channel("D1", ChannelKind::Im)
            .with_files(vec![FileReference::new("pdf", "report.pdf", "")]);

        assert_eq!(router.handle(&event).await, RouteOutcome::Replied);
        assert_eq!(
            transport.posted()[0].1,
            "user:summarise (Note: Failed to process attached file: report.pdf)"
        );
    }

    #[tokio::test]
    async fn unsupported_file_without_locator_still_rejects_batch() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = ChatEvent::message("U1", "open", "6")
            .in_channel("D1", ChannelKind::Im)
            .with_files(vec![FileReference::new("zip", "a.zip", "")]);

        assert_eq!(router.handle(&event).await, RouteOutcome::ReportedError);
        assert!(transport.posted()[0].1.starts_with("Error: Unsupported file type: zip."));
    }

    #[tokio::test]
    async fn history_failure_reports_error_in_thread() {
        let transport = Arc::new(MockTransport {
            history_error: Some("ratelimited".into()),
            ..Default::default()
        });
        let router = router(transport.clone(), Arc::default());

        let event = channel_message("U1", "more", "9").in_thread("7");
        assert_eq!(router.handle(&event).await, RouteOutcome::ReportedError);
        assert_eq!(
            transport.posted(),
            vec![("C1".into(), "Error: ratelimited".into(), "7".into())]
        );
    }

    #[tokio::test]
    async fn model_failure_reports_error() {
        let transport = Arc::new(MockTransport::default());
        let provider = Arc::new(EchoProvider {
            fail: true,
            ..Default::default()
        });
        let router = router(transport.clone(), provider);

        let event = channel_message("U1", "<@BOT123> hi", "8");
        assert_eq!(router.handle(&event).await, RouteOutcome::ReportedError);
        assert_eq!(
            transport.posted(),
            vec![(
                "C1".into(),
                "Error: ValidationException: bad input".into(),
                "8".into()
            )]
        );
    }

    #[tokio::test]
    async fn failed_reply_post_falls_back_to_error_reply() {
        let transport = Arc::new(MockTransport {
            fail_posts: true,
            ..Default::default()
        });
        let router = router(transport.clone(), Arc::default());

        let event = channel_message("U1", "<@BOT123> hi", "8");
        assert_eq!(router.handle(&event).await, RouteOutcome::ReportedError);
        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].1, "Error: channel_not_found");
    }

    #[tokio::test]
    async fn plain_channel_chatter_is_ignored() {
        let transport = Arc::new(MockTransport::default());
        let router = router(transport.clone(), Arc::default());

        let event = channel_message("U1", "lunch?", "1");
        assert_eq!(router.handle(&event).await, RouteOutcome::Ignored);
        assert!(transport.posted().is_empty());
    }
}
