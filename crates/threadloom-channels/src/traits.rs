use async_trait::async_trait;
use bytes::Bytes;
use threadloom_agents::FileDownloader;
use threadloom_common::{ChatEvent, Error, FileReference, Result};

/// Operations the pipeline needs from the chat platform.
///
/// Implementations are shared across spawned tasks, so they must be
/// `Send + Sync` and are usually held behind an `Arc`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// User id the bot posts as. Resolved once when the transport connects.
    fn bot_user_id(&self) -> &str;

    /// Messages of a thread, oldest first, including the parent.
    async fn fetch_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: usize,
    ) -> Result<Vec<ChatEvent>>;

    /// Fetch the bytes behind a private file locator.
    async fn download_file(&self, url: &str) -> Result<Bytes>;

    /// Post `text` into the thread rooted at `thread_ts`.
    async fn post_reply(&self, channel: &str, text: &str, thread_ts: &str) -> Result<()>;
}

/// Lets turn building fetch attachments through a [`ChatTransport`].
pub struct TransportDownloader<'a> {
    transport: &'a dyn ChatTransport,
}

impl<'a> TransportDownloader<'a> {
    pub fn new(transport: &'a dyn ChatTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl FileDownloader for TransportDownloader<'_> {
    async fn download(&self, file: &FileReference) -> Result<Bytes> {
        if file.url.is_empty() {
            return Err(Error::Channel(format!("{} has no download URL", file.name)));
        }
        self.transport.download_file(&file.url).await
    }
}
