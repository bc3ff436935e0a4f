//! Conversation reconstruction: chat events and attachments into model turns.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use threadloom_common::{ChatEvent, FileReference, Result};
use threadloom_media::{MediaKind, UnsupportedMediaType, classify, sanitize_document_name};
use tracing::{debug, warn};

/// Speaker role understood by the model API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One unit of turn content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        format: String,
        bytes: Bytes,
    },
    Video {
        format: String,
        bytes: Bytes,
    },
    Document {
        name: String,
        format: String,
        bytes: Bytes,
    },
}

impl ContentBlock {
    /// Build the block for a classified attachment. `name` is only kept (and
    /// sanitized) for documents.
    pub fn from_media(kind: MediaKind, name: &str, bytes: Bytes) -> Self {
        match kind {
            MediaKind::Image { format } => Self::Image { format, bytes },
            MediaKind::Video { format } => Self::Video { format, bytes },
            MediaKind::Document { format } => Self::Document {
                name: sanitize_document_name(name),
                format,
                bytes,
            },
        }
    }
}

/// A reconstructed conversational unit.
///
/// The first block is always a text block (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    content: Vec<ContentBlock>,
}

impl Turn {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Contents of the leading text block.
    pub fn text_content(&self) -> &str {
        match self.content.first() {
            Some(ContentBlock::Text { text }) => text,
            _ => "",
        }
    }

    fn push(&mut self, block: ContentBlock) {
        self.content.push(block);
    }

    fn append_to_text(&mut self, suffix: &str) {
        if let Some(ContentBlock::Text { text }) = self.content.first_mut() {
            text.push_str(suffix);
        }
    }
}

/// Fetches attachment bytes. Implemented by the chat transport.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download(&self, file: &FileReference) -> Result<Bytes>;
}

/// Result of processing one attachment.
#[derive(Debug)]
pub enum AttachmentOutcome {
    /// The file became a content block.
    Attached(ContentBlock),
    /// Download or encoding failed; the turn continues without this file.
    Transient(String),
    /// The declared type is not supported; the whole batch is rejected.
    Unsupported(UnsupportedMediaType),
}

/// Classify and fetch one attachment.
///
/// The type is checked before any bytes are fetched, so an unsupported file
/// is reported as such regardless of whether its download would succeed.
pub async fn process_attachment(
    file: &FileReference,
    downloader: &dyn FileDownloader,
) -> AttachmentOutcome {
    let kind = match classify(&file.filetype) {
        Ok(kind) => kind,
        Err(e) => return AttachmentOutcome::Unsupported(e),
    };

    match downloader.download(file).await {
        Ok(bytes) => {
            debug!(
                name = %file.name,
                format = kind.format(),
                size = bytes.len(),
                "attached file"
            );
            AttachmentOutcome::Attached(ContentBlock::from_media(kind, &file.name, bytes))
        }
        Err(e) => AttachmentOutcome::Transient(e.to_string()),
    }
}

/// Build a user turn from `text` and its attachments.
///
/// Files are processed one at a time in input order. A file that fails to
/// download leaves a note on the text block and processing continues with
/// the next file. An unsupported file type rejects the whole batch: the
/// partially built turn is discarded and the classification error returned.
pub async fn build_turn(
    text: &str,
    files: &[FileReference],
    downloader: &dyn FileDownloader,
) -> std::result::Result<Turn, UnsupportedMediaType> {
    let mut turn = Turn::text(Role::User, text);

    for file in files {
        match process_attachment(file, downloader).await {
            AttachmentOutcome::Attached(block) => turn.push(block),
            AttachmentOutcome::Transient(reason) => {
                warn!(name = %file.name, "error processing file: {reason}");
                turn.append_to_text(&format!(
                    " (Note: Failed to process attached file: {})",
                    file.name
                ));
            }
            AttachmentOutcome::Unsupported(e) => return Err(e),
        }
    }

    Ok(turn)
}

/// Rebuild a two-party dialogue from a thread's history.
///
/// Events without an author are dropped. The rest are grouped into maximal
/// runs of bot / non-bot messages, so adjacent messages from different human
/// users collapse into a single `user` turn. Within a run, texts are joined
/// with one space (empty texts included) and attachments are concatenated in
/// order.
pub async fn build_thread_turns(
    events: &[ChatEvent],
    bot_id: &str,
    downloader: &dyn FileDownloader,
) -> std::result::Result<Vec<Turn>, UnsupportedMediaType> {
    let mut turns = Vec::new();

    for (is_bot, run) in group_runs(events, bot_id) {
        let text = run
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let files: Vec<FileReference> = run.iter().flat_map(|e| e.files.iter().cloned()).collect();

        let mut turn = build_turn(&text, &files, downloader).await?;
        turn.role = if is_bot { Role::Assistant } else { Role::User };
        turns.push(turn);
    }

    Ok(turns)
}

fn group_runs<'a>(events: &'a [ChatEvent], bot_id: &str) -> Vec<(bool, Vec<&'a ChatEvent>)> {
    let mut runs: Vec<(bool, Vec<&ChatEvent>)> = Vec::new();

    for event in events.iter().filter(|e| e.user.is_some()) {
        let is_bot = event.is_from(bot_id);
        match runs.last_mut() {
            Some((run_is_bot, run)) if *run_is_bot == is_bot => run.push(event),
            _ => runs.push((is_bot, vec![event])),
        }
    }

    runs
}
